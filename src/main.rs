use clap::{Parser, Subcommand};
use exn::ResultExt;
use futures::StreamExt;
use librarian::{ErrorKind, FilteredResult, Librarian, Result};
use librarian_cache::{DirectoryProvider, IMAGE_CATEGORY};
use librarian_config::Config;
use librarian_facet::FilterState;
use librarian_storage::BackendHandle;
use librarian_storage::backend::{LocalBackend, ReadOnlyBackend};
use librarian_thumbnail::{HydrationEvent, ImageRenderer, Outcome};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "librarian", version, about = "Browse an image library by facets")]
struct Cli {
    /// Configuration file (TOML, YAML or JSON).
    #[arg(long, short, env = "LIBRARIAN_CONFIG")]
    config: Option<PathBuf>,

    /// Image library to browse.
    #[arg(long, short, default_value = ".")]
    library: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the facets and entries that match a selection.
    Filter {
        /// Facet selection as `key=token[:state]`, e.g. `extension=png:not`.
        #[arg(long = "select")]
        selections: Vec<Selection>,
        /// Case-insensitive name search.
        #[arg(long, short = 'q')]
        search: Option<String>,
        /// Only entries in this folder or below it.
        #[arg(long, short)]
        folder: Option<String>,
        /// Print the result as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Build thumbnails for every matching entry and print the metrics.
    Thumbs {
        #[arg(long, short = 'q')]
        search: Option<String>,
        /// Entries treated as on screen and hydrated first.
        #[arg(long, default_value_t = 24)]
        visible: usize,
    },
    /// Forget every cached thumbnail.
    Clear {
        /// Keep thumbnail files on disk.
        #[arg(long)]
        keep_files: bool,
    },
}

/// One facet selection from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Selection {
    key: String,
    token: String,
    state: FilterState,
}

impl FromStr for Selection {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (key, rest) = s.split_once('=').ok_or_else(|| format!("expected key=token, got '{s}'"))?;
        // Group keys may contain colons, tokens may too; only a trailing state is split off.
        let (token, state) = rest
            .rsplit_once(':')
            .and_then(|(token, state)| state.parse::<FilterState>().ok().map(|state| (token, state)))
            .unwrap_or((rest, FilterState::Include));
        if key.is_empty() || token.is_empty() {
            return Err(format!("expected key=token, got '{s}'"));
        }
        Ok(Self { key: key.to_string(), token: token.to_string(), state })
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).or_raise(|| ErrorKind::Config)
}

fn build(cli: &Cli) -> Result<Librarian> {
    let config = Config::load(cli.config.as_deref()).or_raise(|| ErrorKind::Config)?;
    let library = LocalBackend::new("library", absolute(&cli.library)?).or_raise(|| ErrorKind::Config)?;
    let library: BackendHandle = Arc::new(ReadOnlyBackend::new(Arc::new(library)));
    let data: BackendHandle =
        Arc::new(LocalBackend::new("data", absolute(&config.data_dir())?).or_raise(|| ErrorKind::Config)?);
    tracing::debug!(library = %cli.library.display(), data = %config.data_dir().display(), "Opening library");

    let provider = DirectoryProvider::new(Arc::clone(&library))
        .with_roots(config.scan.roots.clone())
        .with_extensions(&config.scan.extensions);
    let renderer = ImageRenderer::new(library);
    Librarian::from_config(&config, Arc::new(provider), data, Arc::new(renderer))
}

fn print_result(result: &FilteredResult) {
    for group in &result.groups {
        println!("{} ({})", group.label, group.key);
        for option in &group.options {
            let marker = match option.state {
                FilterState::Off => ' ',
                FilterState::Include => '+',
                FilterState::And => '&',
                FilterState::Exclude => '-',
            };
            println!("  {marker} {:<24} {:>6}  [{}]", option.label, option.count, option.token);
        }
    }
    println!("{} entries", result.entries.len());
    for entry in &result.entries {
        println!("  {}", entry.image.as_deref().unwrap_or(&entry.name));
    }
}

async fn run(cli: Cli) -> Result<()> {
    let librarian = build(&cli)?;
    librarian.open("", IMAGE_CATEGORY);

    match cli.command {
        Command::Filter { selections, search, folder, json } => {
            librarian.set_search(search.as_deref().unwrap_or_default())?;
            librarian.set_folder(folder.as_deref())?;
            // Options only exist once a result has been computed.
            librarian.get_filtered_result().await?;
            for selection in &selections {
                librarian.set_filter_state(&selection.key, &selection.token, selection.state)?;
            }
            let result = librarian.get_filtered_result().await?;
            if json {
                let rendered = serde_json::to_string_pretty(&result).or_raise(|| ErrorKind::Filter)?;
                println!("{rendered}");
            } else {
                print_result(&result);
            }
        },
        Command::Thumbs { search, visible } => {
            librarian.set_search(search.as_deref().unwrap_or_default())?;
            let result = librarian.get_filtered_result().await?;
            let mut events = Box::pin(librarian.request_hydration(result.hydration_items(visible))?.into_stream());
            while let Some(event) = events.next().await {
                match event {
                    HydrationEvent::Started { total, pending } => tracing::info!(total, pending, "Hydrating"),
                    HydrationEvent::Resolved { id, origin, .. } => tracing::debug!(%id, ?origin, "Resolved"),
                    HydrationEvent::Finished(Outcome::Completed(metrics)) => {
                        println!(
                            "{} thumbnails: {} from memory, {} from disk, {} built, {} failed in {:.2?}",
                            metrics.total,
                            metrics.memory_hits,
                            metrics.durable_hits,
                            metrics.built,
                            metrics.failed,
                            metrics.elapsed
                        );
                    },
                    HydrationEvent::Finished(Outcome::Cancelled) => println!("hydration cancelled"),
                }
            }
            librarian.flush().await?;
        },
        Command::Clear { keep_files } => {
            let cleared = librarian.clear_thumbnails(!keep_files).await?;
            println!("cleared {cleared} thumbnails");
        },
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = ?err, "librarian failed");
            ExitCode::FAILURE
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("extension=png", "extension", "png", FilterState::Include)]
    #[case("extension=png:not", "extension", "png", FilterState::Exclude)]
    #[case("extension=png:AND", "extension", "png", FilterState::And)]
    #[case("filterTagGroup:Image:biome=cave", "filterTagGroup:Image:biome", "cave", FilterState::Include)]
    #[case("folder=maps:dungeons", "folder", "maps:dungeons", FilterState::Include)]
    fn test_selection_parsing(#[case] raw: &str, #[case] key: &str, #[case] token: &str, #[case] state: FilterState) {
        let selection: Selection = raw.parse().unwrap();
        assert_eq!(selection, Selection { key: key.into(), token: token.into(), state });
    }

    #[rstest]
    #[case("extension")]
    #[case("=png")]
    #[case("extension=")]
    #[case("extension=:not")]
    fn test_selection_rejects(#[case] raw: &str) {
        assert!(raw.parse::<Selection>().is_err());
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_parses() {
        let cli =
            Cli::try_parse_from(["librarian", "--library", "/srv/maps", "filter", "--select", "extension=png", "--json"])
                .unwrap();
        assert!(matches!(cli.command, Command::Filter { json: true, ref selections, .. } if selections.len() == 1));
    }
}
