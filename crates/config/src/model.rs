use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use librarian_cache::IMAGE_EXTENSIONS;
use librarian_facet::{CustomField, TagGroup};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Prefix of environment variables that override configuration values.
/// Nested keys are separated by a double underscore, e.g.
/// `LIBRARIAN_THUMBNAILS__QUALITY=80`.
pub const ENV_PREFIX: &str = "LIBRARIAN_";

/// Thumbnail formats a renderer is expected to produce.
pub const THUMBNAIL_FORMATS: &[&str] = &["webp", "png", "jpeg"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThumbnailConfig {
    pub width: u32,
    pub height: u32,
    /// Encoder quality, 0 to 100.
    pub quality: u8,
    pub format: String,
    /// Entries kept in the in-memory tier.
    pub memory_capacity: usize,
    /// Renders running at once.
    pub concurrency: usize,
    /// Misses handed to the workers per batch.
    pub batch_size: usize,
    /// Pause between batches, in milliseconds.
    pub batch_delay_ms: u64,
    /// Quiet period before the manifest is persisted, in milliseconds.
    pub flush_debounce_ms: u64,
    /// Persist rendered thumbnails. When off, thumbnails live in memory only.
    pub durable: bool,
    /// Directory, relative to the data directory, that thumbnails are written to.
    pub directory: PathBuf,
    /// Image shown for entries whose thumbnail could not be built.
    pub placeholder: String,
}
impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            width: 192,
            height: 192,
            quality: 60,
            format: "webp".to_string(),
            memory_capacity: 1000,
            concurrency: 2,
            batch_size: 4,
            batch_delay_ms: 70,
            flush_debounce_ms: 400,
            durable: true,
            directory: PathBuf::from("thumbs"),
            placeholder: "icons/svg/mystery-man.svg".to_string(),
        }
    }
}
impl ThumbnailConfig {
    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    pub fn flush_debounce(&self) -> Duration {
        Duration::from_millis(self.flush_debounce_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Directories to scan for images, relative to the library root. Empty
    /// means the whole library.
    pub roots: Vec<PathBuf>,
    pub extensions: Vec<String>,
}
impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            extensions: IMAGE_EXTENSIONS.iter().map(|ext| ext.to_string()).collect(),
        }
    }
}

/// Top-level configuration.
///
/// Loaded in layers: built-in defaults, then an optional file, then
/// environment variables prefixed with [`ENV_PREFIX`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where thumbnails and settings are stored. Defaults to the platform
    /// data directory.
    pub data_dir: Option<PathBuf>,
    pub thumbnails: ThumbnailConfig,
    pub scan: ScanConfig,
    /// Extra facet fields per category.
    pub fields: HashMap<String, Vec<CustomField>>,
    /// Tag groups per category. Listing a category here enables tag facets for it.
    pub tags: HashMap<String, Vec<TagGroup>>,
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "librarian")
}

impl Config {
    /// Platform configuration file location, if the platform has one.
    pub fn default_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Configured data directory, falling back to the platform data directory
    /// and finally the working directory.
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .or_else(|| project_dirs().map(|dirs| dirs.data_dir().to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Build the layered figment without extracting it.
    ///
    /// An explicit `path` must exist; the default path is used only if it does.
    pub fn figment(path: Option<&Path>) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        let file = match path {
            Some(path) if !path.is_file() => exn::bail!(ErrorKind::NotFound(path.to_path_buf())),
            Some(path) => Some(path.to_path_buf()),
            None => Self::default_path().filter(|path| path.is_file()),
        };
        if let Some(file) = file {
            let extension = file.extension().and_then(|ext| ext.to_str()).map(str::to_lowercase);
            figment = match extension.as_deref() {
                Some("toml") => figment.merge(Toml::file(&file)),
                Some("yaml" | "yml") => figment.merge(Yaml::file(&file)),
                Some("json") => figment.merge(Json::file(&file)),
                _ => exn::bail!(ErrorKind::UnsupportedFormat(file)),
            };
            tracing::debug!(path = %file.display(), "Merging configuration file");
        }
        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Load and validate configuration.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config: Config = Self::figment(path)?
            .extract()
            .map_err(|err| ErrorKind::Invalid(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let thumbnails = &self.thumbnails;
        let zeroes = [
            ("thumbnails.width", thumbnails.width as usize),
            ("thumbnails.height", thumbnails.height as usize),
            ("thumbnails.memory_capacity", thumbnails.memory_capacity),
            ("thumbnails.concurrency", thumbnails.concurrency),
            ("thumbnails.batch_size", thumbnails.batch_size),
        ];
        if let Some((key, _)) = zeroes.iter().find(|(_, value)| *value == 0) {
            exn::bail!(ErrorKind::Invalid(format!("{key} must be greater than zero")));
        }
        if thumbnails.quality > 100 {
            exn::bail!(ErrorKind::Invalid(format!("thumbnails.quality must be at most 100, got {}", thumbnails.quality)));
        }
        if !THUMBNAIL_FORMATS.contains(&thumbnails.format.to_lowercase().as_str()) {
            exn::bail!(ErrorKind::Invalid(format!("thumbnails.format '{}' is not supported", thumbnails.format)));
        }
        for (category, fields) in &self.fields {
            if let Some(field) = fields.iter().find(|field| field.key.trim().is_empty() || field.path.trim().is_empty()) {
                exn::bail!(ErrorKind::Invalid(format!("field '{}' of {category} needs a key and a path", field.label)));
            }
        }
        Ok(())
    }
}
