use crate::error::{ErrorKind, Result};
use crate::memo::{GroupMemo, MemoKey};
use exn::ResultExt;
use librarian_cache::{Diff, EntryProvider, Snapshot, SnapshotCache, TagUpdate, diff, fetch};
use librarian_config::{BackendSettings, Config, SettingsStore};
use librarian_facet::{
    DisplayRegistry, FacetGroup, FieldCatalog, FilterState, apply, build_groups, recompute, selection_key, set_state,
};
use librarian_model::{Entry, Folder, subtree_ids};
use librarian_storage::BackendHandle;
use librarian_thumbnail::{
    CacheKey, HydrationItem, JobHandle, Manifest, Renderer, Scheduler, SchedulerOptions, ThumbnailCache, Transform,
};
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

/// Directory below the data backend that settings are stored in.
const SETTINGS_DIRECTORY: &str = "settings";
/// Memoized group lists kept per librarian.
const MEMO_CAPACITY: usize = 64;

/// One page of a view: the entries that pass every filter and the facet
/// groups to show next to them.
#[derive(Debug, Clone, Serialize)]
pub struct FilteredResult {
    pub entries: Vec<Entry>,
    pub groups: Vec<FacetGroup>,
    pub hierarchy: Vec<Folder>,
    /// Snapshot data version the result was computed against.
    pub data_version: u64,
}

impl FilteredResult {
    /// Hydration items for every entry with an image; the first `visible`
    /// of them are marked visible.
    pub fn hydration_items(&self, visible: usize) -> Vec<HydrationItem> {
        self.entries
            .iter()
            .filter_map(|entry| entry.image.as_deref().map(|image| (entry, image)))
            .enumerate()
            .map(|(index, (entry, image))| HydrationItem::new(entry.id.clone(), image, index < visible))
            .collect()
    }
}

/// What a rescan changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub diff: Diff,
    pub entries: usize,
    /// Thumbnails dropped because their source is gone.
    pub pruned: usize,
    pub data_version: u64,
}

#[derive(Debug)]
struct View {
    source: String,
    category: String,
    groups: Vec<FacetGroup>,
    search: String,
    folder: Option<String>,
    /// Bumped by every selection change, so a slow filter pass never
    /// overwrites a newer selection.
    revision: u64,
}

impl View {
    fn job_key(&self) -> String {
        format!("{}:{}", self.source, self.category)
    }
}

/// The engine behind a catalog browser.
///
/// A librarian has at most one open view (a source and a category). Facet
/// selections, search text and folder belong to that view; snapshots and
/// thumbnails are shared by every view.
pub struct Librarian {
    provider: Arc<dyn EntryProvider>,
    snapshots: SnapshotCache,
    catalog: FieldCatalog,
    scheduler: Scheduler,
    view: Mutex<Option<View>>,
    memo: Mutex<GroupMemo>,
    registry: Mutex<DisplayRegistry>,
}

impl Librarian {
    pub fn new(
        provider: Arc<dyn EntryProvider>,
        catalog: FieldCatalog,
        thumbnails: Arc<ThumbnailCache>,
        renderer: Arc<dyn Renderer>,
        options: SchedulerOptions,
    ) -> Self {
        Self {
            provider,
            snapshots: SnapshotCache::new(),
            catalog,
            scheduler: Scheduler::new(thumbnails, renderer, options),
            view: Mutex::new(None),
            memo: Mutex::new(GroupMemo::new(MEMO_CAPACITY)),
            registry: Mutex::new(DisplayRegistry::new()),
        }
    }

    /// Wire a librarian from configuration.
    ///
    /// `data` is where settings and thumbnails are kept. With durable
    /// thumbnails turned off, thumbnails are never written to it.
    pub fn from_config(
        config: &Config,
        provider: Arc<dyn EntryProvider>,
        data: BackendHandle,
        renderer: Arc<dyn Renderer>,
    ) -> Result<Self> {
        config.validate().or_raise(|| ErrorKind::Config)?;

        let mut catalog = FieldCatalog::with_defaults();
        for (category, fields) in &config.fields {
            for field in fields {
                catalog.add_custom(category.clone(), field.clone());
            }
        }
        for (category, groups) in &config.tags {
            catalog.set_tag_groups(category.clone(), groups.clone());
        }

        let thumbnails = &config.thumbnails;
        let settings: Arc<dyn SettingsStore> = Arc::new(BackendSettings::new(Arc::clone(&data), SETTINGS_DIRECTORY));
        let manifest = Manifest::new(settings, thumbnails.flush_debounce());
        let store = thumbnails.durable.then_some(data);
        let cache = ThumbnailCache::new(thumbnails.memory_capacity, manifest, store, thumbnails.directory.clone());
        let options = SchedulerOptions {
            transform: Transform::new(thumbnails.width, thumbnails.height, thumbnails.quality, &thumbnails.format),
            concurrency: thumbnails.concurrency,
            batch_size: thumbnails.batch_size,
            batch_delay: thumbnails.batch_delay(),
            placeholder: PathBuf::from(&thumbnails.placeholder),
        };
        Ok(Self::new(provider, catalog, Arc::new(cache), renderer, options))
    }

    pub fn thumbnails(&self) -> &Arc<ThumbnailCache> {
        self.scheduler.cache()
    }

    pub fn snapshots(&self) -> &SnapshotCache {
        &self.snapshots
    }

    /// Make `source`/`category` the active view. Selections, search and
    /// folder start empty, even when reopening the current view.
    pub fn open(&self, source: &str, category: &str) {
        let mut view = self.view.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = view.as_ref() {
            self.scheduler.cancel(&previous.job_key());
        }
        *view = Some(View {
            source: source.to_string(),
            category: category.to_string(),
            groups: Vec::new(),
            search: String::new(),
            folder: None,
            revision: 0,
        });
        self.registry.lock().unwrap_or_else(PoisonError::into_inner).clear();
        tracing::debug!(source, category, "Opened view");
    }

    fn with_view<T>(&self, change: impl FnOnce(&mut View) -> Result<T>) -> Result<T> {
        let mut guard = self.view.lock().unwrap_or_else(PoisonError::into_inner);
        let view = guard.as_mut().ok_or_else(|| exn::Exn::from(ErrorKind::NoActiveView))?;
        let result = change(view)?;
        view.revision += 1;
        Ok(result)
    }

    /// Set one option's state directly, returning its previous state.
    ///
    /// Only options of the last computed result can be selected.
    pub fn set_filter_state(&self, key: &str, token: &str, state: FilterState) -> Result<FilterState> {
        self.with_view(|view| set_state(&mut view.groups, key, token, state).or_raise(|| ErrorKind::Filter))
    }

    /// Primary interaction on an option. Returns the new state.
    pub fn cycle_filter(&self, key: &str, token: &str) -> Result<FilterState> {
        self.transition(key, token, FilterState::cycle)
    }

    /// Secondary interaction on an option. Returns the new state.
    pub fn toggle_exclude(&self, key: &str, token: &str) -> Result<FilterState> {
        self.transition(key, token, FilterState::toggle_exclude)
    }

    fn transition(&self, key: &str, token: &str, next: fn(FilterState) -> FilterState) -> Result<FilterState> {
        self.with_view(|view| {
            let current = view
                .groups
                .iter()
                .find(|group| group.key == key)
                .and_then(|group| group.option(token))
                .map(|option| option.state)
                .unwrap_or_default();
            let state = next(current);
            set_state(&mut view.groups, key, token, state).or_raise(|| ErrorKind::Filter)?;
            Ok(state)
        })
    }

    /// Turn every option off.
    pub fn reset_filters(&self) -> Result<()> {
        self.with_view(|view| {
            for option in view.groups.iter_mut().flat_map(|group| group.options.iter_mut()) {
                option.state = FilterState::Off;
            }
            Ok(())
        })
    }

    /// Case-insensitive substring search on entry names. Empty clears it.
    pub fn set_search(&self, query: &str) -> Result<()> {
        self.with_view(|view| {
            view.search = query.trim().to_string();
            Ok(())
        })
    }

    /// Restrict the view to a folder and everything nested below it.
    pub fn set_folder(&self, folder: Option<&str>) -> Result<()> {
        self.with_view(|view| {
            view.folder = folder.map(str::to_string);
            Ok(())
        })
    }

    /// Filter the active view and rebuild its facet groups.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn get_filtered_result(&self) -> Result<FilteredResult> {
        let (source, category, search, folder, previous, revision) = {
            let guard = self.view.lock().unwrap_or_else(PoisonError::into_inner);
            let view = guard.as_ref().ok_or_else(|| exn::Exn::from(ErrorKind::NoActiveView))?;
            (
                view.source.clone(),
                view.category.clone(),
                view.search.clone(),
                view.folder.clone(),
                view.groups.clone(),
                view.revision,
            )
        };

        // Read before loading: a bump during the load only orphans this memo entry.
        let data_version = self.snapshots.current_version();
        let snapshot = self
            .snapshots
            .load_from(self.provider.as_ref(), &source, &category)
            .await
            .or_raise(|| ErrorKind::Load(format!("{source}:{category}")))?;

        let candidates = candidates(&snapshot, &search, folder.as_deref());
        let defs = self.catalog.resolve(&category);
        let key = MemoKey {
            source: source.clone(),
            category: category.clone(),
            search,
            folder,
            selection: selection_key(&previous),
            data_version,
        };

        let result = {
            let memoized = self.memo.lock().unwrap_or_else(PoisonError::into_inner).get(&key);
            let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
            let shared = match memoized {
                Some(groups) => {
                    tracing::debug!(selected = key.selection.len(), data_version, "Facet memo hit");
                    groups
                },
                None => {
                    tracing::debug!(selected = key.selection.len(), data_version, "Facet memo miss");
                    let filtered = apply(&candidates, &previous, &defs);
                    let built: Arc<[FacetGroup]> = build_groups(&filtered, &defs, &mut registry).into();
                    self.memo.lock().unwrap_or_else(PoisonError::into_inner).put(key, Arc::clone(&built));
                    built
                },
            };
            recompute(&candidates, &defs, &previous, &mut registry, Some(&shared[..]))
        };

        {
            let mut guard = self.view.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(view) = guard.as_mut()
                && view.revision == revision
                && view.source == source
                && view.category == category
            {
                view.groups = result.groups.clone();
            }
        }

        Ok(FilteredResult {
            entries: result.filtered.into_iter().cloned().collect(),
            groups: result.groups,
            hierarchy: snapshot.hierarchy.clone(),
            data_version,
        })
    }

    /// Drop cached snapshots. `None` matches every source or category.
    pub fn invalidate(&self, source: Option<&str>, category: Option<&str>) -> usize {
        let removed = self.snapshots.invalidate(source, category);
        let version = self.snapshots.current_version();
        self.memo.lock().unwrap_or_else(PoisonError::into_inner).retain_version(version);
        removed
    }

    /// Reload a view from the provider, replace its snapshot and report what
    /// changed.
    ///
    /// The fetched snapshot always replaces the cached one, so folder and
    /// ordering changes show up even when no entry changed. Thumbnails whose
    /// source no cached snapshot references any more are pruned, but only
    /// when the rescan removed entries.
    #[tracing::instrument(level = "info", skip(self))]
    pub async fn rescan(&self, source: &str, category: &str) -> Result<ScanReport> {
        let next = fetch(self.provider.as_ref(), source, category)
            .await
            .or_raise(|| ErrorKind::Load(format!("{source}:{category}")))?;
        let entries = next.entries.len();
        let changes = match self.snapshots.get(source, category) {
            Some(previous) => diff(&previous.entries, &next.entries),
            None => diff(&[], &next.entries),
        };

        self.snapshots.replace(source, category, next);
        let data_version = self.snapshots.current_version();
        self.memo.lock().unwrap_or_else(PoisonError::into_inner).retain_version(data_version);

        let live: HashSet<String> = self
            .snapshots
            .snapshots()
            .iter()
            .flat_map(|(_, _, snapshot)| snapshot.entries.iter().filter_map(|entry| entry.image.clone()))
            .collect();
        let pruned = self.thumbnails().prune(&live, changes.removed.len(), false).await;
        tracing::info!(
            entries,
            added = changes.added.len(),
            removed = changes.removed.len(),
            changed = changes.changed,
            pruned,
            data_version,
            "Rescan complete"
        );
        Ok(ScanReport { diff: changes, entries, pruned, data_version })
    }

    /// Apply a tag edit to every cached copy of an entry.
    pub fn update_tags(&self, update: &TagUpdate) -> bool {
        self.snapshots.update_tags(update)
    }

    /// Start hydrating thumbnails for the active view, superseding any job
    /// the view already had running.
    pub fn request_hydration(&self, items: Vec<HydrationItem>) -> Result<JobHandle> {
        let job_key = {
            let guard = self.view.lock().unwrap_or_else(PoisonError::into_inner);
            guard.as_ref().ok_or_else(|| exn::Exn::from(ErrorKind::NoActiveView))?.job_key()
        };
        Ok(self.scheduler.request(job_key, items))
    }

    /// Stop the active view's hydration job, if one is running.
    pub fn cancel_hydration(&self) -> bool {
        let guard = self.view.lock().unwrap_or_else(PoisonError::into_inner);
        guard.as_ref().is_some_and(|view| self.scheduler.cancel(&view.job_key()))
    }

    /// A thumbnail failed to display. Evicts every cached thumbnail stored at
    /// that location and returns the keys that were evicted.
    pub async fn report_broken(&self, location: &str) -> Vec<CacheKey> {
        let evicted = self.thumbnails().evict_broken(location).await;
        if !evicted.is_empty() {
            tracing::debug!(location, evicted = evicted.len(), "Evicted broken thumbnails");
        }
        evicted
    }

    /// Forget every thumbnail, deleting files too when `clear_disk` is set.
    pub async fn clear_thumbnails(&self, clear_disk: bool) -> Result<usize> {
        match self.thumbnails().clear(clear_disk).await {
            Ok(cleared) => Ok(cleared),
            Err(err) if err.is_refusal() => Err(err).or_raise(|| ErrorKind::PermissionDenied("thumbnails".to_string())),
            Err(err) => Err(err).or_raise(|| ErrorKind::Thumbnail),
        }
    }

    /// Persist pending manifest changes now.
    pub async fn flush(&self) -> Result<()> {
        match self.thumbnails().flush().await {
            Ok(()) => Ok(()),
            Err(err) if err.is_refusal() => Err(err).or_raise(|| ErrorKind::PermissionDenied("manifest".to_string())),
            Err(err) => Err(err).or_raise(|| ErrorKind::Thumbnail),
        }
    }
}

/// Entries matching the search text and folder, in snapshot order.
fn candidates<'a>(snapshot: &'a Snapshot, search: &str, folder: Option<&str>) -> Vec<&'a Entry> {
    let needle = search.to_lowercase();
    // A folder missing from the hierarchy still matches entries that name it.
    let folders = folder
        .map(|folder| subtree_ids(&snapshot.hierarchy, folder).unwrap_or_else(|| HashSet::from([folder.to_string()])));
    snapshot
        .entries
        .iter()
        .filter(|entry| needle.is_empty() || entry.name.to_lowercase().contains(&needle))
        .filter(|entry| {
            folders
                .as_ref()
                .is_none_or(|ids| entry.folder.as_ref().is_some_and(|folder| ids.contains(folder)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use librarian_config::MemorySettings;
    use librarian_storage::backend::MockBackend;
    use librarian_thumbnail::{HydrationEvent, Outcome, Rendered};
    use serde_json::json;
    use std::time::Duration;

    /// Serves whatever entries it currently holds.
    #[derive(Default)]
    struct StaticProvider {
        entries: Mutex<Vec<Entry>>,
        hierarchy: Mutex<Vec<Folder>>,
        fail: bool,
    }

    impl StaticProvider {
        fn new(entries: Vec<Entry>) -> Self {
            Self { entries: Mutex::new(entries), ..Self::default() }
        }

        fn set(&self, entries: Vec<Entry>) {
            *self.entries.lock().unwrap() = entries;
        }

        fn set_hierarchy(&self, hierarchy: Vec<Folder>) {
            *self.hierarchy.lock().unwrap() = hierarchy;
        }
    }

    #[async_trait]
    impl EntryProvider for StaticProvider {
        async fn list_entries(&self, _category: &str, source: &str) -> librarian_cache::error::Result<Vec<Entry>> {
            if self.fail {
                exn::bail!(librarian_cache::error::ErrorKind::Storage(source.to_string()));
            }
            Ok(self.entries.lock().unwrap().clone())
        }

        async fn list_hierarchy(&self, _category: &str, _source: &str) -> librarian_cache::error::Result<Vec<Folder>> {
            Ok(self.hierarchy.lock().unwrap().clone())
        }
    }

    struct BytesRenderer;

    #[async_trait]
    impl Renderer for BytesRenderer {
        async fn render(&self, source: &str, _transform: &Transform) -> librarian_thumbnail::error::Result<Rendered> {
            Ok(Rendered::Bytes(source.as_bytes().to_vec()))
        }
    }

    fn items() -> Vec<Entry> {
        vec![
            Entry::new("1", "Sword", "Item").with_image("icons/sword.webp").with_fields(json!({"type": "weapon"})),
            Entry::new("2", "Shield", "Item").with_image("icons/shield.webp").with_fields(json!({"type": "armor"})),
            Entry::new("3", "Short Bow", "Item").with_image("icons/bow.webp").with_fields(json!({"type": "weapon"})),
        ]
    }

    fn librarian(provider: Arc<StaticProvider>) -> Librarian {
        let store = Arc::new(MockBackend::default());
        let manifest = Manifest::new(Arc::new(MemorySettings::new()), Duration::from_millis(400));
        let cache = ThumbnailCache::new(16, manifest, Some(store as BackendHandle), "thumbs");
        let options = SchedulerOptions { batch_delay: Duration::ZERO, ..SchedulerOptions::default() };
        Librarian::new(provider, FieldCatalog::with_defaults(), Arc::new(cache), Arc::new(BytesRenderer), options)
    }

    fn names(result: &FilteredResult) -> Vec<&str> {
        result.entries.iter().map(|entry| entry.name.as_str()).collect()
    }

    fn group<'a>(result: &'a FilteredResult, key: &str) -> &'a FacetGroup {
        result.groups.iter().find(|group| group.key == key).unwrap()
    }

    #[tokio::test]
    async fn test_nothing_open() {
        let librarian = librarian(Arc::new(StaticProvider::default()));
        let err = librarian.get_filtered_result().await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NoActiveView));
        assert!(librarian.set_search("x").is_err());
    }

    #[tokio::test]
    async fn test_selecting_keeps_alternatives_visible() {
        let librarian = librarian(Arc::new(StaticProvider::new(items())));
        librarian.open("world", "Item");
        let first = librarian.get_filtered_result().await.unwrap();
        assert_eq!(first.entries.len(), 3);
        assert_eq!(group(&first, "type").options.len(), 2);

        assert_eq!(librarian.cycle_filter("type", "weapon").unwrap(), FilterState::Include);
        let result = librarian.get_filtered_result().await.unwrap();
        assert_eq!(names(&result), ["Sword", "Short Bow"]);
        let types = group(&result, "type");
        assert_eq!(types.options.len(), 2);
        assert_eq!(types.option("weapon").unwrap().state, FilterState::Include);
        assert_eq!(types.option("armor").unwrap().state, FilterState::Off);
    }

    #[tokio::test]
    async fn test_and_on_two_single_valued_options_is_empty() {
        let librarian = librarian(Arc::new(StaticProvider::new(items())));
        librarian.open("world", "Item");
        librarian.get_filtered_result().await.unwrap();
        librarian.set_filter_state("type", "weapon", FilterState::And).unwrap();
        librarian.set_filter_state("type", "armor", FilterState::And).unwrap();
        let result = librarian.get_filtered_result().await.unwrap();
        assert!(result.entries.is_empty());

        librarian.reset_filters().unwrap();
        assert_eq!(librarian.get_filtered_result().await.unwrap().entries.len(), 3);
    }

    #[tokio::test]
    async fn test_exclude_and_search() {
        let librarian = librarian(Arc::new(StaticProvider::new(items())));
        librarian.open("world", "Item");
        librarian.get_filtered_result().await.unwrap();
        assert_eq!(librarian.toggle_exclude("type", "armor").unwrap(), FilterState::Exclude);
        librarian.set_search("  SHORT ").unwrap();
        let result = librarian.get_filtered_result().await.unwrap();
        assert_eq!(names(&result), ["Short Bow"]);
    }

    #[tokio::test]
    async fn test_unknown_selection() {
        let librarian = librarian(Arc::new(StaticProvider::new(items())));
        librarian.open("world", "Item");
        librarian.get_filtered_result().await.unwrap();
        let err = librarian.cycle_filter("type", "staff").unwrap_err();
        assert!(matches!(&*err, ErrorKind::Filter));
        let err = librarian.set_filter_state("rarity", "rare", FilterState::Include).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Filter));
    }

    #[tokio::test]
    async fn test_open_resets_selection() {
        let librarian = librarian(Arc::new(StaticProvider::new(items())));
        librarian.open("world", "Item");
        librarian.get_filtered_result().await.unwrap();
        librarian.cycle_filter("type", "armor").unwrap();
        assert_eq!(librarian.get_filtered_result().await.unwrap().entries.len(), 1);
        librarian.open("world", "Item");
        assert_eq!(librarian.get_filtered_result().await.unwrap().entries.len(), 3);
    }

    #[tokio::test]
    async fn test_folder_includes_nested_folders() {
        let provider = StaticProvider::new(vec![
            Entry::new("1", "Goblin", "Actor").with_folder("monsters"),
            Entry::new("2", "Cave Goblin", "Actor").with_folder("caves"),
            Entry::new("3", "Innkeeper", "Actor").with_folder("npcs"),
        ]);
        provider.set_hierarchy(librarian_model::build_tree([
            Folder::new("monsters", "Monsters", None),
            Folder::new("caves", "Caves", Some("monsters".to_string())),
            Folder::new("npcs", "NPCs", None),
        ]));
        let librarian = librarian(Arc::new(provider));
        librarian.open("world", "Actor");
        librarian.set_folder(Some("monsters")).unwrap();
        let result = librarian.get_filtered_result().await.unwrap();
        assert_eq!(names(&result), ["Goblin", "Cave Goblin"]);

        librarian.set_folder(Some("unlisted")).unwrap();
        assert!(librarian.get_filtered_result().await.unwrap().entries.is_empty());
    }

    #[tokio::test]
    async fn test_load_failure_is_not_cached() {
        let provider = StaticProvider { fail: true, ..StaticProvider::default() };
        let librarian = librarian(Arc::new(provider));
        librarian.open("world", "Item");
        let err = librarian.get_filtered_result().await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Load(view) if view == "world:Item"));
        assert!(librarian.snapshots().get("world", "Item").is_none());
    }

    #[tokio::test]
    async fn test_tag_update_is_visible_to_next_pass() {
        let librarian = librarian(Arc::new(StaticProvider::new(items())));
        librarian.open("world", "Item");
        let before = librarian.get_filtered_result().await.unwrap();
        let updated = librarian.update_tags(&TagUpdate {
            id: "1".into(),
            filter_tags: vec!["Legendary".into()],
            ..TagUpdate::default()
        });
        assert!(updated);
        let after = librarian.get_filtered_result().await.unwrap();
        assert!(after.data_version > before.data_version);
        let sword = after.entries.iter().find(|entry| entry.id == "1").unwrap();
        assert!(sword.filter_tags().is_some());
    }

    #[tokio::test]
    async fn test_rescan_reports_changes_and_prunes() {
        let provider = Arc::new(StaticProvider::new(items()));
        let librarian = librarian(Arc::clone(&provider));
        librarian.open("world", "Item");
        let result = librarian.get_filtered_result().await.unwrap();
        let outcome = librarian.request_hydration(result.hydration_items(2)).unwrap().wait().await;
        assert!(matches!(outcome, Outcome::Completed(metrics) if metrics.built == 3));

        let unchanged = librarian.rescan("world", "Item").await.unwrap();
        assert!(unchanged.diff.is_empty());
        assert_eq!(unchanged.pruned, 0);

        provider.set(items().into_iter().filter(|entry| entry.id != "2").collect());
        let report = librarian.rescan("world", "Item").await.unwrap();
        assert_eq!(report.diff.removed, ["2"]);
        assert_eq!(report.entries, 2);
        assert_eq!(report.pruned, 1);
        assert!(report.data_version > result.data_version);
        assert_eq!(librarian.get_filtered_result().await.unwrap().entries.len(), 2);
    }

    #[tokio::test]
    async fn test_rescan_replaces_snapshot_when_only_folders_move() {
        let provider = Arc::new(StaticProvider::new(items()));
        provider.set_hierarchy(vec![Folder::new("monsters", "Monsters", None)]);
        let librarian = librarian(Arc::clone(&provider));
        librarian.open("world", "Item");
        let before = librarian.get_filtered_result().await.unwrap();
        assert_eq!(before.hierarchy.len(), 1);

        provider.set_hierarchy(vec![
            Folder::new("monsters", "Renamed Monsters", None),
            Folder::new("new", "New Folder", None),
        ]);
        let mut reordered = items();
        reordered[0].sort = 99;
        provider.set(reordered);

        let report = librarian.rescan("world", "Item").await.unwrap();
        assert!(report.diff.is_empty());
        assert_eq!(report.pruned, 0);
        assert!(report.data_version > before.data_version);

        let after = librarian.get_filtered_result().await.unwrap();
        assert_eq!(after.data_version, report.data_version);
        let labels: Vec<&str> = after.hierarchy.iter().map(|folder| folder.name.as_str()).collect();
        assert_eq!(labels, ["Renamed Monsters", "New Folder"]);
        assert_eq!(after.entries.iter().find(|entry| entry.id == "1").unwrap().sort, 99);
    }

    #[tokio::test]
    async fn test_hydration_and_broken_report() {
        let librarian = librarian(Arc::new(StaticProvider::new(items())));
        librarian.open("world", "Item");
        let result = librarian.get_filtered_result().await.unwrap();
        let mut job = librarian.request_hydration(result.hydration_items(1)).unwrap();
        assert_eq!(job.key(), "world:Item");

        let mut location = None;
        while let Some(event) = job.next().await {
            if let HydrationEvent::Resolved { id, thumbnail, .. } = event
                && id == "1"
            {
                location = thumbnail.location().map(|path| path.to_string_lossy().into_owned());
            }
        }
        let location = location.unwrap();
        let evicted = librarian.report_broken(&location).await;
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].source(), "icons/sword.webp");
        assert!(librarian.report_broken(&location).await.is_empty());
        librarian.flush().await.unwrap();
    }

    #[tokio::test]
    async fn test_clear_thumbnails() {
        let librarian = librarian(Arc::new(StaticProvider::new(items())));
        librarian.open("world", "Item");
        let result = librarian.get_filtered_result().await.unwrap();
        librarian.request_hydration(result.hydration_items(3)).unwrap().wait().await;
        assert_eq!(librarian.clear_thumbnails(true).await.unwrap(), 3);
        assert_eq!(librarian.thumbnails().memory_len(), 0);
    }

    #[tokio::test]
    async fn test_invalidate_reloads() {
        let provider = Arc::new(StaticProvider::new(items()));
        let librarian = librarian(Arc::clone(&provider));
        librarian.open("world", "Item");
        librarian.get_filtered_result().await.unwrap();
        provider.set(Vec::new());
        assert_eq!(librarian.get_filtered_result().await.unwrap().entries.len(), 3);
        assert_eq!(librarian.invalidate(Some("world"), None), 1);
        assert!(librarian.get_filtered_result().await.unwrap().entries.is_empty());
    }
}
