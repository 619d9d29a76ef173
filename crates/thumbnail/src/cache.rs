use crate::error::{ErrorKind, Result};
use crate::key::CacheKey;
use crate::manifest::Manifest;
use crate::memory::MemoryCache;
use exn::ResultExt;
use librarian_storage::error::ErrorKind as StorageErrorKind;
use librarian_storage::{BackendHandle, normalize_location};
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// A thumbnail ready to show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Thumbnail {
    /// Stored in the durable store at this location.
    Location(PathBuf),
    /// Held in memory only, because it could not be persisted.
    Inline(Arc<[u8]>),
}
impl Thumbnail {
    pub fn location(&self) -> Option<&Path> {
        match self {
            Self::Location(location) => Some(location),
            Self::Inline(_) => None,
        }
    }
}

/// Renderer output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rendered {
    /// Encoded image bytes that still need persisting.
    Bytes(Vec<u8>),
    /// The renderer persisted the thumbnail itself.
    Location(PathBuf),
}

/// Tier a lookup was answered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Memory,
    Durable,
}

/// Two-tier thumbnail cache: a bounded in-memory LRU in front of a durable
/// manifest of persisted files.
///
/// A manifest entry is only ever recorded after its bytes were persisted, so
/// the durable tier never points at a file that was never written. Files
/// that go missing later are dropped through [`evict_broken`](Self::evict_broken).
pub struct ThumbnailCache {
    memory: Mutex<MemoryCache<CacheKey, Thumbnail>>,
    manifest: Manifest,
    store: Option<BackendHandle>,
    directory: PathBuf,
}

impl ThumbnailCache {
    /// `store` is where rendered bytes are persisted; without one, every
    /// thumbnail stays in memory.
    pub fn new(capacity: usize, manifest: Manifest, store: Option<BackendHandle>, directory: impl Into<PathBuf>) -> Self {
        Self {
            memory: Mutex::new(MemoryCache::new(capacity)),
            manifest,
            store,
            directory: directory.into(),
        }
    }

    fn memory(&self) -> std::sync::MutexGuard<'_, MemoryCache<CacheKey, Thumbnail>> {
        self.memory.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn memory_len(&self) -> usize {
        self.memory().len()
    }

    /// Memory first, then the manifest. Manifest hits are promoted into memory.
    pub async fn lookup(&self, key: &CacheKey) -> Option<(Thumbnail, Tier)> {
        if let Some(thumbnail) = self.memory().get(key) {
            tracing::trace!(%key, "Thumbnail memory hit");
            return Some((thumbnail, Tier::Memory));
        }
        let location = self.manifest.get(key).await?;
        tracing::trace!(%key, location = %location.display(), "Thumbnail durable hit");
        let thumbnail = Thumbnail::Location(location);
        self.memory().put(key.clone(), thumbnail.clone());
        Some((thumbnail, Tier::Durable))
    }

    /// Record a rendered thumbnail.
    ///
    /// Bytes are persisted before the manifest learns about them. If the
    /// write fails the thumbnail is kept in memory only and the failure is
    /// logged, never returned.
    pub async fn store(&self, key: &CacheKey, rendered: Rendered) -> Thumbnail {
        let thumbnail = match rendered {
            Rendered::Location(location) => {
                self.manifest.insert(key.clone(), location.clone()).await;
                Thumbnail::Location(location)
            },
            Rendered::Bytes(bytes) => match &self.store {
                None => Thumbnail::Inline(bytes.into()),
                Some(store) => match store.write(&key.disk_path(&self.directory), &bytes).await {
                    Ok(location) => {
                        self.manifest.insert(key.clone(), location.clone()).await;
                        Thumbnail::Location(location)
                    },
                    Err(err) => {
                        tracing::warn!(%key, backend = store.name(), error = ?err, "Keeping thumbnail in memory only");
                        Thumbnail::Inline(bytes.into())
                    },
                },
            },
        };
        if let Some((evicted, _)) = self.memory().put(key.clone(), thumbnail.clone()) {
            tracing::trace!(key = %evicted, "Evicted thumbnail from memory");
        }
        thumbnail
    }

    /// Drop every entry, in both tiers, that points at `location`.
    ///
    /// Locations are compared after normalisation, so a URL reported by a
    /// viewer matches the relative path recorded when the file was stored.
    pub async fn evict_broken(&self, location: &str) -> Vec<CacheKey> {
        let target = normalize_location(location);
        if target.is_empty() {
            return Vec::new();
        }
        let is_target = |candidate: &Path| normalize_location(&candidate.to_string_lossy()) == target;
        let mut evicted: BTreeSet<CacheKey> =
            self.manifest.remove_where(|_, stored| is_target(stored.as_path())).await.into_iter().map(|(key, _)| key).collect();
        {
            let mut memory = self.memory();
            memory.retain(|key, thumbnail| {
                let broken = evicted.contains(key) || thumbnail.location().is_some_and(is_target);
                if broken {
                    evicted.insert(key.clone());
                }
                !broken
            });
        }
        tracing::debug!(location, evicted = evicted.len(), "Evicted broken thumbnail");
        evicted.into_iter().collect()
    }

    /// Forget one source in every transform so it is rebuilt on next request.
    pub async fn forget(&self, source: &str) -> usize {
        let removed = self.manifest.remove_where(|key, _| key.source() == source).await.len();
        removed.max(self.memory().retain(|key, _| key.source() != source))
    }

    /// Drop entries whose source is no longer live.
    ///
    /// Pruning only runs when the last rescan removed something, or when
    /// forced. Pruned files are deleted from the store on a best-effort basis.
    pub async fn prune(&self, live_sources: &HashSet<String>, removals: usize, force: bool) -> usize {
        if removals == 0 && !force {
            return 0;
        }
        let pruned = self.manifest.remove_where(|key, _| !live_sources.contains(key.source())).await;
        let dropped = self.memory().retain(|key, _| live_sources.contains(key.source()));
        if let Some(store) = &self.store {
            for (key, location) in &pruned {
                if let Err(err) = store.delete(location).await
                    && !matches!(&*err, StorageErrorKind::NotFound(_))
                {
                    tracing::warn!(%key, location = %location.display(), error = ?err, "Failed to delete pruned thumbnail");
                }
            }
        }
        tracing::info!(removals, force, pruned = pruned.len(), dropped, "Pruned thumbnail cache");
        pruned.len().max(dropped)
    }

    /// Empty both tiers and persist the empty manifest.
    ///
    /// With `clear_disk`, every known thumbnail file and anything else left in
    /// the thumbnail directory is deleted first. A refusal from the store is
    /// returned as [`ErrorKind::PermissionDenied`]; other deletion failures
    /// are logged.
    pub async fn clear(&self, clear_disk: bool) -> Result<usize> {
        let known = self.manifest.entries().await;
        let mut deleted = 0;
        if clear_disk && let Some(store) = &self.store {
            let mut locations: BTreeSet<PathBuf> = known.iter().map(|(_, location)| location.clone()).collect();
            match store.list(Some(self.directory.as_path())).await {
                Ok(files) => locations.extend(files.into_iter().map(|info| info.path)),
                Err(err) => tracing::warn!(directory = %self.directory.display(), error = ?err, "Could not list thumbnail directory"),
            }
            for location in &locations {
                match store.delete(location).await {
                    Ok(()) => deleted += 1,
                    Err(err) if matches!(&*err, StorageErrorKind::NotFound(_)) => {},
                    Err(err) if err.is_refusal() => {
                        return Err(err).or_raise(|| ErrorKind::PermissionDenied(location.display().to_string()));
                    },
                    Err(err) => {
                        tracing::warn!(location = %location.display(), error = ?err, "Failed to delete thumbnail");
                    },
                }
            }
        }
        self.memory().clear();
        let cleared = self.manifest.clear().await.len();
        self.manifest.flush().await?;
        tracing::info!(cleared, deleted, clear_disk, "Cleared thumbnail cache");
        Ok(cleared.max(deleted))
    }

    /// Persist the manifest now.
    pub async fn flush(&self) -> Result<()> {
        self.manifest.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::Transform;
    use librarian_config::{BackendSettings, MemorySettings};
    use librarian_storage::backend::{MockBackend, StorageBackend};
    use std::time::Duration;

    fn key(source: &str) -> CacheKey {
        CacheKey::new(source, &Transform::default())
    }

    fn cache(capacity: usize, store: Arc<MockBackend>) -> ThumbnailCache {
        let manifest = Manifest::new(Arc::new(MemorySettings::new()), Duration::from_millis(400));
        ThumbnailCache::new(capacity, manifest, Some(store as BackendHandle), "thumbs")
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_persists_then_records() {
        let store = Arc::new(MockBackend::default());
        let cache = cache(10, store.clone());
        let key = key("maps/cave.webp");

        let thumbnail = cache.store(&key, Rendered::Bytes(b"RIFF".to_vec())).await;
        let expected = key.disk_path(Path::new("thumbs"));
        assert_eq!(thumbnail, Thumbnail::Location(expected.clone()));
        assert_eq!(store.read(&expected).await.unwrap(), b"RIFF");
        assert_eq!(cache.manifest().get(&key).await, Some(expected));
        assert_eq!(cache.lookup(&key).await.map(|(_, tier)| tier), Some(Tier::Memory));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_persist_never_reaches_manifest() {
        let store = Arc::new(MockBackend::default());
        store.fail_writes(true);
        let cache = cache(10, store.clone());
        let key = key("maps/cave.webp");

        let thumbnail = cache.store(&key, Rendered::Bytes(b"RIFF".to_vec())).await;
        assert_eq!(thumbnail, Thumbnail::Inline(Arc::from(&b"RIFF"[..])));
        assert!(cache.manifest().is_empty().await);
        assert_eq!(cache.lookup(&key).await, Some((thumbnail, Tier::Memory)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_without_store_everything_is_inline() {
        let manifest = Manifest::new(Arc::new(MemorySettings::new()), Duration::from_millis(400));
        let cache = ThumbnailCache::new(10, manifest, None, "thumbs");
        let thumbnail = cache.store(&key("a.png"), Rendered::Bytes(vec![1, 2, 3])).await;
        assert!(matches!(thumbnail, Thumbnail::Inline(_)));
        assert!(cache.manifest().is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_durable_hit_is_promoted() {
        let store = Arc::new(MockBackend::default());
        let cache = cache(1, store);
        let first = key("a.png");
        let second = key("b.png");
        cache.store(&first, Rendered::Location(PathBuf::from("thumbs/aa/a.webp"))).await;
        // Pushes the first key out of memory.
        cache.store(&second, Rendered::Location(PathBuf::from("thumbs/bb/b.webp"))).await;
        assert_eq!(cache.memory_len(), 1);

        let (thumbnail, tier) = cache.lookup(&first).await.unwrap();
        assert_eq!(tier, Tier::Durable);
        assert_eq!(thumbnail, Thumbnail::Location(PathBuf::from("thumbs/aa/a.webp")));
        assert_eq!(cache.lookup(&first).await.map(|(_, tier)| tier), Some(Tier::Memory));
    }

    #[tokio::test(start_paused = true)]
    async fn test_evict_broken_matches_urls_and_all_transforms() {
        let cache = cache(10, Arc::new(MockBackend::default()));
        let small = key("maps/cave.webp");
        let large = CacheKey::new("maps/cave.webp", &Transform::new(400, 400, 80, "webp"));
        let other = key("maps/keep.webp");
        cache.store(&small, Rendered::Location(PathBuf::from("thumbs/ab/shared.webp"))).await;
        cache.store(&large, Rendered::Location(PathBuf::from("thumbs/ab/shared.webp"))).await;
        cache.store(&other, Rendered::Location(PathBuf::from("thumbs/cd/other.webp"))).await;

        let evicted = cache.evict_broken("https://example.com/thumbs/ab/shared.webp?v=3#top").await;
        assert_eq!(evicted.len(), 2);
        assert!(cache.lookup(&small).await.is_none());
        assert!(cache.lookup(&large).await.is_none());
        assert!(cache.lookup(&other).await.is_some());
        assert!(cache.evict_broken("").await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_forget_source() {
        let cache = cache(10, Arc::new(MockBackend::default()));
        cache.store(&key("a.png"), Rendered::Bytes(vec![1])).await;
        cache.store(&key("b.png"), Rendered::Bytes(vec![2])).await;
        assert_eq!(cache.forget("a.png").await, 1);
        assert!(cache.lookup(&key("a.png")).await.is_none());
        assert!(cache.lookup(&key("b.png")).await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_prune_is_gated_on_removals() {
        let store = Arc::new(MockBackend::default());
        let cache = cache(10, store.clone());
        cache.store(&key("a.png"), Rendered::Bytes(vec![1])).await;
        cache.store(&key("gone.png"), Rendered::Bytes(vec![2])).await;
        let live: HashSet<String> = ["a.png".to_string()].into();

        assert_eq!(cache.prune(&live, 0, false).await, 0);
        assert_eq!(cache.manifest().len().await, 2);

        assert_eq!(cache.prune(&live, 1, false).await, 1);
        assert_eq!(cache.manifest().len().await, 1);
        assert!(cache.lookup(&key("gone.png")).await.is_none());
        assert_eq!(store.paths().await, vec![key("a.png").disk_path(Path::new("thumbs"))]);

        let nothing: HashSet<String> = HashSet::new();
        assert_eq!(cache.prune(&nothing, 0, true).await, 1);
        assert!(cache.manifest().is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_removes_files_and_persists_empty_manifest() {
        let store = Arc::new(MockBackend::with_files([("thumbs/zz/stray.webp", b"RIFF".to_vec())]));
        let settings = Arc::new(BackendSettings::new(store.clone(), "settings"));
        let manifest = Manifest::new(settings.clone(), Duration::from_millis(400));
        let cache = ThumbnailCache::new(10, manifest, Some(store.clone() as BackendHandle), "thumbs");
        cache.store(&key("a.png"), Rendered::Bytes(vec![1])).await;
        cache.store(&key("b.png"), Rendered::Bytes(vec![2])).await;

        assert_eq!(cache.clear(true).await.unwrap(), 3);
        assert_eq!(cache.memory_len(), 0);
        assert_eq!(store.paths().await, vec![PathBuf::from("settings/thumbnails.manifest.json")]);
        let stored = librarian_config::SettingsStore::get(&*settings, crate::manifest::MANIFEST_KEY).await.unwrap();
        assert_eq!(stored, Some(serde_json::json!({})));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_surfaces_refusal() {
        let store = Arc::new(MockBackend::default());
        let cache = cache(10, store.clone());
        cache.store(&key("a.png"), Rendered::Bytes(vec![1])).await;
        store.deny_writes(true);
        let err = cache.clear(true).await.unwrap_err();
        assert!(err.is_refusal());
    }
}
