//! Versioned entry snapshots.
//!
//! A snapshot is everything one category of one source contains at a point
//! in time. Snapshots are shared read-only through [`Arc`] and only ever
//! replaced wholesale. Any change to the set of cached snapshots bumps a
//! single monotonically increasing data version, which derived caches
//! include in their keys.

use crate::error::{ErrorKind, Result};
use crate::provider::EntryProvider;
use exn::ResultExt;
use librarian_model::{Entry, Folder};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub entries: Vec<Entry>,
    pub hierarchy: Vec<Folder>,
}
impl Snapshot {
    pub fn new(entries: Vec<Entry>, hierarchy: Vec<Folder>) -> Self {
        Self { entries, hierarchy }
    }
}

/// Notification that an entry's tags were edited elsewhere.
///
/// `source` and `category` narrow which snapshots are searched; `None`
/// searches all of them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TagUpdate {
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    pub id: String,
    #[serde(default)]
    pub category_tag: Option<String>,
    #[serde(default)]
    pub filter_tags: Vec<String>,
}

type SnapshotKey = (String, String);

#[derive(Debug, Default)]
pub struct SnapshotCache {
    snapshots: RwLock<HashMap<SnapshotKey, Arc<Snapshot>>>,
    version: AtomicU64,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    fn bump(&self) -> u64 {
        self.version.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn get(&self, source: &str, category: &str) -> Option<Arc<Snapshot>> {
        let snapshots = self.snapshots.read().unwrap_or_else(PoisonError::into_inner);
        snapshots.get(&(source.to_string(), category.to_string())).cloned()
    }

    /// Return the cached snapshot, or run `loader` and cache its result.
    ///
    /// Concurrent misses for the same key are not deduplicated; the last
    /// loader to finish wins. A failing loader leaves the cache untouched.
    pub async fn get_or_load<F, Fut>(&self, source: &str, category: &str, loader: F) -> Result<Arc<Snapshot>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Snapshot>>,
    {
        if let Some(snapshot) = self.get(source, category) {
            tracing::debug!(source, category, "Snapshot cache hit");
            return Ok(snapshot);
        }
        tracing::debug!(source, category, "Snapshot cache miss");
        let snapshot = Arc::new(loader().await?);
        let mut snapshots = self.snapshots.write().unwrap_or_else(PoisonError::into_inner);
        snapshots.insert((source.to_string(), category.to_string()), Arc::clone(&snapshot));
        Ok(snapshot)
    }

    /// [`get_or_load`](Self::get_or_load) with a provider as the loader.
    pub async fn load_from(&self, provider: &dyn EntryProvider, source: &str, category: &str) -> Result<Arc<Snapshot>> {
        self.get_or_load(source, category, || fetch(provider, source, category)).await
    }

    /// Replace a snapshot wholesale, returning the previous one.
    pub fn replace(&self, source: &str, category: &str, snapshot: Snapshot) -> Option<Arc<Snapshot>> {
        let previous = {
            let mut snapshots = self.snapshots.write().unwrap_or_else(PoisonError::into_inner);
            snapshots.insert((source.to_string(), category.to_string()), Arc::new(snapshot))
        };
        let version = self.bump();
        tracing::debug!(source, category, version, "Replaced snapshot");
        previous
    }

    /// Drop every snapshot matching the filters and return how many were
    /// dropped. The data version is bumped exactly once per call, even when
    /// nothing matched.
    pub fn invalidate(&self, source: Option<&str>, category: Option<&str>) -> usize {
        let removed = {
            let mut snapshots = self.snapshots.write().unwrap_or_else(PoisonError::into_inner);
            let before = snapshots.len();
            snapshots.retain(|(s, c), _| !(matches(source, s) && matches(category, c)));
            before - snapshots.len()
        };
        let version = self.bump();
        tracing::debug!(source, category, removed, version, "Invalidated snapshots");
        removed
    }

    /// Every cached snapshot with its `(source, category)`.
    pub fn snapshots(&self) -> Vec<(String, String, Arc<Snapshot>)> {
        let snapshots = self.snapshots.read().unwrap_or_else(PoisonError::into_inner);
        let mut all: Vec<_> = snapshots
            .iter()
            .map(|((source, category), snapshot)| (source.clone(), category.clone(), Arc::clone(snapshot)))
            .collect();
        all.sort_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)));
        all
    }

    /// Apply a tag edit to every cached copy of the entry. Returns `true`
    /// (and bumps the data version) if any copy was updated.
    pub fn update_tags(&self, update: &TagUpdate) -> bool {
        let mut updated = 0usize;
        {
            let mut snapshots = self.snapshots.write().unwrap_or_else(PoisonError::into_inner);
            for ((source, category), snapshot) in snapshots.iter_mut() {
                if !matches(update.source.as_deref(), source) || !matches(update.category.as_deref(), category) {
                    continue;
                }
                if !snapshot.entries.iter().any(|entry| entry.id == update.id) {
                    continue;
                }
                // Readers holding the old Arc keep their copy.
                let snapshot = Arc::make_mut(snapshot);
                for entry in snapshot.entries.iter_mut().filter(|entry| entry.id == update.id) {
                    entry.set_tags(update.category_tag.clone(), update.filter_tags.clone());
                    updated += 1;
                }
            }
        }
        if updated == 0 {
            tracing::debug!(id = %update.id, "Tag update matched no cached entry");
            return false;
        }
        let version = self.bump();
        tracing::debug!(id = %update.id, updated, version, "Applied tag update");
        true
    }
}

fn matches(filter: Option<&str>, value: &str) -> bool {
    filter.is_none_or(|filter| filter == value)
}

/// Load a fresh snapshot from a provider without touching any cache.
pub async fn fetch(provider: &dyn EntryProvider, source: &str, category: &str) -> Result<Snapshot> {
    let label = || ErrorKind::Provider(format!("{source}:{category}"));
    let entries = provider.list_entries(category, source).await.or_raise(label)?;
    let hierarchy = provider.list_hierarchy(category, source).await.or_raise(label)?;
    Ok(Snapshot::new(entries, hierarchy))
}
