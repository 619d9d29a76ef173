use librarian_facet::{FacetGroup, SelectionKey};
use librarian_thumbnail::MemoryCache;
use std::sync::Arc;

/// Everything the unselected facet groups of a view depend on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct MemoKey {
    pub source: String,
    pub category: String,
    pub search: String,
    pub folder: Option<String>,
    pub selection: SelectionKey,
    pub data_version: u64,
}

/// Bounded memo of facet groups built from a filtered set.
///
/// Keys carry the data version, so a bumped version makes every older entry
/// unreachable; those are left for the LRU to push out.
#[derive(Debug)]
pub(crate) struct GroupMemo {
    groups: MemoryCache<MemoKey, Arc<[FacetGroup]>>,
}

impl GroupMemo {
    pub fn new(capacity: usize) -> Self {
        Self { groups: MemoryCache::new(capacity) }
    }

    pub fn get(&mut self, key: &MemoKey) -> Option<Arc<[FacetGroup]>> {
        self.groups.get(key)
    }

    pub fn put(&mut self, key: MemoKey, groups: Arc<[FacetGroup]>) {
        self.groups.put(key, groups);
    }

    /// Drop entries older than `version`.
    pub fn retain_version(&mut self, version: u64) -> usize {
        self.groups.retain(|key, _| key.data_version >= version)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.groups.len()
    }
}
