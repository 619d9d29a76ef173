use lru::LruCache;
use std::hash::Hash;
use std::num::NonZeroUsize;

/// Bounded least-recently-used map over [`LruCache`].
///
/// Eviction never does I/O. The cache is not synchronised; wrap it in a lock
/// to share it.
#[derive(Debug)]
pub struct MemoryCache<K: Eq + Hash, V> {
    entries: LruCache<K, V>,
}

impl<K: Clone + Eq + Hash, V: Clone> MemoryCache<K, V> {
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        Self { entries: LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)) }
    }

    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Value for `key`, marking it most recently used.
    pub fn get(&mut self, key: &K) -> Option<V> {
        self.entries.get(key).cloned()
    }

    /// Value for `key` without touching recency.
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.entries.peek(key)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains(key)
    }

    /// Insert or replace a value, returning the entry evicted to make room.
    pub fn put(&mut self, key: K, value: V) -> Option<(K, V)> {
        // `push` hands back the old pair on replacement too; that is not an eviction.
        match self.entries.push(key.clone(), value) {
            Some((previous, _)) if previous == key => None,
            evicted => evicted,
        }
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.entries.pop(key)
    }

    /// Keep only entries matching the predicate, returning how many were dropped.
    pub fn retain(&mut self, mut keep: impl FnMut(&K, &V) -> bool) -> usize {
        let doomed: Vec<K> =
            self.entries.iter().filter(|(key, value)| !keep(key, value)).map(|(key, _)| key.clone()).collect();
        for key in &doomed {
            self.entries.pop(key);
        }
        doomed.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_plus_one_evicts_least_recent() {
        let mut cache = MemoryCache::new(3);
        for key in ["a", "b", "c"] {
            assert_eq!(cache.put(key, key.len()), None);
        }
        // Touch "a" so "b" becomes the oldest.
        assert_eq!(cache.get(&"a"), Some(1));
        assert_eq!(cache.put("d", 1), Some(("b", 1)));
        assert_eq!(cache.len(), 3);
        assert!(!cache.contains(&"b"));
        assert!(cache.contains(&"a"));
    }

    #[test]
    fn test_replacing_does_not_evict() {
        let mut cache = MemoryCache::new(2);
        cache.put("a", 1);
        cache.put("b", 2);
        assert_eq!(cache.put("a", 10), None);
        assert_eq!(cache.peek(&"a"), Some(&10));
        // "b" is now the oldest.
        assert_eq!(cache.put("c", 3), Some(("b", 2)));
    }

    #[test]
    fn test_peek_does_not_touch() {
        let mut cache = MemoryCache::new(2);
        cache.put("a", 1);
        cache.put("b", 2);
        assert_eq!(cache.peek(&"a"), Some(&1));
        assert_eq!(cache.put("c", 3), Some(("a", 1)));
    }

    #[test]
    fn test_remove_and_retain_keep_order_consistent() {
        let mut cache = MemoryCache::new(3);
        cache.put("a", 1);
        cache.put("b", 2);
        cache.put("c", 3);
        assert_eq!(cache.remove(&"a"), Some(1));
        assert_eq!(cache.retain(|_, value| *value != 2), 1);
        cache.put("d", 4);
        cache.put("e", 5);
        assert_eq!(cache.put("f", 6), Some(("c", 3)));
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_zero_capacity_holds_one() {
        let mut cache = MemoryCache::new(0);
        assert_eq!(cache.capacity(), 1);
        cache.put("a", 1);
        assert_eq!(cache.put("b", 2), Some(("a", 1)));
    }
}
