#![forbid(unsafe_code)]

use std::hash::Hash;
use std::num::NonZeroUsize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCacheConfig {
    /// Maximum number of decoded pages kept per column.
    pub max_entries: usize,
}

impl Default for PageCacheConfig {
    fn default() -> Self {
        Self { max_entries: 16 }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
}

/// The decoded-page cache of a column: an [`lru::LruCache`] plus hit, miss and eviction
/// counters. A capacity of zero disables caching.
#[derive(Debug)]
pub(crate) struct LruCache<K: Hash + Eq, V> {
    pages: Option<lru::LruCache<K, V>>,
    stats: CacheStats,
}

impl<K: Hash + Eq, V: Clone> LruCache<K, V> {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            pages: NonZeroUsize::new(capacity).map(lru::LruCache::new),
            stats: CacheStats::default(),
        }
    }

    pub(crate) fn get(&mut self, key: &K) -> Option<V> {
        match self.pages.as_mut().and_then(|pages| pages.get(key)) {
            Some(value) => {
                self.stats.hits += 1;
                Some(value.clone())
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    pub(crate) fn insert(&mut self, key: K, value: V) {
        let Some(pages) = self.pages.as_mut() else {
            return;
        };
        if pages.contains(&key) {
            pages.put(key, value);
        } else if pages.push(key, value).is_some() {
            self.stats.evictions += 1;
        }
    }

    pub(crate) fn remove(&mut self, key: &K) {
        if let Some(pages) = self.pages.as_mut() {
            pages.pop(key);
        }
    }

    pub(crate) fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.pages.as_ref().map_or(0, |pages| pages.len()),
            ..self.stats
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_least_recently_used() {
        let mut cache = LruCache::new(2);
        cache.insert(1, "a");
        cache.insert(2, "b");
        assert_eq!(cache.get(&1), Some("a"));
        cache.insert(3, "c");
        assert_eq!(cache.get(&2), None);
        assert_eq!(cache.get(&1), Some("a"));
        assert_eq!(cache.get(&3), Some("c"));

        let stats = cache.stats();
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.hits, 3);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn zero_capacity_caches_nothing() {
        let mut cache = LruCache::new(0);
        cache.insert(1, "a");
        assert_eq!(cache.get(&1), None);
        cache.remove(&1);
        assert_eq!(
            cache.stats(),
            CacheStats {
                misses: 1,
                ..CacheStats::default()
            }
        );
    }
}
