//! In-memory tile cache.

use super::{CacheResult, DEFAULT_CACHE_CAPACITY, LruLedger, TileCache};
use dashmap::DashMap;
use std::sync::Arc;

/// In-memory LRU cache for testing and ephemeral use.
#[derive(Debug)]
pub struct MemoryCache {
    values: DashMap<String, Arc<[u8]>>,
    ledger: LruLedger,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

impl MemoryCache {
    /// Create an empty cache holding at most `capacity` bytes.
    pub fn new(capacity: u64) -> Self {
        Self {
            values: DashMap::new(),
            ledger: LruLedger::new(capacity),
        }
    }

    /// Bytes currently stored.
    pub fn size(&self) -> u64 {
        self.ledger.total()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl TileCache for MemoryCache {
    fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let value = self.values.get(key).map(|v| Arc::clone(v.value()));
        if value.is_some() {
            self.ledger.touch(key);
        }
        Ok(value.map(|v| v.to_vec()))
    }

    fn put(&self, key: &str, value: &[u8]) -> CacheResult<()> {
        let size = value.len() as u64;
        if size > self.ledger.capacity() {
            log::debug!("Not caching {key}: {size} bytes exceeds capacity");
            return Ok(());
        }

        self.values.insert(key.to_string(), Arc::from(value));
        for victim in self.ledger.record(key, size) {
            self.values.remove(&victim);
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> CacheResult<()> {
        self.values.remove(key);
        self.ledger.forget(key);
        Ok(())
    }

    fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_and_get() {
        let cache = MemoryCache::default();
        cache.put("1-0-0", b"tile").unwrap();

        assert_eq!(cache.get("1-0-0").unwrap(), Some(b"tile".to_vec()));
        assert!(cache.contains("1-0-0"));
    }

    #[test]
    fn test_missing_key() {
        let cache = MemoryCache::default();
        assert_eq!(cache.get("nonexistent").unwrap(), None);
    }

    #[test]
    fn test_put_overwrites() {
        let cache = MemoryCache::default();
        cache.put("k", b"old").unwrap();
        cache.put("k", b"newer").unwrap();

        assert_eq!(cache.get("k").unwrap(), Some(b"newer".to_vec()));
        assert_eq!(cache.size(), 5);
    }

    #[test]
    fn test_lru_eviction() {
        let cache = MemoryCache::new(10);
        cache.put("a", &[0; 4]).unwrap();
        cache.put("b", &[0; 4]).unwrap();
        cache.get("a").unwrap();
        cache.put("c", &[0; 4]).unwrap();

        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
        assert!(cache.contains("c"));
        assert_eq!(cache.size(), 8);
    }

    #[test]
    fn test_oversized_value_is_skipped() {
        let cache = MemoryCache::new(4);
        cache.put("big", &[0; 5]).unwrap();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_remove() {
        let cache = MemoryCache::default();
        cache.put("k", b"v").unwrap();
        cache.remove("k").unwrap();

        assert!(!cache.contains("k"));
        assert_eq!(cache.size(), 0);
    }

    #[test]
    fn test_concurrent_puts() {
        let cache = Arc::new(MemoryCache::default());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for j in 0..50 {
                        cache.put(&format!("{i}-{j}"), &[i as u8; 16]).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(cache.len(), 400);
        assert_eq!(cache.get("3-49").unwrap(), Some(vec![3; 16]));
    }
}
