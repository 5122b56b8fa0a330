//! Capacity-bounded key/value store for tile composites.
//!
//! The grid persists composites of evicted tiles here and reloads them when a
//! coordinate becomes resident again. Implementations are shared between the
//! interaction loop and background tasks.

mod disk;
mod memory;

pub use disk::DiskCache;
pub use memory::MemoryCache;

use crate::geometry::TileCoord;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// Default capacity of a cache, in bytes.
pub const DEFAULT_CACHE_CAPACITY: u64 = 1024 * 1024;

/// On-disk layout version. Bumping it orphans older entries.
pub const CACHE_VERSION: u32 = 1;

/// Cache errors.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Cache error: {0}")]
    Other(String),
}

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Cache key of a tile: `"{canvas_id}-{x}-{y}"`.
pub fn tile_key(canvas_id: i64, coord: TileCoord) -> String {
    format!("{}-{}-{}", canvas_id, coord.x, coord.y)
}

/// Trait for tile cache backends.
///
/// Operations on different keys must not block each other, and a `put`
/// replaces the value for its key atomically.
pub trait TileCache: Send + Sync {
    /// Fetch a value, or `None` if absent.
    fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Store a value, evicting least-recently-used entries if over capacity.
    fn put(&self, key: &str, value: &[u8]) -> CacheResult<()>;

    /// Remove a value if present.
    fn remove(&self, key: &str) -> CacheResult<()>;

    /// Check if a value is present.
    fn contains(&self, key: &str) -> bool;
}

#[derive(Debug)]
struct LedgerEntry {
    size: u64,
    last_used: u64,
}

/// Byte accounting and recency for an LRU cache.
///
/// Backends keep their values elsewhere and ask the ledger which keys to
/// drop after every insert.
#[derive(Debug)]
pub(crate) struct LruLedger {
    entries: DashMap<String, LedgerEntry>,
    total: AtomicU64,
    clock: AtomicU64,
    capacity: u64,
}

impl LruLedger {
    pub fn new(capacity: u64) -> Self {
        Self {
            entries: DashMap::new(),
            total: AtomicU64::new(0),
            clock: AtomicU64::new(0),
            capacity,
        }
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Mark a key as just used. Returns false if it is not tracked.
    pub fn touch(&self, key: &str) -> bool {
        match self.entries.get_mut(key) {
            Some(mut entry) => {
                entry.last_used = self.tick();
                true
            }
            None => false,
        }
    }

    /// Track `key` at `size` bytes and return the keys evicted to make room.
    /// `key` itself is never evicted.
    pub fn record(&self, key: &str, size: u64) -> Vec<String> {
        let entry = LedgerEntry {
            size,
            last_used: self.tick(),
        };
        if let Some(old) = self.entries.insert(key.to_string(), entry) {
            self.total.fetch_sub(old.size, Ordering::Relaxed);
        }
        self.total.fetch_add(size, Ordering::Relaxed);

        let mut evicted = Vec::new();
        while self.total() > self.capacity {
            // Pick first, remove after: removing while iterating deadlocks a shard.
            let victim = self
                .entries
                .iter()
                .filter(|e| e.key() != key)
                .min_by_key(|e| e.value().last_used)
                .map(|e| e.key().clone());
            let Some(victim) = victim else {
                break;
            };
            if self.forget(&victim).is_some() {
                evicted.push(victim);
            }
        }
        evicted
    }

    /// Stop tracking a key. Returns its size if it was tracked.
    pub fn forget(&self, key: &str) -> Option<u64> {
        let (_, entry) = self.entries.remove(key)?;
        self.total.fetch_sub(entry.size, Ordering::Relaxed);
        Some(entry.size)
    }
}
