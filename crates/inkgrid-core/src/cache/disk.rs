//! File-based tile cache.

use super::{CACHE_VERSION, CacheError, CacheResult, LruLedger, TileCache};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

const EXTENSION: &str = "png";

/// File-based LRU cache.
///
/// Stores each value as a file in a versioned directory. Recency survives
/// restarts through file modification times.
#[derive(Debug)]
pub struct DiskCache {
    /// Versioned directory holding the entries.
    base_path: PathBuf,
    ledger: LruLedger,
    writes: AtomicU64,
}

impl DiskCache {
    /// Open (or create) a cache under `root` holding at most `capacity` bytes.
    ///
    /// Existing entries are indexed oldest first; anything over capacity is
    /// deleted.
    pub fn open(root: impl AsRef<Path>, capacity: u64) -> CacheResult<Self> {
        let base_path = root.as_ref().join(format!("v{CACHE_VERSION}"));
        fs::create_dir_all(&base_path).map_err(|e| {
            CacheError::Io(format!("Failed to create cache directory: {}", e))
        })?;

        let cache = Self {
            base_path,
            ledger: LruLedger::new(capacity),
            writes: AtomicU64::new(0),
        };
        cache.index_existing()?;
        Ok(cache)
    }

    /// Open the cache in the default location.
    ///
    /// On Linux: `~/.cache/inkgrid/`
    /// On Windows: `%LOCALAPPDATA%\inkgrid\`
    pub fn default_location(capacity: u64) -> CacheResult<Self> {
        let base = dirs::cache_dir()
            .or_else(dirs::home_dir)
            .ok_or_else(|| CacheError::Io("Could not determine cache directory".to_string()))?;
        Self::open(base.join("inkgrid"), capacity)
    }

    /// Get the versioned directory holding the entries.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Bytes currently stored.
    pub fn size(&self) -> u64 {
        self.ledger.total()
    }

    /// Sanitize a key to be safe for filenames.
    fn file_stem(key: &str) -> String {
        key.chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect()
    }

    fn entry_path(&self, stem: &str) -> PathBuf {
        self.base_path.join(format!("{stem}.{EXTENSION}"))
    }

    fn index_existing(&self) -> CacheResult<()> {
        let entries = fs::read_dir(&self.base_path)
            .map_err(|e| CacheError::Io(format!("Failed to read cache directory: {}", e)))?;

        let mut found: Vec<(SystemTime, String, u64)> = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().map(|e| e != EXTENSION).unwrap_or(true) {
                // Leftover temp file from an interrupted write.
                let _ = fs::remove_file(&path);
                continue;
            }
            let stem = path.file_stem().and_then(|s| s.to_str());
            let (Some(stem), Ok(meta)) = (stem, entry.metadata()) else {
                continue;
            };
            let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            found.push((modified, stem.to_string(), meta.len()));
        }

        found.sort();
        for (_, stem, size) in found {
            for victim in self.ledger.record(&stem, size) {
                self.delete_file(&victim);
            }
        }
        log::debug!(
            "Indexed {} cached tiles ({} bytes) in {}",
            self.ledger.len(),
            self.ledger.total(),
            self.base_path.display()
        );
        Ok(())
    }

    fn delete_file(&self, stem: &str) {
        let path = self.entry_path(stem);
        if let Err(e) = fs::remove_file(&path) {
            if e.kind() != ErrorKind::NotFound {
                log::warn!("Failed to delete {}: {}", path.display(), e);
            }
        }
    }
}

impl TileCache for DiskCache {
    fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let stem = Self::file_stem(key);
        let path = self.entry_path(&stem);
        match fs::read(&path) {
            Ok(bytes) => {
                self.ledger.touch(&stem);
                Ok(Some(bytes))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                self.ledger.forget(&stem);
                Ok(None)
            }
            Err(e) => Err(CacheError::Io(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    fn put(&self, key: &str, value: &[u8]) -> CacheResult<()> {
        let size = value.len() as u64;
        if size > self.ledger.capacity() {
            log::debug!("Not caching {key}: {size} bytes exceeds capacity");
            return Ok(());
        }

        let stem = Self::file_stem(key);
        let path = self.entry_path(&stem);
        // Readers see either the old file or the new one, never a partial write.
        let n = self.writes.fetch_add(1, Ordering::Relaxed);
        let tmp = self
            .base_path
            .join(format!("{stem}.{}-{n}.tmp", std::process::id()));
        fs::write(&tmp, value).map_err(|e| {
            CacheError::Io(format!("Failed to write {}: {}", tmp.display(), e))
        })?;
        fs::rename(&tmp, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            CacheError::Io(format!("Failed to move {} into place: {}", path.display(), e))
        })?;

        for victim in self.ledger.record(&stem, size) {
            self.delete_file(&victim);
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> CacheResult<()> {
        let stem = Self::file_stem(key);
        self.ledger.forget(&stem);
        let path = self.entry_path(&stem);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::Io(format!(
                "Failed to delete {}: {}",
                path.display(),
                e
            ))),
        }
    }

    fn contains(&self, key: &str) -> bool {
        self.entry_path(&Self::file_stem(key)).exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_disk_cache_put_get() {
        let dir = tempdir().unwrap();
        let cache = DiskCache::open(dir.path(), 1024).unwrap();

        cache.put("3-0-256", b"composite").unwrap();
        assert_eq!(cache.get("3-0-256").unwrap(), Some(b"composite".to_vec()));
        assert!(cache.base_path().join("3-0-256.png").exists());
    }

    #[test]
    fn test_disk_cache_missing() {
        let dir = tempdir().unwrap();
        let cache = DiskCache::open(dir.path(), 1024).unwrap();
        assert_eq!(cache.get("nonexistent").unwrap(), None);
        assert!(!cache.contains("nonexistent"));
    }

    #[test]
    fn test_disk_cache_sanitizes_key() {
        let dir = tempdir().unwrap();
        let cache = DiskCache::open(dir.path(), 1024).unwrap();

        cache.put("../escape/attempt", b"x").unwrap();
        assert_eq!(cache.get("../escape/attempt").unwrap(), Some(b"x".to_vec()));
        assert!(!dir.path().join("escape").exists());
    }

    #[test]
    fn test_disk_cache_lru_eviction() {
        let dir = tempdir().unwrap();
        let cache = DiskCache::open(dir.path(), 10).unwrap();

        cache.put("a", &[1; 4]).unwrap();
        cache.put("b", &[2; 4]).unwrap();
        cache.get("a").unwrap();
        cache.put("c", &[3; 4]).unwrap();

        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
        assert!(cache.contains("c"));
        assert_eq!(cache.size(), 8);
    }

    #[test]
    fn test_disk_cache_reopen_keeps_entries() {
        let dir = tempdir().unwrap();
        {
            let cache = DiskCache::open(dir.path(), 1024).unwrap();
            cache.put("1-0-0", b"first").unwrap();
            cache.put("1-256-0", b"second").unwrap();
        }

        let cache = DiskCache::open(dir.path(), 1024).unwrap();
        assert_eq!(cache.size(), 11);
        assert_eq!(cache.get("1-256-0").unwrap(), Some(b"second".to_vec()));
    }

    #[test]
    fn test_disk_cache_reopen_trims_to_capacity() {
        let dir = tempdir().unwrap();
        {
            let cache = DiskCache::open(dir.path(), 1024).unwrap();
            cache.put("a", &[0; 8]).unwrap();
            cache.put("b", &[0; 8]).unwrap();
        }

        let cache = DiskCache::open(dir.path(), 8).unwrap();
        assert_eq!(cache.size(), 8);
        assert_eq!(
            [cache.contains("a"), cache.contains("b")].iter().filter(|c| **c).count(),
            1
        );
    }

    #[test]
    fn test_disk_cache_remove() {
        let dir = tempdir().unwrap();
        let cache = DiskCache::open(dir.path(), 1024).unwrap();

        cache.put("k", b"v").unwrap();
        cache.remove("k").unwrap();
        cache.remove("k").unwrap();
        assert!(!cache.contains("k"));
        assert_eq!(cache.size(), 0);
    }
}
