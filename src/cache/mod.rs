//! Two-tier binary cache for photo image bytes.
//!
//! The durable tier is a flat directory of files named
//! `{tier prefix}{photo id}`; it is the source of truth. The memory tier is a
//! bounded LRU in front of it that can always be repopulated from disk.

pub mod error;
mod memory;

pub use error::CacheError;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use bytes::Bytes;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::debug;

use crate::types::CacheTier;
use memory::LruMemory;

/// Default memory tier budget.
pub const DEFAULT_MEMORY_BYTES: usize = 64 * 1024 * 1024;
const DEFAULT_MEMORY_ENTRIES: usize = 1024;

type CacheKey = (String, CacheTier);

/// Counters for cache behaviour. Read with [`CacheStats::snapshot`].
#[derive(Debug, Default)]
pub struct CacheStats {
    memory_hits: AtomicU64,
    disk_hits: AtomicU64,
    misses: AtomicU64,
    disk_reads: AtomicU64,
    disk_writes: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStatsSnapshot {
    pub memory_hits: u64,
    pub disk_hits: u64,
    pub misses: u64,
    pub disk_reads: u64,
    pub disk_writes: u64,
}

impl CacheStats {
    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            memory_hits: self.memory_hits.load(Ordering::Relaxed),
            disk_hits: self.disk_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            disk_reads: self.disk_reads.load(Ordering::Relaxed),
            disk_writes: self.disk_writes.load(Ordering::Relaxed),
        }
    }
}

/// Totals for the durable tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiskUsage {
    pub files: u64,
    pub bytes: u64,
}

pub struct BinaryCache {
    root: PathBuf,
    memory: Mutex<LruMemory<CacheKey>>,
    /// Held shared by get/put/delete and exclusively by reset, so a reset
    /// never interleaves with a write to either tier.
    gate: RwLock<()>,
    part_seq: AtomicU64,
    stats: CacheStats,
}

impl std::fmt::Debug for BinaryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinaryCache")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl BinaryCache {
    /// Open a cache rooted at `root`, creating the directory if needed.
    pub async fn open(root: &Path, memory_bytes: usize) -> Result<Self, CacheError> {
        fs::create_dir_all(root)
            .await
            .map_err(|e| CacheError::io(root, e))?;
        Ok(Self {
            root: root.to_path_buf(),
            memory: Mutex::new(LruMemory::new(memory_bytes, DEFAULT_MEMORY_ENTRIES)),
            gate: RwLock::new(()),
            part_seq: AtomicU64::new(0),
            stats: CacheStats::default(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Durable path for one entry. Ids that would not name a file directly
    /// under the cache root are rejected.
    pub fn entry_path(&self, photo_id: &str, tier: CacheTier) -> Result<PathBuf, CacheError> {
        let name = clean_cache_name(photo_id);
        if matches!(name.as_str(), "" | "." | "..") {
            return Err(CacheError::InvalidKey(photo_id.to_string()));
        }
        Ok(self.root.join(format!("{}{}", tier.prefix(), name)))
    }

    fn memory(&self) -> Result<std::sync::MutexGuard<'_, LruMemory<CacheKey>>, CacheError> {
        self.memory
            .lock()
            .map_err(|e| CacheError::Poisoned(e.to_string()))
    }

    /// Memory first, then disk. A disk hit is copied into memory.
    /// A full miss is `Ok(None)`.
    pub async fn get(&self, photo_id: &str, tier: CacheTier) -> Result<Option<Bytes>, CacheError> {
        let _gate = self.gate.read().await;
        let key = (photo_id.to_string(), tier);

        if let Some(data) = self.memory()?.get(&key) {
            self.stats.memory_hits.fetch_add(1, Ordering::Relaxed);
            debug!(photo_id, %tier, "Memory cache hit");
            return Ok(Some(data));
        }

        let path = self.entry_path(photo_id, tier)?;
        self.stats.disk_reads.fetch_add(1, Ordering::Relaxed);
        match fs::read(&path).await {
            Ok(data) => {
                let data = Bytes::from(data);
                self.memory()?.insert(key, data.clone());
                self.stats.disk_hits.fetch_add(1, Ordering::Relaxed);
                debug!(photo_id, %tier, "Disk cache hit");
                Ok(Some(data))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                debug!(photo_id, %tier, "Cache miss");
                Ok(None)
            }
            Err(e) => Err(CacheError::io(&path, e)),
        }
    }

    /// Write to disk, then replace the memory entry. Later puts win.
    pub async fn put(&self, photo_id: &str, tier: CacheTier, data: Bytes) -> Result<(), CacheError> {
        let _gate = self.gate.read().await;
        let path = self.entry_path(photo_id, tier)?;
        let seq = self.part_seq.fetch_add(1, Ordering::Relaxed);
        let part_path = path.with_file_name(format!(
            "{}.{seq}.part",
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        ));

        if let Err(e) = fs::write(&part_path, &data).await {
            let _ = fs::remove_file(&part_path).await;
            return Err(CacheError::io(&part_path, e));
        }
        if let Err(e) = fs::rename(&part_path, &path).await {
            let _ = fs::remove_file(&part_path).await;
            return Err(CacheError::io(&path, e));
        }
        self.stats.disk_writes.fetch_add(1, Ordering::Relaxed);

        self.memory()?.insert((photo_id.to_string(), tier), data);
        debug!(photo_id, %tier, path = %path.display(), "Cached image");
        Ok(())
    }

    /// Remove one entry from both tiers. Missing entries are fine.
    pub async fn delete(&self, photo_id: &str, tier: CacheTier) -> Result<(), CacheError> {
        let _gate = self.gate.read().await;
        self.memory()?.remove(&(photo_id.to_string(), tier));
        let path = self.entry_path(photo_id, tier)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::io(&path, e)),
        }
    }

    /// Remove every entry from both tiers.
    pub async fn reset_all(&self) -> Result<(), CacheError> {
        let _gate = self.gate.write().await;
        self.memory()?.clear();

        let mut removed = 0u64;
        let mut entries = fs::read_dir(&self.root)
            .await
            .map_err(|e| CacheError::io(&self.root, e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CacheError::io(&self.root, e))?
        {
            let path = entry.path();
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| CacheError::io(&path, e))?;
            if file_type.is_file() {
                fs::remove_file(&path)
                    .await
                    .map_err(|e| CacheError::io(&path, e))?;
                removed += 1;
            }
        }
        tracing::info!(removed, "Cleared image cache");
        Ok(())
    }

    /// Drop the memory tier only; the durable tier is untouched.
    pub fn evict_memory(&self) -> Result<(), CacheError> {
        let mut memory = self.memory()?;
        let freed = memory.used_bytes();
        memory.clear();
        debug!(freed, "Evicted memory cache");
        Ok(())
    }

    /// Entries and bytes currently held in memory.
    pub fn memory_usage(&self) -> Result<(usize, usize), CacheError> {
        let memory = self.memory()?;
        Ok((memory.len(), memory.used_bytes()))
    }

    /// Count files and bytes in the durable tier, skipping partial writes.
    pub async fn disk_usage(&self) -> Result<DiskUsage, CacheError> {
        let mut usage = DiskUsage::default();
        let mut entries = fs::read_dir(&self.root)
            .await
            .map_err(|e| CacheError::io(&self.root, e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CacheError::io(&self.root, e))?
        {
            if entry.path().extension().is_some_and(|ext| ext == "part") {
                continue;
            }
            let meta = entry
                .metadata()
                .await
                .map_err(|e| CacheError::io(&entry.path(), e))?;
            if meta.is_file() {
                usage.files += 1;
                usage.bytes += meta.len();
            }
        }
        Ok(usage)
    }
}

/// Strip characters that are not safe in a file name.
fn clean_cache_name(photo_id: &str) -> String {
    photo_id
        .chars()
        .filter(|c| !matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|'))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn cache(dir: &tempfile::TempDir) -> BinaryCache {
        BinaryCache::open(dir.path(), 1024).await.unwrap()
    }

    #[tokio::test]
    async fn test_put_then_get_served_from_memory() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(&dir).await;
        let data = Bytes::from_static(b"preview-bytes");

        cache.put("x", CacheTier::Preview, data.clone()).await.unwrap();
        let got = cache.get("x", CacheTier::Preview).await.unwrap();
        assert_eq!(got, Some(data));

        let stats = cache.stats().snapshot();
        assert_eq!(stats.memory_hits, 1);
        assert_eq!(stats.disk_reads, 0);
        assert_eq!(stats.disk_writes, 1);
    }

    #[tokio::test]
    async fn test_disk_layout_uses_tier_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(&dir).await;
        cache.put("42", CacheTier::Preview, Bytes::from_static(b"p")).await.unwrap();
        cache.put("42", CacheTier::Full, Bytes::from_static(b"f")).await.unwrap();

        assert_eq!(std::fs::read(dir.path().join("preview_42")).unwrap(), b"p");
        assert_eq!(std::fs::read(dir.path().join("42")).unwrap(), b"f");
    }

    #[tokio::test]
    async fn test_disk_hit_populates_memory() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(&dir).await;
        cache.put("x", CacheTier::Full, Bytes::from_static(b"full")).await.unwrap();
        cache.evict_memory().unwrap();

        assert_eq!(
            cache.get("x", CacheTier::Full).await.unwrap().as_deref(),
            Some(&b"full"[..])
        );
        assert_eq!(cache.get("x", CacheTier::Full).await.unwrap().as_deref(), Some(&b"full"[..]));

        let stats = cache.stats().snapshot();
        assert_eq!(stats.disk_hits, 1);
        assert_eq!(stats.disk_reads, 1);
        assert_eq!(stats.memory_hits, 1);
    }

    #[tokio::test]
    async fn test_entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        cache(&dir)
            .await
            .put("x", CacheTier::Full, Bytes::from_static(b"kept"))
            .await
            .unwrap();
        let reopened = cache(&dir).await;
        assert_eq!(
            reopened.get("x", CacheTier::Full).await.unwrap().as_deref(),
            Some(&b"kept"[..])
        );
    }

    #[tokio::test]
    async fn test_miss_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(&dir).await;
        assert_eq!(cache.get("nope", CacheTier::Preview).await.unwrap(), None);
        assert_eq!(cache.stats().snapshot().misses, 1);
    }

    #[tokio::test]
    async fn test_tiers_are_independent() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(&dir).await;
        cache.put("x", CacheTier::Preview, Bytes::from_static(b"p")).await.unwrap();
        assert_eq!(cache.get("x", CacheTier::Full).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(&dir).await;
        cache.put("x", CacheTier::Full, Bytes::from_static(b"one")).await.unwrap();
        cache.put("x", CacheTier::Full, Bytes::from_static(b"two")).await.unwrap();
        cache.evict_memory().unwrap();
        assert_eq!(cache.get("x", CacheTier::Full).await.unwrap().as_deref(), Some(&b"two"[..]));
    }

    #[tokio::test]
    async fn test_delete_removes_both_tiers() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(&dir).await;
        cache.put("x", CacheTier::Full, Bytes::from_static(b"a")).await.unwrap();
        cache.delete("x", CacheTier::Full).await.unwrap();
        assert_eq!(cache.get("x", CacheTier::Full).await.unwrap(), None);
        cache.delete("x", CacheTier::Full).await.unwrap();
    }

    #[tokio::test]
    async fn test_reset_all_clears_memory_and_disk() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(&dir).await;
        cache.put("a", CacheTier::Preview, Bytes::from_static(b"1")).await.unwrap();
        cache.put("b", CacheTier::Full, Bytes::from_static(b"2")).await.unwrap();

        cache.reset_all().await.unwrap();

        assert_eq!(cache.memory_usage().unwrap(), (0, 0));
        assert_eq!(cache.get("a", CacheTier::Preview).await.unwrap(), None);
        assert_eq!(cache.get("b", CacheTier::Full).await.unwrap(), None);
        assert_eq!(cache.disk_usage().await.unwrap(), DiskUsage::default());
    }

    #[tokio::test]
    async fn test_memory_tier_is_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let cache = BinaryCache::open(dir.path(), 8).await.unwrap();
        cache.put("a", CacheTier::Full, Bytes::from(vec![1u8; 5])).await.unwrap();
        cache.put("b", CacheTier::Full, Bytes::from(vec![2u8; 5])).await.unwrap();
        assert_eq!(cache.memory_usage().unwrap(), (1, 5));

        // Evicted from memory but still on disk.
        assert!(cache.get("a", CacheTier::Full).await.unwrap().is_some());
        assert_eq!(cache.stats().snapshot().disk_hits, 1);
    }

    #[tokio::test]
    async fn test_disk_usage() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(&dir).await;
        cache.put("a", CacheTier::Preview, Bytes::from_static(b"123")).await.unwrap();
        cache.put("a", CacheTier::Full, Bytes::from_static(b"4567")).await.unwrap();
        assert_eq!(
            cache.disk_usage().await.unwrap(),
            DiskUsage { files: 2, bytes: 7 }
        );
    }

    #[tokio::test]
    async fn test_ids_outside_cache_root_rejected() {
        let data_dir = tempfile::tempdir().unwrap();
        let root = data_dir.path().join("images");
        let cache = BinaryCache::open(&root, 1024).await.unwrap();

        for id in ["", ".", "..", "/", "../"] {
            let err = cache
                .put(id, CacheTier::Full, Bytes::from_static(b"x"))
                .await
                .unwrap_err();
            assert!(matches!(err, CacheError::InvalidKey(_)), "{id:?}: {err}");
            assert!(matches!(
                cache.get(id, CacheTier::Full).await,
                Err(CacheError::InvalidKey(_))
            ));
        }

        // Nothing leaked next to the cache root.
        let siblings: Vec<_> = std::fs::read_dir(data_dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(siblings, [std::ffi::OsString::from("images")]);
        assert_eq!(cache.disk_usage().await.unwrap(), DiskUsage::default());
    }

    #[tokio::test]
    async fn test_failed_rename_leaves_no_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(&dir).await;
        // A directory where the entry file should go makes the rename fail.
        std::fs::create_dir(dir.path().join("blocked")).unwrap();
        std::fs::write(dir.path().join("blocked").join("inner"), b"x").unwrap();

        assert!(cache
            .put("blocked", CacheTier::Full, Bytes::from_static(b"data"))
            .await
            .is_err());
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["blocked"]);
    }

    #[test]
    fn test_clean_cache_name() {
        assert_eq!(clean_cache_name("a/b:c"), "abc");
        assert_eq!(clean_cache_name("53012345678"), "53012345678");
    }
}
