use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

use crate::entry::{Bucket, CacheEntry, CacheMetadata, CacheSnapshot, SNAPSHOT_VERSION};
use crate::error::{Result, StoreError};

/// Key-value persistence behind [`crate::TieredCacheStore`].
///
/// Implementations only store and return entries; merge rules, locking and matching live
/// in the store.
#[async_trait]
pub trait CacheRepository: Send + Sync {
    async fn get(&self, bucket: Bucket, key: &str) -> Result<Option<CacheEntry>>;

    async fn set(&self, bucket: Bucket, key: &str, entry: CacheEntry) -> Result<()>;

    /// Returns whether an entry was removed.
    async fn delete(&self, bucket: Bucket, key: &str) -> Result<bool>;

    async fn keys(&self, bucket: Bucket) -> Result<Vec<String>>;

    async fn entries(&self, bucket: Bucket) -> Result<Vec<(String, CacheEntry)>>;

    /// Drops entries idle for longer than `ttl_ms` and records `now_ms` as the last
    /// cleanup. Returns the number of removed entries.
    async fn sweep_expired(&self, now_ms: u64, ttl_ms: u64) -> Result<usize>;

    async fn metadata(&self) -> Result<CacheMetadata>;

    async fn clear(&self) -> Result<()>;
}

/// Process-local repository.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    snapshot: RwLock<CacheSnapshot>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: CacheSnapshot) -> Self {
        Self {
            snapshot: RwLock::new(snapshot),
        }
    }

    pub async fn snapshot(&self) -> CacheSnapshot {
        self.snapshot.read().await.clone()
    }
}

#[async_trait]
impl CacheRepository for MemoryRepository {
    async fn get(&self, bucket: Bucket, key: &str) -> Result<Option<CacheEntry>> {
        Ok(self.snapshot.read().await.get(bucket, key))
    }

    async fn set(&self, bucket: Bucket, key: &str, entry: CacheEntry) -> Result<()> {
        self.snapshot.write().await.set(bucket, key, entry);
        Ok(())
    }

    async fn delete(&self, bucket: Bucket, key: &str) -> Result<bool> {
        Ok(self.snapshot.write().await.delete(bucket, key))
    }

    async fn keys(&self, bucket: Bucket) -> Result<Vec<String>> {
        Ok(self.snapshot.read().await.keys(bucket))
    }

    async fn entries(&self, bucket: Bucket) -> Result<Vec<(String, CacheEntry)>> {
        Ok(self.snapshot.read().await.entries(bucket))
    }

    async fn sweep_expired(&self, now_ms: u64, ttl_ms: u64) -> Result<usize> {
        Ok(self.snapshot.write().await.sweep(now_ms, ttl_ms))
    }

    async fn metadata(&self) -> Result<CacheMetadata> {
        Ok(self.snapshot.read().await.metadata())
    }

    async fn clear(&self) -> Result<()> {
        self.snapshot.write().await.clear();
        Ok(())
    }
}

/// Repository backed by one JSON snapshot file.
///
/// The whole snapshot is kept in memory and rewritten after every mutation through a
/// temporary file and a rename, so a crash never leaves a half-written cache behind.
#[derive(Debug)]
pub struct JsonFileRepository {
    path: PathBuf,
    snapshot: RwLock<CacheSnapshot>,
}

impl JsonFileRepository {
    /// Opens `path`. A missing file starts an empty cache; an unreadable or incompatible
    /// snapshot is logged and replaced by an empty one on the next write.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let snapshot = match load_snapshot(&path).await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => CacheSnapshot::default(),
            Err(StoreError::CorruptSnapshot { path, reason }) => {
                log::warn!("Cache snapshot {path} is corrupt, starting empty: {reason}");
                CacheSnapshot::default()
            }
            Err(err) => return Err(err),
        };
        log::debug!(
            "Opened cache {} ({} entries)",
            path.display(),
            snapshot.total_entries()
        );
        Ok(Self {
            path,
            snapshot: RwLock::new(snapshot),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CacheRepository for JsonFileRepository {
    async fn get(&self, bucket: Bucket, key: &str) -> Result<Option<CacheEntry>> {
        Ok(self.snapshot.read().await.get(bucket, key))
    }

    async fn set(&self, bucket: Bucket, key: &str, entry: CacheEntry) -> Result<()> {
        let mut snapshot = self.snapshot.write().await;
        snapshot.set(bucket, key, entry);
        write_snapshot(&self.path, &snapshot).await
    }

    async fn delete(&self, bucket: Bucket, key: &str) -> Result<bool> {
        let mut snapshot = self.snapshot.write().await;
        if !snapshot.delete(bucket, key) {
            return Ok(false);
        }
        write_snapshot(&self.path, &snapshot).await?;
        Ok(true)
    }

    async fn keys(&self, bucket: Bucket) -> Result<Vec<String>> {
        Ok(self.snapshot.read().await.keys(bucket))
    }

    async fn entries(&self, bucket: Bucket) -> Result<Vec<(String, CacheEntry)>> {
        Ok(self.snapshot.read().await.entries(bucket))
    }

    async fn sweep_expired(&self, now_ms: u64, ttl_ms: u64) -> Result<usize> {
        let mut snapshot = self.snapshot.write().await;
        let removed = snapshot.sweep(now_ms, ttl_ms);
        write_snapshot(&self.path, &snapshot).await?;
        Ok(removed)
    }

    async fn metadata(&self) -> Result<CacheMetadata> {
        Ok(self.snapshot.read().await.metadata())
    }

    async fn clear(&self) -> Result<()> {
        let mut snapshot = self.snapshot.write().await;
        snapshot.clear();
        write_snapshot(&self.path, &snapshot).await
    }
}

/// Reads a snapshot file. `Ok(None)` when the file does not exist.
pub async fn load_snapshot(path: &Path) -> Result<Option<CacheSnapshot>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let snapshot: CacheSnapshot =
        serde_json::from_slice(&bytes).map_err(|err| StoreError::CorruptSnapshot {
            path: path.display().to_string(),
            reason: err.to_string(),
        })?;
    if snapshot.metadata.version != SNAPSHOT_VERSION {
        return Err(StoreError::CorruptSnapshot {
            path: path.display().to_string(),
            reason: format!(
                "unsupported version {} (expected {SNAPSHOT_VERSION})",
                snapshot.metadata.version
            ),
        });
    }
    Ok(Some(snapshot))
}

/// Writes a snapshot atomically (temporary file + rename).
pub async fn write_snapshot(path: &Path, snapshot: &CacheSnapshot) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let bytes = serde_json::to_vec_pretty(snapshot)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn memory_repository_roundtrip() {
        let repo = MemoryRepository::new();
        let entry = CacheEntry::new(json!("Acme"), Bucket::AtomicSingle, None, 10);
        repo.set(Bucket::AtomicSingle, "employer_name", entry.clone())
            .await
            .unwrap();

        assert_eq!(
            repo.get(Bucket::AtomicSingle, "employer_name").await.unwrap(),
            Some(entry)
        );
        assert!(repo.get(Bucket::AtomicMulti, "employer_name").await.unwrap().is_none());
        assert_eq!(repo.metadata().await.unwrap().total_entries, 1);

        assert!(repo.delete(Bucket::AtomicSingle, "employer_name").await.unwrap());
        assert!(!repo.delete(Bucket::AtomicSingle, "employer_name").await.unwrap());
        assert!(repo.keys(Bucket::AtomicSingle).await.unwrap().is_empty());
    }
}
