//! File-backed cache store
//!
//! Each key is a JSON file in one directory. Writes go to a temporary file
//! first and are renamed into place, so concurrent readers in other
//! processes never observe a partial entry.

use super::memory::expiry;
use super::CacheStore;
use crate::error::{CachetError, CachetResult};
use crate::keys::CacheKey;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::fs;
use tracing::debug;

/// Distinguishes temporary files of concurrent writes within one process
static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// On-disk entry
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FileEntry {
    value: Value,
    expires_at: Option<DateTime<Utc>>,
}

/// Cache store keeping one JSON file per key
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open (and create if needed) a store rooted at `dir`
    pub async fn open(dir: impl Into<PathBuf>) -> CachetResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| CachetError::io(format!("creating store directory {}", dir.display()), e))?;

        // Cached results may contain sensitive rows
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o700);
            std::fs::set_permissions(&dir, perms)
                .map_err(|e| CachetError::io("setting store dir permissions", e))?;
        }

        Ok(Self { dir })
    }

    /// Root directory of the store
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Remove every entry
    pub async fn clear(&self) -> CachetResult<usize> {
        let mut entries = fs::read_dir(&self.dir)
            .await
            .map_err(|e| CachetError::io("reading store directory", e))?;

        let mut removed = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CachetError::io("reading store entry", e))?
        {
            if entry.path().extension().is_some_and(|ext| ext == "json") {
                fs::remove_file(entry.path())
                    .await
                    .map_err(|e| CachetError::io("removing store entry", e))?;
                removed += 1;
            }
        }

        Ok(removed)
    }

    fn entry_path(&self, key: &str) -> CachetResult<PathBuf> {
        if key.is_empty()
            || !key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(CachetError::store(
                self.name(),
                format!("invalid key '{}'", key),
            ));
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }

    async fn write_entry(&self, key: &str, entry: &FileEntry) -> CachetResult<()> {
        let path = self.entry_path(key)?;
        let seq = TMP_SEQ.fetch_add(1, Ordering::Relaxed);
        let tmp = self
            .dir
            .join(format!(".{}.{}-{}.tmp", key, std::process::id(), seq));
        let content = serde_json::to_vec(entry)?;

        fs::write(&tmp, content)
            .await
            .map_err(|e| CachetError::store(self.name(), format!("writing {}: {}", tmp.display(), e)))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| CachetError::store(self.name(), format!("renaming {}: {}", path.display(), e)))?;
        Ok(())
    }
}

#[async_trait]
impl CacheStore for FileStore {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn get(&self, key: &str) -> CachetResult<Option<Value>> {
        let path = self.entry_path(key)?;

        let content = match fs::read(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(CachetError::store(
                    self.name(),
                    format!("reading {}: {}", path.display(), e),
                ))
            }
        };

        let entry: FileEntry =
            serde_json::from_slice(&content).map_err(|e| CachetError::CorruptEntry {
                key: key.to_string(),
                reason: e.to_string(),
            })?;

        if entry.expires_at.is_some_and(|at| Utc::now() >= at) {
            debug!("Store entry {} expired", key);
            // Another process may have removed it already
            let _ = fs::remove_file(&path).await;
            return Ok(None);
        }

        Ok(Some(entry.value))
    }

    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> CachetResult<()> {
        let entry = FileEntry {
            value,
            expires_at: expiry(ttl)?,
        };
        self.write_entry(key, &entry).await
    }

    async fn set_many(
        &self,
        entries: HashMap<CacheKey, Value>,
        ttl: Option<Duration>,
    ) -> CachetResult<()> {
        let expires_at = expiry(ttl)?;
        for (key, value) in entries {
            self.write_entry(&key, &FileEntry { value, expires_at })
                .await?;
        }
        Ok(())
    }
}
