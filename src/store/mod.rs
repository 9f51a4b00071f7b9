//! Cache store abstraction
//!
//! The store is a plain key/value cache shared by every process that reads
//! or invalidates cached queries. It holds two kinds of values:
//!
//! | Key | Value |
//! |-----|-------|
//! | query key | cached result entry, optionally with a TTL |
//! | table key | invalidation timestamp, never expires |
//!
//! Backends:
//! - [`MemoryStore`]: in-process map
//! - [`FileStore`]: one JSON file per key

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use crate::config::schema::StoreBackend;
use crate::config::{Config, ConfigManager};
use crate::error::CachetResult;
use crate::keys::CacheKey;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Key/value cache store
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Backend name for logs and errors
    fn name(&self) -> &'static str;

    /// Fetch one value; `None` on miss or expiry
    async fn get(&self, key: &str) -> CachetResult<Option<Value>>;

    /// Fetch several values; missing keys are absent from the result
    async fn get_many(&self, keys: &[CacheKey]) -> CachetResult<HashMap<CacheKey, Value>> {
        let mut found = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(value) = self.get(key).await? {
                found.insert(key.clone(), value);
            }
        }
        Ok(found)
    }

    /// Store one value; `ttl = None` keeps it until overwritten
    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> CachetResult<()>;

    /// Store several values with the same TTL
    async fn set_many(
        &self,
        entries: HashMap<CacheKey, Value>,
        ttl: Option<Duration>,
    ) -> CachetResult<()>;

    /// Keys invalidated but not yet re-stamped at commit, if the store tracks them
    fn pending_invalidations(&self) -> Option<&PendingInvalidations> {
        None
    }
}

/// Table keys invalidated inside a transaction that is still open
///
/// Writes inside a transaction are stamped immediately and again when the
/// transaction commits, so reads cached between the two are also dropped.
#[derive(Debug, Default)]
pub struct PendingInvalidations {
    keys: Mutex<BTreeSet<CacheKey>>,
}

impl PendingInvalidations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, keys: impl IntoIterator<Item = CacheKey>) {
        self.lock().extend(keys);
    }

    /// Remove and return every pending key
    pub fn take(&self) -> BTreeSet<CacheKey> {
        std::mem::take(&mut *self.lock())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains(key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeSet<CacheKey>> {
        self.keys.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Open the backend selected in `config`
pub async fn open_store(config: &Config) -> CachetResult<Arc<dyn CacheStore>> {
    match config.store.backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreBackend::File => {
            let dir = ConfigManager::store_dir(config);
            Ok(Arc::new(FileStore::open(dir).await?))
        }
    }
}
