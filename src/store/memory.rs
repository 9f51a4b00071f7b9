//! In-process cache store

use super::{CacheStore, PendingInvalidations};
use crate::error::{CachetError, CachetResult};
use crate::keys::CacheKey;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: Value,
    expires_at: Option<DateTime<Utc>>,
}

impl MemoryEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Cache store backed by a map in process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<CacheKey, MemoryEntry>>,
    pending: Option<PendingInvalidations>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that also tracks invalidations pending a transaction commit
    pub fn transactional() -> Self {
        Self {
            entries: Mutex::default(),
            pending: Some(PendingInvalidations::new()),
        }
    }

    /// Number of stored entries, including expired ones not yet evicted
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CacheKey, MemoryEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub(super) fn expiry(ttl: Option<Duration>) -> CachetResult<Option<DateTime<Utc>>> {
    ttl.map(|ttl| {
        chrono::Duration::from_std(ttl)
            .map(|ttl| Utc::now() + ttl)
            .map_err(|e| CachetError::User(format!("cache timeout out of range: {}", e)))
    })
    .transpose()
}

#[async_trait]
impl CacheStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> CachetResult<Option<Value>> {
        let mut entries = self.lock();
        match entries.get(key) {
            Some(entry) if entry.is_expired(Utc::now()) => {
                entries.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value.clone())),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> CachetResult<()> {
        let expires_at = expiry(ttl)?;
        self.lock()
            .insert(key.to_string(), MemoryEntry { value, expires_at });
        Ok(())
    }

    async fn set_many(
        &self,
        entries: HashMap<CacheKey, Value>,
        ttl: Option<Duration>,
    ) -> CachetResult<()> {
        let expires_at = expiry(ttl)?;
        let mut stored = self.lock();
        for (key, value) in entries {
            stored.insert(key, MemoryEntry { value, expires_at });
        }
        Ok(())
    }

    fn pending_invalidations(&self) -> Option<&PendingInvalidations> {
        self.pending.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn set_and_get() {
        let store = MemoryStore::new();
        store.set("k", json!({"rows": [1, 2]}), None).await.unwrap();

        assert_eq!(store.get("k").await.unwrap(), Some(json!({"rows": [1, 2]})));
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_entries_are_misses() {
        let store = MemoryStore::new();
        store
            .set("k", json!(1), Some(Duration::from_millis(1)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(store.get("k").await.unwrap().is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn set_many_and_get_many() {
        let store = MemoryStore::new();
        let entries = HashMap::from([
            ("a".to_string(), json!(1)),
            ("b".to_string(), json!(2)),
        ]);
        store.set_many(entries, None).await.unwrap();

        let found = store
            .get_many(&["a".to_string(), "c".to_string()])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found["a"], json!(1));
    }

    #[test]
    fn pending_set_only_when_transactional() {
        assert!(MemoryStore::new().pending_invalidations().is_none());
        assert!(MemoryStore::transactional().pending_invalidations().is_some());
    }
}
