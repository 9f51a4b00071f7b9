//! Table invalidation on writes
//!
//! Every insert, update or delete stamps the table key of its target table
//! with the current time. A cached read is stale once any table it depends
//! on carries a stamp at or after the moment the read was cached.
//!
//! After each stamp an [`InvalidationEvent`] goes out on the
//! [`InvalidationBus`]. Delivery is best effort: sending never blocks and
//! subscribers that fall behind lose the oldest events.

use crate::catalog::Catalog;
use crate::error::{CachetError, CachetResult};
use crate::keys::{CacheKey, KeyStrategy};
use crate::query::CompiledQuery;
use crate::store::CacheStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Default event channel capacity
const DEFAULT_CAPACITY: usize = 1024;

/// Emitted after a table has been invalidated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidationEvent {
    pub table: String,
    pub db_alias: String,
    pub table_key: CacheKey,
    pub invalidated_at: DateTime<Utc>,
}

/// Fire-and-forget broadcast of invalidation events
#[derive(Clone)]
pub struct InvalidationBus {
    sender: broadcast::Sender<InvalidationEvent>,
    capacity: usize,
}

impl InvalidationBus {
    /// Create a bus with default capacity (1024)
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a bus buffering at most `capacity` events per subscriber
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender, capacity }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<InvalidationEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Send without waiting; having no subscribers is fine
    pub fn emit(&self, event: InvalidationEvent) {
        match self.sender.send(event) {
            Ok(count) => debug!("Invalidation event sent to {} subscribers", count),
            Err(_) => debug!("Invalidation event dropped, no subscribers"),
        }
    }
}

impl Default for InvalidationBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InvalidationBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvalidationBus")
            .field("capacity", &self.capacity)
            .field("subscribers", &self.sender.receiver_count())
            .finish()
    }
}

/// Records table invalidations in the cache store
#[derive(Clone)]
pub struct Invalidator {
    store: Arc<dyn CacheStore>,
    keys: Arc<dyn KeyStrategy>,
    catalog: Arc<dyn Catalog>,
    bus: InvalidationBus,
}

impl Invalidator {
    pub fn new(
        store: Arc<dyn CacheStore>,
        keys: Arc<dyn KeyStrategy>,
        catalog: Arc<dyn Catalog>,
        bus: InvalidationBus,
    ) -> Self {
        Self {
            store,
            keys,
            catalog,
            bus,
        }
    }

    pub fn bus(&self) -> &InvalidationBus {
        &self.bus
    }

    /// Invalidate the table a write statement targets
    pub async fn invalidate(&self, write: &CompiledQuery) -> CachetResult<InvalidationEvent> {
        if !write.statement.is_write() {
            return Err(CachetError::NotAWrite(write.statement.to_string()));
        }

        let mut events = self
            .invalidate_tables(&write.using, [write.base_table.as_str()])
            .await?;
        events
            .pop()
            .ok_or_else(|| CachetError::Internal("no event for invalidated table".to_string()))
    }

    /// Invalidate several tables of one database with a single store write
    pub async fn invalidate_tables<T: AsRef<str>>(
        &self,
        db_alias: &str,
        tables: impl IntoIterator<Item = T>,
    ) -> CachetResult<Vec<InvalidationEvent>> {
        let tables: BTreeSet<String> = tables
            .into_iter()
            .map(|t| t.as_ref().to_string())
            .collect();
        if tables.is_empty() {
            return Ok(vec![]);
        }

        let keyed: Vec<(String, CacheKey)> = tables
            .into_iter()
            .map(|table| {
                let key = self.keys.table_key(db_alias, &table);
                (table, key)
            })
            .collect();

        if let Some(pending) = self.store.pending_invalidations() {
            pending.add(keyed.iter().map(|(_, key)| key.clone()));
        }

        let now = Utc::now();
        let stamp = timestamp_value(now)?;
        let entries: HashMap<CacheKey, Value> = keyed
            .iter()
            .map(|(_, key)| (key.clone(), stamp.clone()))
            .collect();

        if let Err(e) = self.store.set_many(entries, None).await {
            let names: Vec<&str> = keyed.iter().map(|(table, _)| table.as_str()).collect();
            return Err(CachetError::invalidation(names.join(", "), db_alias, e));
        }

        let events: Vec<InvalidationEvent> = keyed
            .into_iter()
            .map(|(table, table_key)| {
                info!("Invalidated {}.{}", db_alias, table);
                InvalidationEvent {
                    table,
                    db_alias: db_alias.to_string(),
                    table_key,
                    invalidated_at: now,
                }
            })
            .collect();

        for event in &events {
            self.bus.emit(event.clone());
        }

        Ok(events)
    }

    /// Invalidate tables named in a raw SQL statement
    ///
    /// Statements starting with SELECT are reads and invalidate nothing.
    /// Anything else is matched against the catalog the same way raw read
    /// fragments are, so every table the text mentions is invalidated.
    pub async fn invalidate_raw(
        &self,
        db_alias: &str,
        sql: &str,
    ) -> CachetResult<Vec<InvalidationEvent>> {
        let lowered = sql.trim_start().to_lowercase();
        if lowered.starts_with("select") {
            return Ok(vec![]);
        }

        let tables: Vec<String> = self
            .catalog
            .table_names(db_alias)
            .into_iter()
            .filter(|table| lowered.contains(&table.to_lowercase()))
            .collect();

        debug!("Raw write on {} touches {:?}", db_alias, tables);
        self.invalidate_tables(db_alias, &tables).await
    }

    /// Re-stamp every key invalidated since the last flush
    ///
    /// Called when a transaction commits. Returns the number of keys stamped.
    pub async fn flush_pending(&self) -> CachetResult<usize> {
        let Some(pending) = self.store.pending_invalidations() else {
            return Ok(0);
        };

        let keys = pending.take();
        if keys.is_empty() {
            return Ok(0);
        }

        let stamp = timestamp_value(Utc::now())?;
        let entries: HashMap<CacheKey, Value> =
            keys.iter().map(|key| (key.clone(), stamp.clone())).collect();

        if let Err(e) = self.store.set_many(entries, None).await {
            // Keep them so a later flush can retry
            pending.add(keys);
            return Err(e);
        }

        debug!("Flushed {} pending invalidations", keys.len());
        Ok(keys.len())
    }
}

fn timestamp_value(at: DateTime<Utc>) -> CachetResult<Value> {
    Ok(serde_json::to_value(at)?)
}

/// Parse a stored invalidation marker
pub(crate) fn parse_timestamp(value: Value) -> Option<DateTime<Utc>> {
    serde_json::from_value(value).ok()
}
