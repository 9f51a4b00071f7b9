//! Read-through query cache
//!
//! Ties resolution, key derivation and the store together:
//!
//! 1. [`QueryCache::lookup`] resolves the query's tables. A rejection turns
//!    into [`Lookup::Bypass`] and the caller runs the query uncached.
//! 2. A stored entry is served only if none of its tables was invalidated
//!    at or after the moment the entry was cached.
//! 3. On a miss the caller executes the query and hands the result to
//!    [`QueryCache::store`], which records the table keys as dependencies.
//!
//! Writes go through [`QueryCache::invalidate`]. When stamping a table
//! fails, cached reads on that table can no longer be trusted, so the table
//! bypasses the cache for the rest of the process.

use crate::catalog::Catalog;
use crate::config::Config;
use crate::error::{CachetError, CachetResult};
use crate::invalidation::{parse_timestamp, InvalidationBus, InvalidationEvent, Invalidator};
use crate::keys::{CacheKey, KeyStrategy, Sha1Keys};
use crate::query::CompiledQuery;
use crate::resolve::{Rejection, RejectionPolicy, TableResolver, DEFAULT_MAX_NESTING};
use crate::store::CacheStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

/// What is stored under a query key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedEntry {
    /// When the query started executing
    pub cached_at: DateTime<Utc>,

    /// Table keys the result depends on
    pub table_keys: Vec<CacheKey>,

    /// The query result
    pub rows: Value,
}

/// A cache miss waiting for its result
#[derive(Debug, Clone)]
pub struct PendingRead {
    pub query_key: CacheKey,
    pub tables: BTreeSet<String>,
    pub table_keys: Vec<CacheKey>,
    /// An entry existed but a dependency was invalidated after it was cached
    pub stale: bool,
    started_at: DateTime<Utc>,
}

/// Outcome of a cache lookup
#[derive(Debug)]
pub enum Lookup {
    /// Fresh cached result
    Hit(Value),
    /// Not cached or stale; execute and call [`QueryCache::store`]
    Miss(PendingRead),
    /// Must not be cached; execute and discard
    Bypass(Rejection),
}

/// Query result cache with table-level invalidation
pub struct QueryCache {
    store: Arc<dyn CacheStore>,
    keys: Arc<dyn KeyStrategy>,
    catalog: Arc<dyn Catalog>,
    policy: RejectionPolicy,
    invalidator: Invalidator,
    enabled: bool,
    timeout: Option<Duration>,
    max_nesting: usize,
    invalidate_raw: bool,
    /// (db alias, table) pairs whose invalidation failed
    disabled_tables: Mutex<HashSet<(String, String)>>,
}

impl QueryCache {
    /// Cache with default rules: SHA-1 keys, no TTL, no blacklist
    pub fn new(store: Arc<dyn CacheStore>, catalog: Arc<dyn Catalog>) -> Self {
        Self::build(
            store,
            Arc::new(Sha1Keys),
            catalog,
            RejectionPolicy::default(),
            InvalidationBus::new(),
        )
    }

    /// Cache configured from the `[cache]` section
    pub fn from_config(
        config: &Config,
        store: Arc<dyn CacheStore>,
        catalog: Arc<dyn Catalog>,
    ) -> Self {
        let mut cache = Self::build(
            store,
            config.cache.key_strategy.build(),
            catalog,
            RejectionPolicy::from_config(&config.cache),
            InvalidationBus::new(),
        );
        cache.enabled = config.cache.enabled;
        cache.timeout = config.cache.timeout();
        cache.max_nesting = config.cache.max_nesting;
        cache.invalidate_raw = config.cache.invalidate_raw;
        cache
    }

    fn build(
        store: Arc<dyn CacheStore>,
        keys: Arc<dyn KeyStrategy>,
        catalog: Arc<dyn Catalog>,
        policy: RejectionPolicy,
        bus: InvalidationBus,
    ) -> Self {
        let invalidator = Invalidator::new(store.clone(), keys.clone(), catalog.clone(), bus);
        Self {
            store,
            keys,
            catalog,
            policy,
            invalidator,
            enabled: true,
            timeout: None,
            max_nesting: DEFAULT_MAX_NESTING,
            invalidate_raw: true,
            disabled_tables: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_policy(mut self, policy: RejectionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Substitute the key derivation
    pub fn with_key_strategy(mut self, keys: Arc<dyn KeyStrategy>) -> Self {
        self.keys = keys;
        self.rebuild_invalidator();
        self
    }

    /// Use `bus` for invalidation events
    pub fn with_bus(mut self, bus: InvalidationBus) -> Self {
        self.invalidator = Invalidator::new(
            self.store.clone(),
            self.keys.clone(),
            self.catalog.clone(),
            bus,
        );
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn rebuild_invalidator(&mut self) {
        let bus = self.invalidator.bus().clone();
        self.invalidator = Invalidator::new(
            self.store.clone(),
            self.keys.clone(),
            self.catalog.clone(),
            bus,
        );
    }

    pub fn bus(&self) -> &InvalidationBus {
        self.invalidator.bus()
    }

    pub fn key_strategy(&self) -> &dyn KeyStrategy {
        self.keys.as_ref()
    }

    fn resolver(&self) -> TableResolver<'_> {
        TableResolver::new(&self.policy, self.catalog.as_ref()).with_max_nesting(self.max_nesting)
    }

    /// Tables a read query depends on
    pub fn tables(&self, query: &CompiledQuery) -> Result<BTreeSet<String>, Rejection> {
        self.resolver().resolve(query, &query.using)
    }

    /// Table keys of a read query, paired with their table names
    pub fn table_keys(&self, query: &CompiledQuery) -> Result<Vec<(String, CacheKey)>, Rejection> {
        Ok(self
            .tables(query)?
            .into_iter()
            .map(|table| {
                let key = self.keys.table_key(&query.using, &table);
                (table, key)
            })
            .collect())
    }

    /// Look a read query up in the cache
    pub async fn lookup(&self, query: &CompiledQuery) -> CachetResult<Lookup> {
        if !self.enabled {
            return Ok(Lookup::Bypass(Rejection::Disabled));
        }

        // Taken before execution so writes racing the query still invalidate it
        let started_at = Utc::now();

        let tables = match self.tables(query) {
            Ok(tables) => tables,
            Err(rejection) => {
                debug!("Bypassing cache: {}", rejection);
                return Ok(Lookup::Bypass(rejection));
            }
        };

        if let Some(table) = self.first_disabled(&query.using, &tables) {
            debug!("Bypassing cache: {} is disabled", table);
            return Ok(Lookup::Bypass(Rejection::TableDisabled { table }));
        }

        let query_key = self.keys.query_key(query);
        let table_keys: Vec<CacheKey> = tables
            .iter()
            .map(|table| self.keys.table_key(&query.using, table))
            .collect();

        // A damaged entry only costs a re-execution
        let stored = match self.store.get(&query_key).await {
            Ok(stored) => stored,
            Err(CachetError::CorruptEntry { key, reason }) => {
                warn!("Ignoring unreadable cache entry {}: {}", key, reason);
                None
            }
            Err(e) => return Err(e),
        };

        let mut stale = false;
        if let Some(value) = stored {
            match serde_json::from_value::<CachedEntry>(value) {
                Ok(entry) => {
                    if !self.is_stale(&entry).await? {
                        debug!("Cache hit for {}", query_key);
                        return Ok(Lookup::Hit(entry.rows));
                    }
                    debug!("Cached entry {} is stale", query_key);
                    stale = true;
                }
                Err(e) => warn!("Ignoring unreadable cache entry {}: {}", query_key, e),
            }
        } else {
            debug!("Cache miss for {}", query_key);
        }

        Ok(Lookup::Miss(PendingRead {
            query_key,
            tables,
            table_keys,
            stale,
            started_at,
        }))
    }

    /// Store the result of a missed query
    pub async fn store(&self, pending: PendingRead, rows: Value) -> CachetResult<()> {
        let entry = CachedEntry {
            cached_at: pending.started_at,
            table_keys: pending.table_keys,
            rows,
        };
        let value = serde_json::to_value(&entry)?;
        self.store.set(&pending.query_key, value, self.timeout).await
    }

    /// Serve from cache, or execute and cache the result
    ///
    /// Failing to store a fresh result is logged and otherwise ignored.
    pub async fn fetch_or_execute<F, Fut>(
        &self,
        query: &CompiledQuery,
        execute: F,
    ) -> CachetResult<Value>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CachetResult<Value>>,
    {
        match self.lookup(query).await? {
            Lookup::Hit(rows) => Ok(rows),
            Lookup::Bypass(_) => execute().await,
            Lookup::Miss(pending) => {
                let rows = execute().await?;
                if let Err(e) = self.store(pending, rows.clone()).await {
                    warn!("Failed to cache query result: {}", e);
                }
                Ok(rows)
            }
        }
    }

    /// Whether any dependency of `entry` was invalidated since it was cached
    ///
    /// Unreadable markers count as invalidations.
    pub async fn is_stale(&self, entry: &CachedEntry) -> CachetResult<bool> {
        let markers = match self.store.get_many(&entry.table_keys).await {
            Ok(markers) => markers,
            Err(CachetError::CorruptEntry { key, reason }) => {
                warn!("Unreadable invalidation marker {}: {}", key, reason);
                return Ok(true);
            }
            Err(e) => return Err(e),
        };
        for (key, marker) in markers {
            match parse_timestamp(marker) {
                Some(invalidated_at) if invalidated_at < entry.cached_at => {}
                Some(_) => return Ok(true),
                None => {
                    warn!("Unreadable invalidation marker {}", key);
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Invalidate the table targeted by a write
    pub async fn invalidate(&self, write: &CompiledQuery) -> CachetResult<InvalidationEvent> {
        let result = self.invalidator.invalidate(write).await;
        if let Err(e) = &result {
            self.on_failure(&write.using, [write.base_table.as_str()], e);
        }
        result
    }

    /// Invalidate tables directly, e.g. after changes made outside the ORM
    pub async fn invalidate_tables<T: AsRef<str>>(
        &self,
        db_alias: &str,
        tables: impl IntoIterator<Item = T>,
    ) -> CachetResult<Vec<InvalidationEvent>> {
        let tables: Vec<String> = tables.into_iter().map(|t| t.as_ref().to_string()).collect();
        let result = self.invalidator.invalidate_tables(db_alias, &tables).await;
        if let Err(e) = &result {
            self.on_failure(db_alias, tables.iter().map(String::as_str), e);
        }
        result
    }

    /// Invalidate tables mentioned by a raw SQL write
    pub async fn invalidate_raw(
        &self,
        db_alias: &str,
        sql: &str,
    ) -> CachetResult<Vec<InvalidationEvent>> {
        if !self.invalidate_raw {
            return Ok(vec![]);
        }
        let result = self.invalidator.invalidate_raw(db_alias, sql).await;
        if let Err(e) = &result {
            let lowered = sql.to_lowercase();
            let mentioned: Vec<String> = self
                .catalog
                .table_names(db_alias)
                .into_iter()
                .filter(|table| lowered.contains(&table.to_lowercase()))
                .collect();
            self.on_failure(db_alias, mentioned.iter().map(String::as_str), e);
        }
        result
    }

    /// Re-stamp invalidations recorded during a transaction
    pub async fn commit(&self) -> CachetResult<usize> {
        self.invalidator.flush_pending().await
    }

    /// Tables that bypass the cache after a failed invalidation
    pub fn disabled_tables(&self) -> Vec<(String, String)> {
        let mut tables: Vec<_> = self.lock_disabled().iter().cloned().collect();
        tables.sort();
        tables
    }

    fn on_failure<'t>(
        &self,
        db_alias: &str,
        tables: impl IntoIterator<Item = &'t str>,
        error: &CachetError,
    ) {
        if !error.is_invalidation_failure() {
            return;
        }
        let mut disabled = self.lock_disabled();
        for table in tables {
            warn!(
                "Disabling cache for {}.{} after failed invalidation: {}",
                db_alias, table, error
            );
            disabled.insert((db_alias.to_string(), table.to_string()));
        }
    }

    fn first_disabled(&self, db_alias: &str, tables: &BTreeSet<String>) -> Option<String> {
        let disabled = self.lock_disabled();
        if disabled.is_empty() {
            return None;
        }
        tables
            .iter()
            .find(|table| disabled.contains(&(db_alias.to_string(), (*table).clone())))
            .cloned()
    }

    fn lock_disabled(&self) -> MutexGuard<'_, HashSet<(String, String)>> {
        self.disabled_tables
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
