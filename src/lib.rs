//! Cachet - read-query result cache with table invalidation
//!
//! Caches the results of read queries under a key derived from their SQL
//! and parameters, tracks every table each result depends on (subqueries
//! included), and drops those results as soon as any of the tables is
//! written to.

pub mod cache;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod invalidation;
pub mod keys;
pub mod query;
pub mod resolve;
pub mod store;

pub use cache::{CachedEntry, Lookup, PendingRead, QueryCache};
pub use error::{CachetError, CachetResult};
pub use invalidation::{InvalidationBus, InvalidationEvent, Invalidator};
pub use keys::{CacheKey, KeyStrategy};
pub use query::{CompiledQuery, FilterNode, Param, Statement};
pub use resolve::{Rejection, RejectionPolicy, TableResolver};
