//! Opt-out rules for caching

use crate::config::schema::CacheConfig;
use crate::query::CompiledQuery;
use std::collections::BTreeSet;
use thiserror::Error;

/// Why a query bypasses the cache
///
/// Rejections are control signals: the caller runs the query uncached and
/// moves on. They are never reported as failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("query orders its results randomly")]
    RandomOrdering,

    #[error("query depends on blacklisted tables: {tables:?}")]
    BlacklistedTable { tables: BTreeSet<String> },

    #[error("unsupported filter node: {kind}")]
    UnsupportedNode { kind: String },

    #[error("subqueries nested deeper than {limit} levels")]
    NestingTooDeep { limit: usize },

    #[error("query caching is disabled")]
    Disabled,

    #[error("caching disabled for table {table} after a failed invalidation")]
    TableDisabled { table: String },
}

/// Random-ordering and blacklist rules, fixed at startup
#[derive(Debug, Clone, Default)]
pub struct RejectionPolicy {
    allow_random_ordering: bool,
    blacklist: BTreeSet<String>,
}

impl RejectionPolicy {
    pub fn new(allow_random_ordering: bool, blacklist: impl IntoIterator<Item = String>) -> Self {
        Self {
            allow_random_ordering,
            blacklist: blacklist.into_iter().collect(),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.cache_random, config.blacklist.iter().cloned())
    }

    pub fn allows_random_ordering(&self) -> bool {
        self.allow_random_ordering
    }

    pub fn blacklist(&self) -> &BTreeSet<String> {
        &self.blacklist
    }

    /// Whether the query's ordering alone rules out caching
    pub fn rejects_ordering(&self, query: &CompiledQuery) -> bool {
        !self.allow_random_ordering && query.is_random_ordered()
    }

    /// Blacklisted members of `tables`; empty when caching may proceed
    pub fn blacklisted(&self, tables: &BTreeSet<String>) -> BTreeSet<String> {
        self.blacklist.intersection(tables).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::RANDOM_ORDER;

    fn random_query() -> CompiledQuery {
        CompiledQuery::select("default", "orders", "SELECT * FROM orders ORDER BY RANDOM()")
            .order_by(RANDOM_ORDER)
    }

    #[test]
    fn random_ordering_rejected_by_default() {
        let policy = RejectionPolicy::default();
        assert!(policy.rejects_ordering(&random_query()));
    }

    #[test]
    fn random_ordering_allowed_when_configured() {
        let policy = RejectionPolicy::new(true, Vec::new());
        assert!(!policy.rejects_ordering(&random_query()));
    }

    #[test]
    fn blacklist_intersection() {
        let policy = RejectionPolicy::new(false, ["secrets".to_string()]);
        let tables: BTreeSet<String> = ["orders", "secrets"].iter().map(|t| t.to_string()).collect();
        assert_eq!(
            policy.blacklisted(&tables),
            BTreeSet::from(["secrets".to_string()])
        );

        let clean: BTreeSet<String> = BTreeSet::from(["orders".to_string()]);
        assert!(policy.blacklisted(&clean).is_empty());
    }

    #[test]
    fn from_config_copies_settings() {
        let mut config = CacheConfig::default();
        config.cache_random = true;
        config.blacklist.insert("audit_log".to_string());

        let policy = RejectionPolicy::from_config(&config);
        assert!(policy.allows_random_ordering());
        assert!(policy.blacklist().contains("audit_log"));
    }
}
