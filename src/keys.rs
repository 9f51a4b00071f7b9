//! Cache key derivation
//!
//! Query keys identify one cached read result; table keys identify the
//! invalidation marker of one table. Both are 160-bit digests rendered as
//! 40 lowercase hex characters.
//!
//! The canonical strings hashed here are a wire format: every process
//! sharing a cache store must produce the same bytes.
//!
//! | Key | Canonical string |
//! |-----|------------------|
//! | query | `<using>:<sql>:<params tuple>` |
//! | table | `<db_alias>:<table>` |

use crate::error::CachetError;
use crate::query::{params_repr, CompiledQuery};
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Opaque key into the cache store
pub type CacheKey = String;

/// Bytes kept from the digest (160 bits)
const KEY_BYTES: usize = 20;

/// Turns queries and tables into cache keys
///
/// Implementations must be pure: the same input always yields the same key.
pub trait KeyStrategy: Send + Sync + fmt::Debug {
    /// Short identifier used in config and logs
    fn name(&self) -> &'static str;

    /// Key for the cached result of a read query
    fn query_key(&self, query: &CompiledQuery) -> CacheKey;

    /// Key for the invalidation marker of a table
    fn table_key(&self, db_alias: &str, table: &str) -> CacheKey;
}

/// Canonical string hashed into a query key
pub fn canonical_query(query: &CompiledQuery) -> String {
    let (sql, params) = query.render();
    format!("{}:{}:{}", query.using, sql, params_repr(params))
}

/// Canonical string hashed into a table key
pub fn canonical_table(db_alias: &str, table: &str) -> String {
    format!("{}:{}", db_alias, table)
}

fn digest_hex<D: Digest>(input: &str) -> CacheKey {
    let mut hasher = D::new();
    hasher.update(input.as_bytes());
    let result = hasher.finalize();
    hex::encode(&result[..KEY_BYTES])
}

/// SHA-1 over the canonical strings (the default)
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha1Keys;

impl KeyStrategy for Sha1Keys {
    fn name(&self) -> &'static str {
        "sha1"
    }

    fn query_key(&self, query: &CompiledQuery) -> CacheKey {
        digest_hex::<Sha1>(&canonical_query(query))
    }

    fn table_key(&self, db_alias: &str, table: &str) -> CacheKey {
        digest_hex::<Sha1>(&canonical_table(db_alias, table))
    }
}

/// SHA-256 truncated to its first 160 bits
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256TruncatedKeys;

impl KeyStrategy for Sha256TruncatedKeys {
    fn name(&self) -> &'static str {
        "sha256-160"
    }

    fn query_key(&self, query: &CompiledQuery) -> CacheKey {
        digest_hex::<Sha256>(&canonical_query(query))
    }

    fn table_key(&self, db_alias: &str, table: &str) -> CacheKey {
        digest_hex::<Sha256>(&canonical_table(db_alias, table))
    }
}

/// Built-in strategies selectable from configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyStrategyKind {
    #[default]
    #[serde(rename = "sha1")]
    Sha1,
    #[serde(rename = "sha256-160")]
    Sha256Truncated,
}

impl KeyStrategyKind {
    /// Instantiate the strategy
    pub fn build(self) -> Arc<dyn KeyStrategy> {
        match self {
            Self::Sha1 => Arc::new(Sha1Keys),
            Self::Sha256Truncated => Arc::new(Sha256TruncatedKeys),
        }
    }
}

impl fmt::Display for KeyStrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Sha1 => "sha1",
            Self::Sha256Truncated => "sha256-160",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for KeyStrategyKind {
    type Err = CachetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sha1" => Ok(Self::Sha1),
            "sha256-160" => Ok(Self::Sha256Truncated),
            other => Err(CachetError::UnknownKeyStrategy(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Param;

    fn order_by_id(id: i64) -> CompiledQuery {
        CompiledQuery::select("default", "orders", "SELECT * FROM orders WHERE id = %s")
            .with_params([id])
    }

    #[test]
    fn query_key_matches_reference_digest() {
        assert_eq!(
            canonical_query(&order_by_id(7)),
            "default:SELECT * FROM orders WHERE id = %s:(7,)"
        );
        assert_eq!(
            Sha1Keys.query_key(&order_by_id(7)),
            "a7890667a660fd2fd5c1aa33fbcbc65606e5406b"
        );
    }

    #[test]
    fn query_key_with_mixed_params() {
        let q = CompiledQuery::select("default", "t", "SELECT * FROM t WHERE a = %s AND b = %s")
            .with_params([
                Param::Int(1),
                Param::from("O'Brien"),
                Param::Null,
                Param::Float(2.5),
            ]);
        assert_eq!(
            Sha1Keys.query_key(&q),
            "bff733a6e95d46f90862f38562859bf952cb38d7"
        );
    }

    #[test]
    fn table_key_matches_reference_digest() {
        assert_eq!(
            Sha1Keys.table_key("default", "orders"),
            "eb34e818bd727b35ed2b26d388bf9255c228c7de"
        );
        assert_eq!(
            Sha256TruncatedKeys.table_key("default", "orders"),
            "d84e4c0cc781642ccc7a8ff1a54d89f0a0f58e54"
        );
    }

    #[test]
    fn query_key_is_pure() {
        assert_eq!(
            Sha1Keys.query_key(&order_by_id(7)),
            Sha1Keys.query_key(&order_by_id(7))
        );
    }

    #[test]
    fn query_key_sensitive_to_every_component() {
        let base = Sha1Keys.query_key(&order_by_id(7));

        assert_ne!(base, Sha1Keys.query_key(&order_by_id(8)));

        let mut other_alias = order_by_id(7);
        other_alias.using = "replica".to_string();
        assert_ne!(base, Sha1Keys.query_key(&other_alias));

        let mut other_sql = order_by_id(7);
        other_sql.sql = "SELECT * FROM orders WHERE id = %s ".to_string();
        assert_ne!(base, Sha1Keys.query_key(&other_sql));

        let as_text = order_by_id(7).with_params(["7"]);
        assert_ne!(base, Sha1Keys.query_key(&as_text));
    }

    #[test]
    fn table_keys_separate_tables_and_aliases() {
        let orders = Sha1Keys.table_key("default", "orders");
        assert_ne!(orders, Sha1Keys.table_key("default", "customers"));
        assert_ne!(orders, Sha1Keys.table_key("replica", "orders"));
    }

    #[test]
    fn keys_are_fixed_length_hex() {
        for strategy in [KeyStrategyKind::Sha1.build(), KeyStrategyKind::Sha256Truncated.build()] {
            let key = strategy.query_key(&order_by_id(1));
            assert_eq!(key.len(), 40);
            assert!(key.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        }
    }

    #[test]
    fn strategy_kind_parses() {
        assert_eq!("sha1".parse::<KeyStrategyKind>().unwrap(), KeyStrategyKind::Sha1);
        assert_eq!(
            "sha256-160".parse::<KeyStrategyKind>().unwrap(),
            KeyStrategyKind::Sha256Truncated
        );
        assert!("md5".parse::<KeyStrategyKind>().is_err());
        assert_eq!(KeyStrategyKind::Sha256Truncated.build().name(), "sha256-160");
    }
}
