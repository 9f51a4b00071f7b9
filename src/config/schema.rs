//! Configuration schema for Cachet
//!
//! Configuration is stored at `~/.config/cachet/config.toml`

use crate::keys::KeyStrategyKind;
use crate::resolve::DEFAULT_MAX_NESTING;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Query caching rules
    pub cache: CacheConfig,

    /// Cache store backend
    pub store: StoreConfig,

    /// Known tables per database alias
    pub databases: BTreeMap<String, DatabaseConfig>,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// Query caching rules
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Master switch for read caching
    pub enabled: bool,

    /// Lifetime of cached results in seconds (unset = no expiry)
    pub timeout_secs: Option<u64>,

    /// Cache queries ordered randomly
    pub cache_random: bool,

    /// Tables whose queries are never cached
    pub blacklist: BTreeSet<String>,

    /// Digest used for query and table keys
    pub key_strategy: KeyStrategyKind,

    /// Deepest subquery nesting accepted before a query bypasses the cache
    pub max_nesting: usize,

    /// Invalidate tables named in raw write SQL
    pub invalidate_raw: bool,
}

impl CacheConfig {
    /// Result TTL as a duration
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_secs: None,
            cache_random: false,
            blacklist: BTreeSet::new(),
            key_strategy: KeyStrategyKind::default(),
            max_nesting: DEFAULT_MAX_NESTING,
            invalidate_raw: true,
        }
    }
}

/// Cache store backend kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// One JSON file per key, shared by processes on the same host
    #[default]
    File,
    /// In-process map, lost on exit
    Memory,
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::File => "file",
            Self::Memory => "memory",
        };
        write!(f, "{}", name)
    }
}

/// Cache store settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Backend to use
    pub backend: StoreBackend,

    /// Directory for the file backend (default: user cache dir)
    pub path: Option<PathBuf>,
}

/// One database's schema information
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Table names, matched against raw SQL
    pub tables: Vec<String>,
}
