//! Error types for Cachet
//!
//! All fallible operations return `CachetResult<T>`. Cacheability
//! rejections are not errors and live in [`crate::resolve::Rejection`].

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Cachet operations
pub type CachetResult<T> = Result<T, CachetError>;

/// All errors that can occur in Cachet
#[derive(Error, Debug)]
pub enum CachetError {
    // Store errors
    #[error("Cache store '{backend}' failed: {reason}")]
    Store { backend: String, reason: String },

    #[error("Failed to invalidate table {table} on {db_alias}: {source}")]
    InvalidationFailed {
        table: String,
        db_alias: String,
        #[source]
        source: Box<CachetError>,
    },

    #[error("Corrupt cache entry {key}: {reason}")]
    CorruptEntry { key: String, reason: String },

    // Query errors
    #[error("Not a write statement: {0} cannot invalidate tables")]
    NotAWrite(String),

    #[error("Unknown key strategy: {0}")]
    UnknownKeyStrategy(String),

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl CachetError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a store error for the named backend
    pub fn store(backend: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Store {
            backend: backend.into(),
            reason: reason.into(),
        }
    }

    /// Wrap a store failure raised while invalidating a table
    pub fn invalidation(
        table: impl Into<String>,
        db_alias: impl Into<String>,
        source: CachetError,
    ) -> Self {
        Self::InvalidationFailed {
            table: table.into(),
            db_alias: db_alias.into(),
            source: Box::new(source),
        }
    }

    /// Whether cached results for some table can no longer be trusted
    pub fn is_invalidation_failure(&self) -> bool {
        matches!(self, Self::InvalidationFailed { .. })
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::InvalidationFailed { .. } => {
                Some("Caching stays disabled for this table until the process restarts")
            }
            Self::UnknownKeyStrategy(_) => Some("Valid strategies: sha1, sha256-160"),
            Self::ConfigInvalid { .. } => Some("Run: cachet config init --force"),
            Self::NotAWrite(_) => Some("Only insert, update and delete statements invalidate"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = CachetError::store("memory", "connection reset");
        assert_eq!(
            err.to_string(),
            "Cache store 'memory' failed: connection reset"
        );
    }

    #[test]
    fn invalidation_failure_keeps_source() {
        let err = CachetError::invalidation(
            "orders",
            "default",
            CachetError::store("file", "disk full"),
        );
        assert!(err.is_invalidation_failure());
        assert!(err.to_string().contains("orders"));
        let source = std::error::Error::source(&err).unwrap();
        assert!(source.to_string().contains("disk full"));
    }

    #[test]
    fn error_hint() {
        let err = CachetError::UnknownKeyStrategy("md5".to_string());
        assert_eq!(err.hint(), Some("Valid strategies: sha1, sha256-160"));
        assert!(CachetError::Internal("x".to_string()).hint().is_none());
    }
}
