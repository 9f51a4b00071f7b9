//! CLI command implementations

pub mod check;
pub mod config;
pub mod invalidate;
pub mod key;
pub mod resolve;
pub mod store;

pub use check::execute as check;
pub use config::execute as config;
pub use invalidate::execute as invalidate;
pub use key::execute as key;
pub use resolve::execute as resolve;
pub use store::execute as store;

use crate::cache::QueryCache;
use crate::catalog::StaticCatalog;
use crate::config::Config;
use crate::error::{CachetError, CachetResult};
use crate::query::CompiledQuery;
use std::path::Path;
use std::sync::Arc;
use tokio::fs;

/// Read a JSON-encoded compiled query
async fn load_query(path: &Path) -> CachetResult<CompiledQuery> {
    if !path.exists() {
        return Err(CachetError::PathNotFound(path.to_path_buf()));
    }
    let content = fs::read_to_string(path)
        .await
        .map_err(|e| CachetError::io(format!("reading {}", path.display()), e))?;
    Ok(serde_json::from_str(&content)?)
}

/// Query cache over the configured store and catalog
async fn open_cache(config: &Config) -> CachetResult<QueryCache> {
    let store = crate::store::open_store(config).await?;
    let catalog = Arc::new(StaticCatalog::from_config(config));
    Ok(QueryCache::from_config(config, store, catalog))
}
