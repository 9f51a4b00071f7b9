//! Store command - cache a result for a query

use super::{load_query, open_cache};
use crate::cache::Lookup;
use crate::cli::args::StoreArgs;
use crate::config::Config;
use crate::error::{CachetError, CachetResult};
use console::style;
use serde_json::Value;

/// Execute the store command
pub async fn execute(args: StoreArgs, config: &Config) -> CachetResult<()> {
    let query = load_query(&args.file).await?;
    let rows: Value = serde_json::from_str(&args.rows)
        .map_err(|e| CachetError::User(format!("--rows is not valid JSON: {}", e)))?;
    let cache = open_cache(config).await?;

    match cache.lookup(&query).await? {
        Lookup::Bypass(rejection) => {
            println!("{} {}", style("!").yellow(), rejection);
        }
        Lookup::Hit(_) => {
            println!("{} Already cached", style("✓").green());
        }
        Lookup::Miss(pending) => {
            let tables = pending.tables.iter().cloned().collect::<Vec<_>>().join(", ");
            let key = pending.query_key.clone();
            cache.store(pending, rows).await?;
            println!(
                "{} Cached {} ({})",
                style("✓").green(),
                style(key).cyan(),
                tables
            );
        }
    }

    Ok(())
}
