//! Invalidate command - stamp invalidation markers

use super::open_cache;
use crate::cli::args::InvalidateArgs;
use crate::config::Config;
use crate::error::CachetResult;
use console::style;

/// Execute the invalidate command
pub async fn execute(args: InvalidateArgs, config: &Config) -> CachetResult<()> {
    let cache = open_cache(config).await?;

    let events = match &args.sql {
        Some(sql) => cache.invalidate_raw(&args.alias, sql).await?,
        None => cache.invalidate_tables(&args.alias, &args.tables).await?,
    };

    if events.is_empty() {
        println!("{} No tables invalidated", style("!").yellow());
        return Ok(());
    }

    for event in events {
        println!(
            "{} Invalidated {}.{}",
            style("✓").green(),
            event.db_alias,
            style(&event.table).cyan()
        );
    }

    Ok(())
}
