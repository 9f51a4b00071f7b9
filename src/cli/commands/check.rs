//! Check command - report how a query would be served

use super::{load_query, open_cache};
use crate::cache::Lookup;
use crate::cli::args::CheckArgs;
use crate::config::Config;
use crate::error::CachetResult;
use console::style;

/// Execute the check command
pub async fn execute(args: CheckArgs, config: &Config) -> CachetResult<()> {
    let query = load_query(&args.file).await?;
    let cache = open_cache(config).await?;

    match cache.lookup(&query).await? {
        Lookup::Hit(_) => println!("{}", style("hit").green()),
        Lookup::Miss(pending) if pending.stale => println!("{}", style("stale").yellow()),
        Lookup::Miss(_) => println!("{}", style("miss").dim()),
        Lookup::Bypass(rejection) => {
            println!("{} ({})", style("bypass").red(), rejection)
        }
    }

    Ok(())
}
