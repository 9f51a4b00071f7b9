//! Resolve command - list the tables a query depends on

use super::load_query;
use crate::catalog::StaticCatalog;
use crate::cli::args::{OutputFormat, ResolveArgs};
use crate::config::Config;
use crate::error::CachetResult;
use crate::resolve::{RejectionPolicy, TableResolver};
use console::style;
use serde_json::json;

/// Execute the resolve command
pub async fn execute(args: ResolveArgs, config: &Config) -> CachetResult<()> {
    let query = load_query(&args.file).await?;
    let keys = config.cache.key_strategy.build();
    let policy = RejectionPolicy::from_config(&config.cache);
    let catalog = StaticCatalog::from_config(config);

    let resolved = TableResolver::new(&policy, &catalog)
        .with_max_nesting(config.cache.max_nesting)
        .resolve(&query, &query.using);
    match args.format {
        OutputFormat::Json => {
            let output = match &resolved {
                Ok(tables) => json!({
                    "query_key": keys.query_key(&query),
                    "tables": tables
                        .iter()
                        .map(|table| json!({
                            "table": table,
                            "key": keys.table_key(&query.using, table),
                        }))
                        .collect::<Vec<_>>(),
                }),
                // Rejected queries never get a key
                Err(rejection) => json!({
                    "rejected": rejection.to_string(),
                }),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Plain => match resolved {
            Ok(tables) => {
                println!("{} {}", style("query").bold(), keys.query_key(&query));
                for table in &tables {
                    println!(
                        "{:<24} {}",
                        style(table).cyan(),
                        keys.table_key(&query.using, table)
                    );
                }
            }
            Err(rejection) => {
                println!("{} {}", style("not cacheable:").yellow(), rejection);
            }
        },
    }

    Ok(())
}
