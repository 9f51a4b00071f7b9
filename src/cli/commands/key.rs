//! Key command - print cache keys

use crate::cli::args::{KeyArgs, KeyTarget};
use crate::config::Config;
use crate::error::CachetResult;
use crate::query::CompiledQuery;

/// Execute the key command
pub async fn execute(args: KeyArgs, config: &Config) -> CachetResult<()> {
    let keys = config.cache.key_strategy.build();

    let key = match args.target {
        KeyTarget::Query { alias, sql, params } => {
            // Only the rendered SQL and parameters feed the key
            let query = CompiledQuery::select(alias, "", sql).with_params(params);
            keys.query_key(&query)
        }
        KeyTarget::Table { table, alias } => keys.table_key(&alias, &table),
    };

    println!("{}", key);
    Ok(())
}
