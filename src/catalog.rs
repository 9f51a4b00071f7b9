//! Known table names per database
//!
//! Raw SQL fragments cannot be analysed structurally, so the resolver falls
//! back to matching every known table name against the rendered SQL. The
//! catalog supplies those names.

use crate::config::Config;
use std::collections::HashMap;

/// Source of table names for a database alias
pub trait Catalog: Send + Sync {
    /// All tables known for `db_alias`; empty for unknown aliases
    fn table_names(&self, db_alias: &str) -> Vec<String>;
}

/// Fixed table lists, usually taken from configuration
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    tables: HashMap<String, Vec<String>>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the tables of one database
    pub fn with_tables<T: Into<String>>(
        mut self,
        db_alias: impl Into<String>,
        tables: impl IntoIterator<Item = T>,
    ) -> Self {
        self.tables
            .entry(db_alias.into())
            .or_default()
            .extend(tables.into_iter().map(Into::into));
        self
    }

    /// Build from the `[databases.<alias>]` sections
    pub fn from_config(config: &Config) -> Self {
        config
            .databases
            .iter()
            .fold(Self::new(), |catalog, (alias, db)| {
                catalog.with_tables(alias.clone(), db.tables.iter().cloned())
            })
    }
}

impl Catalog for StaticCatalog {
    fn table_names(&self, db_alias: &str) -> Vec<String> {
        self.tables.get(db_alias).cloned().unwrap_or_default()
    }
}
