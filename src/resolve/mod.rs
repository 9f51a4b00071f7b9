//! Table dependency resolution
//!
//! Works out every table a read query's result depends on: the base table,
//! joined tables, and the tables of every subquery found anywhere in the
//! WHERE and HAVING trees, at any depth. Queries carrying raw SQL are
//! additionally matched against the catalog by substring, which may report
//! tables the query does not touch but never misses one it does.

pub mod policy;

pub use policy::{Rejection, RejectionPolicy};

use crate::catalog::Catalog;
use crate::query::{CompiledQuery, FilterNode};
use std::collections::BTreeSet;
use tracing::debug;

/// Default bound on subquery nesting
pub const DEFAULT_MAX_NESTING: usize = 256;

/// Resolves the table set of read queries
pub struct TableResolver<'a> {
    policy: &'a RejectionPolicy,
    catalog: &'a dyn Catalog,
    max_nesting: usize,
}

impl<'a> TableResolver<'a> {
    pub fn new(policy: &'a RejectionPolicy, catalog: &'a dyn Catalog) -> Self {
        Self {
            policy,
            catalog,
            max_nesting: DEFAULT_MAX_NESTING,
        }
    }

    /// Reject queries whose subqueries nest deeper than `limit`
    pub fn with_max_nesting(mut self, limit: usize) -> Self {
        self.max_nesting = limit;
        self
    }

    /// Every table `query` depends on, or the reason it must not be cached
    pub fn resolve(
        &self,
        query: &CompiledQuery,
        db_alias: &str,
    ) -> Result<BTreeSet<String>, Rejection> {
        let mut tables = BTreeSet::new();
        let mut pending: Vec<(&CompiledQuery, usize)> = vec![(query, 0)];

        while let Some((current, depth)) = pending.pop() {
            if depth > self.max_nesting {
                debug!("Query nests deeper than {} levels", self.max_nesting);
                return Err(Rejection::NestingTooDeep {
                    limit: self.max_nesting,
                });
            }

            if self.policy.rejects_ordering(current) {
                debug!("Not caching randomly ordered query on {}", current.base_table);
                return Err(Rejection::RandomOrdering);
            }

            tables.extend(current.joined_tables.iter().cloned());
            tables.insert(current.base_table.clone());

            for nested in find_subqueries(current)? {
                pending.push((nested, depth + 1));
            }

            if current.has_raw_sql() {
                let found = self.tables_in_sql(current, db_alias);
                debug!("Raw SQL on {} matched tables {:?}", current.base_table, found);
                tables.extend(found);
            }
        }

        let blacklisted = self.policy.blacklisted(&tables);
        if !blacklisted.is_empty() {
            debug!("Not caching query on blacklisted tables {:?}", blacklisted);
            return Err(Rejection::BlacklistedTable {
                tables: blacklisted,
            });
        }

        debug!("Resolved tables {:?}", tables);
        Ok(tables)
    }

    /// Catalog tables whose name appears in the lowered SQL text
    fn tables_in_sql(&self, query: &CompiledQuery, db_alias: &str) -> Vec<String> {
        let (sql, _) = query.render();
        let lowered = sql.to_lowercase();
        self.catalog
            .table_names(db_alias)
            .into_iter()
            .filter(|table| lowered.contains(&table.to_lowercase()))
            .collect()
    }
}

/// Queries nested directly in `query`'s WHERE and HAVING trees
///
/// Subqueries inside those nested queries are not included; the caller
/// visits each returned query in turn.
fn find_subqueries(query: &CompiledQuery) -> Result<Vec<&CompiledQuery>, Rejection> {
    let mut found = Vec::new();
    let mut stack: Vec<&FilterNode> = query.filter.iter().chain(&query.having).rev().collect();

    while let Some(node) = stack.pop() {
        if let FilterNode::Unknown { kind } = node {
            debug!("Unsupported filter node {} on {}", kind, query.base_table);
            return Err(Rejection::UnsupportedNode { kind: kind.clone() });
        }
        if let Some(nested) = node.nested_query() {
            found.push(nested);
        }
        stack.extend(node.children().iter().rev());
    }

    Ok(found)
}
