//! Compiled query model
//!
//! A [`CompiledQuery`] is what the SQL compiler hands over right before
//! execution: the rendered SQL with its parameters plus the structural
//! metadata needed to work out which tables the result depends on.
//! Queries are built by the caller and never mutated by this crate.

mod filter;
mod param;

pub use filter::{Connector, FilterNode, Operand};
pub use param::{params_repr, Param};

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// ORDER BY entry requesting random ordering
pub const RANDOM_ORDER: &str = "?";

/// Kind of SQL statement
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Statement {
    #[default]
    Select,
    Insert,
    Update,
    Delete,
}

impl Statement {
    /// Insert, update and delete change table contents
    pub fn is_write(&self) -> bool {
        !matches!(self, Self::Select)
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Select => "select",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        write!(f, "{}", name)
    }
}

/// A query compiled for one database connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledQuery {
    /// Database alias the query runs against
    pub using: String,

    #[serde(default)]
    pub statement: Statement,

    /// Table of the model being queried (or written)
    pub base_table: String,

    /// Tables pulled in by joins
    #[serde(default)]
    pub joined_tables: BTreeSet<String>,

    /// Rendered SQL text
    pub sql: String,

    /// Bound parameters, in placeholder order
    #[serde(default)]
    pub params: Vec<Param>,

    #[serde(default)]
    pub order_by: Vec<String>,

    /// Top-level WHERE conditions (AND-ed)
    #[serde(default)]
    pub filter: Vec<FilterNode>,

    /// Top-level HAVING conditions (AND-ed)
    #[serde(default)]
    pub having: Vec<FilterNode>,

    /// Hand-written SELECT expressions
    #[serde(default)]
    pub extra_select: Vec<String>,

    /// Set when this query wraps a raw subquery in its FROM clause
    #[serde(default)]
    pub raw_subquery: bool,
}

impl CompiledQuery {
    /// A read query on `base_table`
    pub fn select(
        using: impl Into<String>,
        base_table: impl Into<String>,
        sql: impl Into<String>,
    ) -> Self {
        Self {
            using: using.into(),
            statement: Statement::Select,
            base_table: base_table.into(),
            joined_tables: BTreeSet::new(),
            sql: sql.into(),
            params: vec![],
            order_by: vec![],
            filter: vec![],
            having: vec![],
            extra_select: vec![],
            raw_subquery: false,
        }
    }

    /// A write statement targeting `table`
    pub fn write(
        statement: Statement,
        using: impl Into<String>,
        table: impl Into<String>,
        sql: impl Into<String>,
    ) -> Self {
        Self {
            statement,
            ..Self::select(using, table, sql)
        }
    }

    pub fn with_params<P: Into<Param>>(mut self, params: impl IntoIterator<Item = P>) -> Self {
        self.params = params.into_iter().map(Into::into).collect();
        self
    }

    pub fn join(mut self, table: impl Into<String>) -> Self {
        self.joined_tables.insert(table.into());
        self
    }

    pub fn order_by(mut self, clause: impl Into<String>) -> Self {
        self.order_by.push(clause.into());
        self
    }

    pub fn filter(mut self, node: FilterNode) -> Self {
        self.filter.push(node);
        self
    }

    pub fn having(mut self, node: FilterNode) -> Self {
        self.having.push(node);
        self
    }

    pub fn extra_select(mut self, fragment: impl Into<String>) -> Self {
        self.extra_select.push(fragment.into());
        self
    }

    pub fn wrapping_raw_subquery(mut self) -> Self {
        self.raw_subquery = true;
        self
    }

    /// Rendered SQL and parameters; repeated calls return identical output
    pub fn render(&self) -> (&str, &[Param]) {
        (&self.sql, &self.params)
    }

    pub fn is_random_ordered(&self) -> bool {
        self.order_by.iter().any(|clause| clause == RANDOM_ORDER)
    }

    /// Whether some part of the query is raw SQL the filter trees do not describe
    pub fn has_raw_sql(&self) -> bool {
        fn contains_raw(nodes: &[FilterNode]) -> bool {
            let mut stack: Vec<&FilterNode> = nodes.iter().collect();
            while let Some(node) = stack.pop() {
                if matches!(node, FilterNode::RawSql { .. }) {
                    return true;
                }
                stack.extend(node.children());
            }
            false
        }

        !self.extra_select.is_empty()
            || self.raw_subquery
            || contains_raw(&self.filter)
            || contains_raw(&self.having)
    }
}
