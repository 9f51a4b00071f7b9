//! Filter trees attached to compiled queries
//!
//! WHERE and HAVING clauses arrive as trees of [`FilterNode`]. Subqueries
//! can sit at any depth: directly as a subquery constraint, as the
//! right-hand side of a comparison, or inside arbitrarily nested
//! AND/OR/NOT groups.

use super::{CompiledQuery, Param};
use serde::{Deserialize, Serialize};

/// How the children of a composite node are combined
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Connector {
    #[default]
    And,
    Or,
}

/// Right-hand side of a comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Operand {
    /// `col IN (SELECT ...)`, `col = (SELECT ...)`
    Subquery(Box<CompiledQuery>),
    Value(Param),
    Null,
}

/// A node in a WHERE or HAVING tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum FilterNode {
    /// AND/OR group, optionally negated
    Composite {
        #[serde(default)]
        connector: Connector,
        #[serde(default)]
        negated: bool,
        children: Vec<FilterNode>,
    },

    /// Multi-column subquery constraint, e.g. `(a, b) IN (SELECT ...)`
    Subquery { query: Box<CompiledQuery> },

    /// `column <lookup> rhs`
    Comparison {
        column: String,
        lookup: String,
        rhs: Operand,
    },

    /// Hand-written WHERE fragment the compiler cannot see into
    RawSql {
        sql: String,
        #[serde(default)]
        params: Vec<Param>,
    },

    /// A node shape the compiler produced but this crate does not model
    Unknown { kind: String },
}

impl FilterNode {
    /// AND group
    pub fn and(children: impl IntoIterator<Item = FilterNode>) -> Self {
        Self::Composite {
            connector: Connector::And,
            negated: false,
            children: children.into_iter().collect(),
        }
    }

    /// OR group
    pub fn or(children: impl IntoIterator<Item = FilterNode>) -> Self {
        Self::Composite {
            connector: Connector::Or,
            negated: false,
            children: children.into_iter().collect(),
        }
    }

    /// Negate a node by wrapping it in a negated AND group
    pub fn not(node: FilterNode) -> Self {
        Self::Composite {
            connector: Connector::And,
            negated: true,
            children: vec![node],
        }
    }

    pub fn subquery(query: CompiledQuery) -> Self {
        Self::Subquery {
            query: Box::new(query),
        }
    }

    /// `column <lookup> value`
    pub fn compare(
        column: impl Into<String>,
        lookup: impl Into<String>,
        value: impl Into<Param>,
    ) -> Self {
        Self::Comparison {
            column: column.into(),
            lookup: lookup.into(),
            rhs: Operand::Value(value.into()),
        }
    }

    /// `column IN (<query>)`
    pub fn in_subquery(column: impl Into<String>, query: CompiledQuery) -> Self {
        Self::Comparison {
            column: column.into(),
            lookup: "in".to_string(),
            rhs: Operand::Subquery(Box::new(query)),
        }
    }

    pub fn raw(sql: impl Into<String>) -> Self {
        Self::RawSql {
            sql: sql.into(),
            params: vec![],
        }
    }

    /// Child nodes; empty for leaves
    pub fn children(&self) -> &[FilterNode] {
        match self {
            Self::Composite { children, .. } => children,
            _ => &[],
        }
    }

    /// The query this node carries, if any
    pub fn nested_query(&self) -> Option<&CompiledQuery> {
        match self {
            Self::Subquery { query } => Some(query),
            Self::Comparison {
                rhs: Operand::Subquery(query),
                ..
            } => Some(query),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_query_from_constraint_and_comparison() {
        let inner = CompiledQuery::select("default", "customers", "SELECT id FROM customers");

        let constraint = FilterNode::subquery(inner.clone());
        assert_eq!(constraint.nested_query().unwrap().base_table, "customers");

        let comparison = FilterNode::in_subquery("customer_id", inner);
        assert_eq!(comparison.nested_query().unwrap().base_table, "customers");

        assert!(FilterNode::compare("id", "exact", 7).nested_query().is_none());
        assert!(FilterNode::raw("1 = 1").nested_query().is_none());
    }

    #[test]
    fn leaves_have_no_children() {
        assert!(FilterNode::compare("id", "exact", 1).children().is_empty());
        let group = FilterNode::or([FilterNode::raw("a"), FilterNode::raw("b")]);
        assert_eq!(group.children().len(), 2);
    }

    #[test]
    fn deserializes_tagged_nodes() {
        let json = r#"{
            "node": "composite",
            "connector": "or",
            "children": [
                {"node": "comparison", "column": "id", "lookup": "exact",
                 "rhs": {"kind": "value", "value": 3}},
                {"node": "comparison", "column": "x", "lookup": "isnull",
                 "rhs": {"kind": "null"}},
                {"node": "unknown", "kind": "ExtraJoinRestriction"}
            ]
        }"#;
        let node: FilterNode = serde_json::from_str(json).unwrap();
        let children = node.children();
        assert_eq!(children.len(), 3);
        assert_eq!(children[0], FilterNode::compare("id", "exact", 3));
        assert!(matches!(children[2], FilterNode::Unknown { .. }));
    }
}
