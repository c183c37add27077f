//! Structured, parameterized graph queries
//!
//! A [`GraphQuery`] is a single directed path pattern of up to [`MAX_HOPS`] relationships,
//! equality filters against bound parameters, and a projection. It is the only query form the
//! graph stores accept: labels, types, aliases and keys are validated identifiers, and every
//! value reaches the store as a bound parameter.

use crate::errors::{AppError, Result};
use crate::identifier::{validate_identifier, IdentifierKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Maximum number of relationships in one path pattern
pub const MAX_HOPS: usize = 4;

/// `(alias:Label)`; the label is optional
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodePattern {
    pub alias: String,
    #[serde(default)]
    pub label: Option<String>,
}

impl NodePattern {
    pub fn new(alias: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            label: None,
        }
    }

    pub fn labeled(alias: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            label: Some(label.into()),
        }
    }
}

/// `-[alias:TYPE]->`; the alias is only needed to return edge properties
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipPattern {
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(rename = "type")]
    pub rel_type: String,
}

/// One relationship and the node it leads to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hop {
    pub relationship: RelationshipPattern,
    pub node: NodePattern,
}

/// `alias.property = $param`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub alias: String,
    pub property: String,
    pub param: String,
}

/// `alias.property AS column`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnItem {
    pub alias: String,
    pub property: String,
    pub column: String,
}

/// What an alias refers to within the pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AliasTarget {
    /// Index into the pattern's node list (0 = start node)
    Node(usize),
    /// Index into the hop list
    Relationship(usize),
}

/// A parameterized path query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQuery {
    pub start: NodePattern,
    pub hops: Vec<Hop>,
    #[serde(default)]
    pub filters: Vec<Filter>,
    pub returns: Vec<ReturnItem>,
    #[serde(default)]
    pub order_by: Vec<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub params: BTreeMap<String, Value>,
}

impl GraphQuery {
    /// Start a query at the given node pattern
    pub fn matching(start: NodePattern) -> Self {
        Self {
            start,
            hops: Vec::new(),
            filters: Vec::new(),
            returns: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            params: BTreeMap::new(),
        }
    }

    /// Extend the path by an anonymous relationship
    pub fn hop(mut self, rel_type: impl Into<String>, node: NodePattern) -> Self {
        self.hops.push(Hop {
            relationship: RelationshipPattern {
                alias: None,
                rel_type: rel_type.into(),
            },
            node,
        });
        self
    }

    /// Extend the path by a named relationship
    pub fn hop_as(
        mut self,
        alias: impl Into<String>,
        rel_type: impl Into<String>,
        node: NodePattern,
    ) -> Self {
        self.hops.push(Hop {
            relationship: RelationshipPattern {
                alias: Some(alias.into()),
                rel_type: rel_type.into(),
            },
            node,
        });
        self
    }

    pub fn filter(
        mut self,
        alias: impl Into<String>,
        property: impl Into<String>,
        param: impl Into<String>,
    ) -> Self {
        self.filters.push(Filter {
            alias: alias.into(),
            property: property.into(),
            param: param.into(),
        });
        self
    }

    pub fn returning(
        mut self,
        alias: impl Into<String>,
        property: impl Into<String>,
        column: impl Into<String>,
    ) -> Self {
        self.returns.push(ReturnItem {
            alias: alias.into(),
            property: property.into(),
            column: column.into(),
        });
        self
    }

    pub fn order_by(mut self, column: impl Into<String>) -> Self {
        self.order_by.push(column.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn bind(mut self, param: impl Into<String>, value: Value) -> Self {
        self.params.insert(param.into(), value);
        self
    }

    /// Nodes in path order, start node first
    pub fn nodes(&self) -> impl Iterator<Item = &NodePattern> {
        std::iter::once(&self.start).chain(self.hops.iter().map(|h| &h.node))
    }

    /// Resolve an alias to its position in the pattern
    pub fn resolve(&self, alias: &str) -> Option<AliasTarget> {
        if let Some(index) = self.nodes().position(|n| n.alias == alias) {
            return Some(AliasTarget::Node(index));
        }
        self.hops
            .iter()
            .position(|h| h.relationship.alias.as_deref() == Some(alias))
            .map(AliasTarget::Relationship)
    }

    /// Reject anything a store could not execute safely
    pub fn validate(&self) -> Result<()> {
        let malformed = |message: String| AppError::MalformedQuery { message };

        if self.hops.is_empty() || self.hops.len() > MAX_HOPS {
            return Err(malformed(format!(
                "path must have between 1 and {} relationships, got {}",
                MAX_HOPS,
                self.hops.len()
            )));
        }

        let mut aliases = HashSet::new();
        for node in self.nodes() {
            validate_identifier(IdentifierKind::Alias, &node.alias)?;
            if let Some(label) = &node.label {
                validate_identifier(IdentifierKind::Label, label)?;
            }
            if !aliases.insert(node.alias.as_str()) {
                return Err(malformed("duplicate alias in pattern".to_string()));
            }
        }
        for hop in &self.hops {
            validate_identifier(IdentifierKind::RelationshipType, &hop.relationship.rel_type)?;
            if let Some(alias) = &hop.relationship.alias {
                validate_identifier(IdentifierKind::Alias, alias)?;
                if !aliases.insert(alias.as_str()) {
                    return Err(malformed("duplicate alias in pattern".to_string()));
                }
            }
        }

        for filter in &self.filters {
            if self.resolve(&filter.alias).is_none() {
                return Err(malformed("filter references an undefined alias".to_string()));
            }
            validate_identifier(IdentifierKind::PropertyKey, &filter.property)?;
            validate_identifier(IdentifierKind::Parameter, &filter.param)?;
            if !self.params.contains_key(&filter.param) {
                return Err(malformed(format!("parameter ${} is not bound", filter.param)));
            }
        }

        if self.returns.is_empty() {
            return Err(malformed("query returns nothing".to_string()));
        }
        let mut columns = HashSet::new();
        for item in &self.returns {
            if self.resolve(&item.alias).is_none() {
                return Err(malformed("return item references an undefined alias".to_string()));
            }
            validate_identifier(IdentifierKind::PropertyKey, &item.property)?;
            validate_identifier(IdentifierKind::Column, &item.column)?;
            if !columns.insert(item.column.as_str()) {
                return Err(malformed("duplicate return column".to_string()));
            }
        }

        for column in &self.order_by {
            if !columns.contains(column.as_str()) {
                return Err(malformed("order_by references an unknown column".to_string()));
            }
        }

        if self.limit == Some(0) {
            return Err(malformed("limit must be positive".to_string()));
        }

        Ok(())
    }
}

/// Cypher-style rendering, for logs and plan echoes. Parameters stay as `$name`.
impl fmt::Display for GraphQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn node(f: &mut fmt::Formatter<'_>, n: &NodePattern) -> fmt::Result {
            match &n.label {
                Some(label) => write!(f, "({}:{})", n.alias, label),
                None => write!(f, "({})", n.alias),
            }
        }

        f.write_str("MATCH ")?;
        node(f, &self.start)?;
        for hop in &self.hops {
            match &hop.relationship.alias {
                Some(alias) => write!(f, "-[{}:{}]->", alias, hop.relationship.rel_type)?,
                None => write!(f, "-[:{}]->", hop.relationship.rel_type)?,
            }
            node(f, &hop.node)?;
        }

        for (i, filter) in self.filters.iter().enumerate() {
            let keyword = if i == 0 { " WHERE" } else { " AND" };
            write!(f, "{} {}.{} = ${}", keyword, filter.alias, filter.property, filter.param)?;
        }

        f.write_str(" RETURN ")?;
        let returns: Vec<String> = self
            .returns
            .iter()
            .map(|r| format!("{}.{} AS {}", r.alias, r.property, r.column))
            .collect();
        f.write_str(&returns.join(", "))?;

        if !self.order_by.is_empty() {
            write!(f, " ORDER BY {}", self.order_by.join(", "))?;
        }
        if let Some(limit) = self.limit {
            write!(f, " LIMIT {}", limit)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn works_in() -> GraphQuery {
        GraphQuery::matching(NodePattern::labeled("p", "Person"))
            .hop("WORKS_IN", NodePattern::labeled("d", "Department"))
            .returning("p", "name", "person")
            .returning("d", "name", "department")
    }

    #[test]
    fn test_renders_cypher() {
        let query = works_in().order_by("person");
        assert_eq!(
            query.to_string(),
            "MATCH (p:Person)-[:WORKS_IN]->(d:Department) \
             RETURN p.name AS person, d.name AS department ORDER BY person"
        );
        assert!(query.validate().is_ok());
    }

    #[test]
    fn test_filter_requires_bound_param() {
        let query = works_in().filter("d", "name", "department");
        assert!(matches!(query.validate(), Err(AppError::MalformedQuery { .. })));

        let query = query.bind("department", json!("QA"));
        assert!(query.validate().is_ok());
        assert!(query.to_string().contains("WHERE d.name = $department"));
    }

    #[test]
    fn test_rejects_injected_label() {
        let query = GraphQuery::matching(NodePattern::labeled("p", "Person) DETACH DELETE (x"))
            .hop("WORKS_IN", NodePattern::new("d"))
            .returning("p", "name", "person");
        assert!(matches!(
            query.validate(),
            Err(AppError::InvalidIdentifier { .. })
        ));
    }

    #[test]
    fn test_structural_checks() {
        let no_hops = GraphQuery::matching(NodePattern::new("p")).returning("p", "name", "n");
        assert!(no_hops.validate().is_err());

        let no_returns = GraphQuery::matching(NodePattern::new("p")).hop("R", NodePattern::new("q"));
        assert!(no_returns.validate().is_err());

        let dup_alias = GraphQuery::matching(NodePattern::new("p"))
            .hop("R", NodePattern::new("p"))
            .returning("p", "name", "n");
        assert!(dup_alias.validate().is_err());

        let unknown_order = works_in().order_by("salary");
        assert!(unknown_order.validate().is_err());

        assert!(works_in().limit(0).validate().is_err());
    }

    #[test]
    fn test_resolve_aliases() {
        let query = GraphQuery::matching(NodePattern::labeled("p", "Person"))
            .hop_as("r", "USES", NodePattern::labeled("t", "Tool"))
            .hop("ENABLES", NodePattern::labeled("c", "Concept"))
            .returning("c", "name", "concept")
            .returning("r", "frequency", "frequency");

        assert_eq!(query.resolve("p"), Some(AliasTarget::Node(0)));
        assert_eq!(query.resolve("c"), Some(AliasTarget::Node(2)));
        assert_eq!(query.resolve("r"), Some(AliasTarget::Relationship(0)));
        assert_eq!(query.resolve("x"), None);
        assert!(query.validate().is_ok());
        assert!(query.to_string().contains("-[r:USES]->(t:Tool)-[:ENABLES]->(c:Concept)"));
    }
}
