//! Graph entity and relationship specifications

use crate::errors::{AppError, Result};
use crate::identifier::{validate_identifier, IdentifierKind};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Scalar properties attached to nodes and edges
pub type Properties = BTreeMap<String, Value>;

/// One row returned by a graph query, keyed by return column
pub type GraphRow = Map<String, Value>;

/// A node to merge, unique per `(label, name)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEntitySpec {
    pub label: String,
    pub name: String,
    #[serde(default)]
    pub properties: Properties,
}

impl GraphEntitySpec {
    pub fn new(label: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            name: name.into(),
            properties: Properties::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    /// Check label and property keys before anything touches a store
    pub fn validate(&self) -> Result<()> {
        validate_identifier(IdentifierKind::Label, &self.label)?;
        if self.name.trim().is_empty() {
            return Err(AppError::Validation {
                message: "entity name must not be empty".to_string(),
                field: Some("name".to_string()),
            });
        }
        validate_properties(&self.properties)
    }
}

/// A directed, typed edge to merge between two named nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphRelationshipSpec {
    #[serde(rename = "type")]
    pub rel_type: String,
    pub from_name: String,
    pub to_name: String,
    #[serde(default)]
    pub properties: Properties,
}

impl GraphRelationshipSpec {
    pub fn new(
        rel_type: impl Into<String>,
        from_name: impl Into<String>,
        to_name: impl Into<String>,
    ) -> Self {
        Self {
            rel_type: rel_type.into(),
            from_name: from_name.into(),
            to_name: to_name.into(),
            properties: Properties::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_identifier(IdentifierKind::RelationshipType, &self.rel_type)?;
        validate_properties(&self.properties)
    }
}

/// Property keys follow the identifier allow-list; values must be scalars
pub fn validate_properties(properties: &Properties) -> Result<()> {
    for (key, value) in properties {
        validate_identifier(IdentifierKind::PropertyKey, key)?;
        if value.is_object() || value.is_array() {
            return Err(AppError::Validation {
                message: "property values must be scalars".to_string(),
                field: Some(key.clone()),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entity_validation() {
        assert!(GraphEntitySpec::new("Person", "Alice").validate().is_ok());
        assert!(GraphEntitySpec::new("Person`) DELETE", "Alice").validate().is_err());
        assert!(GraphEntitySpec::new("Person", "  ").validate().is_err());
        assert!(GraphEntitySpec::new("Person", "Alice")
            .with_property("tags", json!(["a", "b"]))
            .validate()
            .is_err());
    }

    #[test]
    fn test_relationship_serde_uses_type_key() {
        let rel = GraphRelationshipSpec::new("WORKS_IN", "Alice", "QA")
            .with_property("since", json!(2020));
        let value = serde_json::to_value(&rel).unwrap();
        assert_eq!(value["type"], json!("WORKS_IN"));
        assert_eq!(value["properties"]["since"], json!(2020));
        assert!(rel.validate().is_ok());
    }
}
