//! Labeled property graph abstraction
//!
//! Nodes are unique per `(label, name)`; edges are unique per `(type, from, to)`. Merges are
//! idempotent and only set properties when they create something. Relationship endpoints are
//! resolved by name across every label, and an edge is merged for each matching pair.

mod memory;
mod postgres;

pub use memory::InMemoryGraphStore;
pub use postgres::PgGraphStore;

use serde::Serialize;
use strata_common::errors::Result;
use strata_common::models::{GraphEntitySpec, GraphQuery, GraphRelationshipSpec, GraphRow};

/// Counts from one entity merge batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EntityMergeReport {
    pub created: usize,
    pub existing: usize,
}

/// What happened to one relationship spec
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RelationshipOutcome {
    /// Edges merged for every matching endpoint pair
    Merged { created: usize, existing: usize },
    /// At least one endpoint name matched no node; nothing was written for this spec
    MissingEndpoint { missing: Vec<String> },
}

/// Per-spec outcomes, in input order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RelationshipMergeReport {
    pub outcomes: Vec<RelationshipOutcome>,
}

impl RelationshipMergeReport {
    pub fn created(&self) -> usize {
        self.outcomes
            .iter()
            .map(|o| match o {
                RelationshipOutcome::Merged { created, .. } => *created,
                RelationshipOutcome::MissingEndpoint { .. } => 0,
            })
            .sum()
    }

    /// Names that matched no node, across the whole batch
    pub fn missing_endpoints(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .filter_map(|o| match o {
                RelationshipOutcome::MissingEndpoint { missing } => Some(missing.clone()),
                RelationshipOutcome::Merged { .. } => None,
            })
            .flatten()
            .collect()
    }

    /// True when every spec resolved both endpoints
    pub fn is_complete(&self) -> bool {
        self.outcomes
            .iter()
            .all(|o| matches!(o, RelationshipOutcome::Merged { .. }))
    }
}

/// Common trait for graph backends
#[async_trait::async_trait]
pub trait GraphStore: Send + Sync {
    /// Create the backing schema; idempotent
    async fn provision(&self) -> Result<()>;

    /// Merge nodes. The whole batch is validated before anything is written.
    async fn merge_entities(&self, entities: &[GraphEntitySpec]) -> Result<EntityMergeReport>;

    /// Merge edges between existing nodes. The whole batch is validated before anything is
    /// written; unresolved endpoints are reported per spec, not raised.
    async fn merge_relationships(
        &self,
        relationships: &[GraphRelationshipSpec],
    ) -> Result<RelationshipMergeReport>;

    /// Run a validated path query, returning one row per match
    async fn query(&self, query: &GraphQuery) -> Result<Vec<GraphRow>>;

    /// Backend name for logs and health output
    fn name(&self) -> &'static str;
}

pub(crate) fn validate_entities(entities: &[GraphEntitySpec]) -> Result<()> {
    entities.iter().try_for_each(GraphEntitySpec::validate)
}

pub(crate) fn validate_relationships(relationships: &[GraphRelationshipSpec]) -> Result<()> {
    relationships
        .iter()
        .try_for_each(GraphRelationshipSpec::validate)
}

/// Names from `(from, to)` that did not resolve, deduplicated
pub(crate) fn missing_names(
    spec: &GraphRelationshipSpec,
    from_found: bool,
    to_found: bool,
) -> Vec<String> {
    let mut missing = Vec::new();
    if !from_found {
        missing.push(spec.from_name.clone());
    }
    if !to_found && (from_found || spec.to_name != spec.from_name) {
        missing.push(spec.to_name.clone());
    }
    missing
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_helpers() {
        let report = RelationshipMergeReport {
            outcomes: vec![
                RelationshipOutcome::Merged {
                    created: 2,
                    existing: 1,
                },
                RelationshipOutcome::MissingEndpoint {
                    missing: vec!["Bob".to_string()],
                },
            ],
        };
        assert_eq!(report.created(), 2);
        assert_eq!(report.missing_endpoints(), vec!["Bob".to_string()]);
        assert!(!report.is_complete());
        assert!(RelationshipMergeReport::default().is_complete());
    }

    #[test]
    fn test_missing_names_dedup() {
        let spec = GraphRelationshipSpec::new("KNOWS", "Eve", "Eve");
        assert_eq!(missing_names(&spec, false, false), vec!["Eve".to_string()]);
        let spec = GraphRelationshipSpec::new("KNOWS", "Eve", "Mallory");
        assert_eq!(
            missing_names(&spec, false, false),
            vec!["Eve".to_string(), "Mallory".to_string()]
        );
        assert_eq!(missing_names(&spec, true, false), vec!["Mallory".to_string()]);
    }

    #[test]
    fn test_outcome_serializes_with_status_tag() {
        let value = serde_json::to_value(RelationshipOutcome::MissingEndpoint {
            missing: vec!["QA".to_string()],
        })
        .unwrap();
        assert_eq!(value["status"], "missing_endpoint");
        assert_eq!(value["missing"][0], "QA");
    }
}
