//! Per-call routing decisions
//!
//! Plans are built fresh by the classifiers for every call and never mutated afterwards.

use serde::{Deserialize, Serialize};
use strata_common::models::{GraphEntitySpec, GraphQuery, GraphRelationshipSpec, RankingPolicy};

/// Where one piece of content goes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestPlan {
    pub store_in_vector: bool,
    pub store_in_graph: bool,
    pub graph_entities: Vec<GraphEntitySpec>,
    pub graph_relationships: Vec<GraphRelationshipSpec>,
    /// Rule that produced the graph artifacts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_rule: Option<String>,
}

impl IngestPlan {
    /// Nothing to store (blank content)
    pub fn empty() -> Self {
        Self::default()
    }

    /// Default plan for content no rule recognizes
    pub fn vector_only() -> Self {
        Self {
            store_in_vector: true,
            ..Self::default()
        }
    }

    pub fn requires_any(&self) -> bool {
        self.store_in_vector || self.store_in_graph
    }
}

/// Which stores to ask for one question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPlan {
    pub use_vector: bool,
    pub use_graph: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph_query: Option<GraphQuery>,
    pub vector_query_text: String,
    #[serde(default)]
    pub ranking: RankingPolicy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_rule: Option<String>,
}

impl QueryPlan {
    /// Nothing to ask (blank question)
    pub fn empty() -> Self {
        Self {
            use_vector: false,
            use_graph: false,
            graph_query: None,
            vector_query_text: String::new(),
            ranking: RankingPolicy::default(),
            matched_rule: None,
        }
    }

    /// Vector search only
    pub fn vector_only(text: impl Into<String>, ranking: RankingPolicy) -> Self {
        Self {
            use_vector: true,
            vector_query_text: text.into(),
            ranking,
            ..Self::empty()
        }
    }

    pub fn requires_any(&self) -> bool {
        self.use_vector || self.use_graph
    }
}
