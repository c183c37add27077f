//! Vector records and search hits

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// A vector with its payload, unique per id within a collection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: Uuid,
    pub vector: Vec<f32>,
    #[serde(default)]
    pub payload: Map<String, Value>,
}

impl VectorRecord {
    pub fn new(id: Uuid, vector: Vec<f32>, payload: Map<String, Value>) -> Self {
        Self {
            id,
            vector,
            payload,
        }
    }

    pub fn dimension(&self) -> usize {
        self.vector.len()
    }
}

/// Which backend produced a hit
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HitSource {
    /// Approximate similarity match
    Vector,
    /// Exact structural match
    Graph,
}

/// One ranked result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    /// Relevance score, comparable within a source
    pub score: f32,

    /// Vector payload or graph row
    pub payload: Map<String, Value>,

    /// Origin of this hit
    pub source: HitSource,

    /// Vector record id (vector hits only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
}

impl SearchHit {
    pub fn vector(id: Uuid, score: f32, payload: Map<String, Value>) -> Self {
        Self {
            score,
            payload,
            source: HitSource::Vector,
            id: Some(id),
        }
    }

    pub fn graph(score: f32, row: Map<String, Value>) -> Self {
        Self {
            score,
            payload: row,
            source: HitSource::Graph,
            id: None,
        }
    }
}

/// How graph and vector hits are combined into one list
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RankingPolicy {
    /// Graph hits first in their native order, then vector hits by score
    #[default]
    GraphFirst,
    /// Graph hits take a configured score and everything is sorted together
    Blended,
}
