//! Strata stores
//!
//! Two retrieval backends behind narrow async traits:
//! - [`VectorStore`]: cosine nearest-neighbour search over named collections
//! - [`GraphStore`]: labeled property graph with idempotent merges and path queries
//!
//! Each has an in-process implementation and a PostgreSQL one (pgvector for vectors,
//! node/edge tables for the graph).

pub mod graph;
pub mod vector;

pub use graph::{
    EntityMergeReport, GraphStore, InMemoryGraphStore, PgGraphStore, RelationshipMergeReport,
    RelationshipOutcome,
};
pub use vector::{InMemoryVectorStore, PgVectorStore, VectorStore};
