//! Strata hybrid retrieval router
//!
//! Decides per piece of content which stores should hold it and per question which stores to
//! ask, runs the store calls concurrently and merges the answers:
//!
//! ```text
//! ingest: Content  -> ContentClassifier -> IngestPlan -> IngestionCoordinator -> IngestResult
//! query:  question -> QueryClassifier   -> QueryPlan  -> QueryCoordinator     -> QueryResult
//! ```
//!
//! [`HybridRouter`] is the only entry point most callers need.

pub mod classifier;
pub mod coordinator;
pub mod facade;
pub mod merger;
pub mod plan;

#[cfg(test)]
pub(crate) mod testing;

pub use classifier::{ContentClassifier, QueryClassifier};
pub use coordinator::{
    BranchStatus, CoordinatorSettings, GraphMergeReport, IngestResult, IngestionCoordinator,
    QueryCoordinator, QueryResult,
};
pub use facade::HybridRouter;
pub use merger::{ResultMerger, GRAPH_SENTINEL_SCORE};
pub use plan::{IngestPlan, QueryPlan};
