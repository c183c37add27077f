//! Strata Common Library
//!
//! Shared code for the Strata router and services including:
//! - Domain models (content, graph specs, vector records, search hits, graph queries)
//! - Identifier allow-listing for graph labels and relationship types
//! - Embedding client abstraction
//! - Error types and handling
//! - Configuration management
//! - Retry policy for transient store failures
//! - Metrics and observability
//! - PostgreSQL connection pool

pub mod config;
pub mod db;
pub mod embeddings;
pub mod errors;
pub mod identifier;
pub mod metrics;
pub mod models;
pub mod retry;

// Re-export commonly used types
pub use errors::{AppError, Result};
pub use config::AppConfig;
pub use db::DbPool;
pub use embeddings::Embedder;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default embedding model
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Default embedding dimension
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 768;

/// Default vector collection name
pub const DEFAULT_COLLECTION: &str = "hybrid_content";
