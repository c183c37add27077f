//! Vector index abstraction
//!
//! A collection holds fixed-dimension vectors keyed by UUID. Similarity is cosine; scores are
//! in `[-1, 1]` and higher is more similar.

mod memory;
mod postgres;

pub use memory::InMemoryVectorStore;
pub use postgres::PgVectorStore;

use strata_common::errors::{AppError, Result};
use strata_common::models::{SearchHit, VectorRecord};

/// Common trait for vector backends
#[async_trait::async_trait]
pub trait VectorStore: Send + Sync {
    /// Create `collection` with `dimension`. Idempotent for the same dimension;
    /// a different dimension for an existing collection is a `DimensionMismatch`.
    async fn provision(&self, collection: &str, dimension: usize) -> Result<()>;

    /// Insert or replace the record with `record.id`
    async fn upsert(&self, collection: &str, record: VectorRecord) -> Result<()>;

    /// Top `limit` records by cosine similarity, best first; ties broken by id
    async fn search(&self, collection: &str, query: &[f32], limit: usize)
        -> Result<Vec<SearchHit>>;

    /// Number of records in `collection`
    async fn count(&self, collection: &str) -> Result<usize>;

    /// Backend name for logs and health output
    fn name(&self) -> &'static str;
}

pub(crate) fn check_collection_name(collection: &str) -> Result<()> {
    if collection.trim().is_empty() {
        return Err(AppError::Validation {
            message: "collection name must not be empty".to_string(),
            field: Some("collection".to_string()),
        });
    }
    Ok(())
}

pub(crate) fn check_dimension(expected: usize, vector: &[f32]) -> Result<()> {
    if vector.len() != expected {
        return Err(AppError::DimensionMismatch {
            expected,
            actual: vector.len(),
        });
    }
    Ok(())
}

/// L2 norm; rejects vectors cosine similarity is undefined for
pub(crate) fn checked_norm(vector: &[f32]) -> Result<f32> {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 || !norm.is_finite() {
        return Err(AppError::Validation {
            message: "vector must have a non-zero, finite norm".to_string(),
            field: Some("vector".to_string()),
        });
    }
    Ok(norm)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checked_norm() {
        assert!((checked_norm(&[3.0, 4.0]).unwrap() - 5.0).abs() < f32::EPSILON);
        assert!(checked_norm(&[0.0, 0.0]).is_err());
        assert!(checked_norm(&[f32::NAN, 1.0]).is_err());
    }

    #[test]
    fn test_check_dimension() {
        assert!(check_dimension(3, &[1.0, 0.0, 0.0]).is_ok());
        assert!(matches!(
            check_dimension(3, &[1.0, 0.0]),
            Err(AppError::DimensionMismatch {
                expected: 3,
                actual: 2
            })
        ));
    }
}
