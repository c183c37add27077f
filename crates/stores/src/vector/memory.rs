//! In-process vector store
//!
//! Exact search over every point in the collection. Vectors are normalized on write so a
//! query is one dot product per point.

use super::{check_collection_name, check_dimension, checked_norm, VectorStore};
use serde_json::{Map, Value};
use std::collections::HashMap;
use strata_common::errors::{AppError, Result};
use strata_common::models::{SearchHit, VectorRecord};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

struct StoredPoint {
    unit: Vec<f32>,
    payload: Map<String, Value>,
}

struct Collection {
    dimension: usize,
    points: HashMap<Uuid, StoredPoint>,
}

/// Vector store held in memory; contents are lost on restart
#[derive(Default)]
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn not_initialized(collection: &str) -> AppError {
    AppError::CollectionNotInitialized {
        collection: collection.to_string(),
    }
}

#[async_trait::async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn provision(&self, collection: &str, dimension: usize) -> Result<()> {
        check_collection_name(collection)?;
        if dimension == 0 {
            return Err(AppError::Validation {
                message: "collection dimension must be positive".to_string(),
                field: Some("dimension".to_string()),
            });
        }

        let mut collections = self.collections.write().await;
        match collections.get(collection) {
            Some(existing) if existing.dimension != dimension => {
                Err(AppError::DimensionMismatch {
                    expected: existing.dimension,
                    actual: dimension,
                })
            }
            Some(_) => Ok(()),
            None => {
                collections.insert(
                    collection.to_string(),
                    Collection {
                        dimension,
                        points: HashMap::new(),
                    },
                );
                debug!(collection, dimension, "Collection created");
                Ok(())
            }
        }
    }

    async fn upsert(&self, collection: &str, record: VectorRecord) -> Result<()> {
        let mut collections = self.collections.write().await;
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| not_initialized(collection))?;

        check_dimension(target.dimension, &record.vector)?;
        let norm = checked_norm(&record.vector)?;
        let unit = record.vector.iter().map(|v| v / norm).collect();

        target.points.insert(
            record.id,
            StoredPoint {
                unit,
                payload: record.payload,
            },
        );
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        let collections = self.collections.read().await;
        let target = collections
            .get(collection)
            .ok_or_else(|| not_initialized(collection))?;

        check_dimension(target.dimension, query)?;
        let norm = checked_norm(query)?;
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(f32, &Uuid, &StoredPoint)> = target
            .points
            .iter()
            .map(|(id, point)| {
                let dot: f32 = point.unit.iter().zip(query).map(|(a, b)| a * b).sum();
                ((dot / norm).clamp(-1.0, 1.0), id, point)
            })
            .collect();

        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(b.1)));
        scored.truncate(limit);

        Ok(scored
            .into_iter()
            .map(|(score, id, point)| SearchHit::vector(*id, score, point.payload.clone()))
            .collect())
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let collections = self.collections.read().await;
        collections
            .get(collection)
            .map(|c| c.points.len())
            .ok_or_else(|| not_initialized(collection))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use serde_json::json;
    use std::sync::Arc;

    fn payload(text: &str) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("content".to_string(), json!(text));
        map
    }

    async fn store_with(dimension: usize) -> InMemoryVectorStore {
        let store = InMemoryVectorStore::new();
        store.provision("docs", dimension).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_upsert_replaces_same_id() {
        let store = store_with(3).await;
        let id = Uuid::new_v4();
        store
            .upsert("docs", VectorRecord::new(id, vec![1.0, 0.0, 0.0], payload("first")))
            .await
            .unwrap();
        store
            .upsert("docs", VectorRecord::new(id, vec![0.0, 1.0, 0.0], payload("second")))
            .await
            .unwrap();

        assert_eq!(store.count("docs").await.unwrap(), 1);
        let hits = store.search("docs", &[0.0, 1.0, 0.0], 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].payload["content"], json!("second"));
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_search_orders_by_cosine() {
        let store = store_with(2).await;
        let near = Uuid::new_v4();
        let far = Uuid::new_v4();
        let opposite = Uuid::new_v4();
        store
            .upsert("docs", VectorRecord::new(far, vec![0.0, 5.0], payload("far")))
            .await
            .unwrap();
        store
            .upsert("docs", VectorRecord::new(near, vec![10.0, 1.0], payload("near")))
            .await
            .unwrap();
        store
            .upsert("docs", VectorRecord::new(opposite, vec![-1.0, 0.0], payload("opposite")))
            .await
            .unwrap();

        let hits = store.search("docs", &[1.0, 0.0], 10).await.unwrap();
        let ids: Vec<Uuid> = hits.iter().filter_map(|h| h.id).collect();
        assert_eq!(ids, vec![near, far, opposite]);
        assert!((hits[2].score + 1.0).abs() < 1e-6);

        let top = store.search("docs", &[1.0, 0.0], 1).await.unwrap();
        assert_eq!(top[0].id, Some(near));
    }

    #[tokio::test]
    async fn test_ties_break_by_id() {
        let store = store_with(2).await;
        let mut ids: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
        for id in &ids {
            store
                .upsert("docs", VectorRecord::new(*id, vec![1.0, 1.0], Map::new()))
                .await
                .unwrap();
        }
        ids.sort();
        let hits = store.search("docs", &[2.0, 2.0], 4).await.unwrap();
        let got: Vec<Uuid> = hits.iter().filter_map(|h| h.id).collect();
        assert_eq!(got, ids);
    }

    #[tokio::test]
    async fn test_dimension_mismatch() {
        let store = store_with(3).await;
        let err = store
            .upsert("docs", VectorRecord::new(Uuid::new_v4(), vec![1.0, 0.0], Map::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DimensionMismatch { expected: 3, actual: 2 }));

        let err = store.search("docs", &[1.0; 4], 3).await.unwrap_err();
        assert!(matches!(err, AppError::DimensionMismatch { expected: 3, actual: 4 }));

        let err = store.provision("docs", 5).await.unwrap_err();
        assert!(matches!(err, AppError::DimensionMismatch { expected: 3, actual: 5 }));
        // same dimension is a no-op
        assert!(store.provision("docs", 3).await.is_ok());
    }

    #[tokio::test]
    async fn test_unprovisioned_collection() {
        let store = InMemoryVectorStore::new();
        let err = store.search("missing", &[1.0], 3).await.unwrap_err();
        assert!(matches!(err, AppError::CollectionNotInitialized { .. }));
        assert!(!err.is_validation());
    }

    #[tokio::test]
    async fn test_rejects_zero_vector() {
        let store = store_with(2).await;
        let err = store
            .upsert("docs", VectorRecord::new(Uuid::new_v4(), vec![0.0, 0.0], Map::new()))
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(store.count("docs").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_upserts() {
        let store = Arc::new(store_with(8).await);
        let tasks = (0..32).map(|i| {
            let store = store.clone();
            async move {
                let vector: Vec<f32> = {
                    let mut rng = rand::thread_rng();
                    (0..8).map(|_| rng.gen_range(0.1..1.0)).collect()
                };
                let id = Uuid::from_u128(i as u128 % 16);
                store
                    .upsert("docs", VectorRecord::new(id, vector, Map::new()))
                    .await
            }
        });
        for result in futures::future::join_all(tasks).await {
            result.unwrap();
        }
        assert_eq!(store.count("docs").await.unwrap(), 16);
    }
}
