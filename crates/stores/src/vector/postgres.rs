//! Vector similarity search using pgvector
//!
//! All collections share one `vector_points` table; `vector_collections` records each
//! collection's dimension so writes can be checked before they reach the index.

use super::{check_collection_name, check_dimension, checked_norm, VectorStore};
use pgvector::Vector;
use serde_json::{Map, Value};
use sqlx::postgres::PgPool;
use sqlx::types::Json;
use sqlx::Row;
use std::collections::HashMap;
use strata_common::errors::{AppError, Result};
use strata_common::models::{SearchHit, VectorRecord};
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

const STORE: &str = "vector";

const SCHEMA: &[&str] = &[
    "CREATE EXTENSION IF NOT EXISTS vector",
    r#"
    CREATE TABLE IF NOT EXISTS vector_collections (
        name TEXT PRIMARY KEY,
        dimension INTEGER NOT NULL CHECK (dimension > 0),
        metric TEXT NOT NULL DEFAULT 'cosine',
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS vector_points (
        collection TEXT NOT NULL REFERENCES vector_collections(name) ON DELETE CASCADE,
        id UUID NOT NULL,
        embedding vector NOT NULL,
        payload JSONB NOT NULL DEFAULT '{}'::jsonb,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        PRIMARY KEY (collection, id)
    )
    "#,
];

const UPSERT_SQL: &str = r#"
    INSERT INTO vector_points (collection, id, embedding, payload, updated_at)
    VALUES ($1, $2, $3, $4, NOW())
    ON CONFLICT (collection, id) DO UPDATE
    SET embedding = EXCLUDED.embedding,
        payload = EXCLUDED.payload,
        updated_at = NOW()
"#;

const SEARCH_SQL: &str = r#"
    SELECT id, payload, (1 - (embedding <=> $2))::float4 AS score
    FROM vector_points
    WHERE collection = $1
    ORDER BY embedding <=> $2, id
    LIMIT $3
"#;

/// Vector store backed by PostgreSQL + pgvector
pub struct PgVectorStore {
    pool: PgPool,
    /// Dimensions of collections already seen, so writes skip the lookup
    dimensions: RwLock<HashMap<String, usize>>,
}

impl PgVectorStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            dimensions: RwLock::new(HashMap::new()),
        }
    }

    async fn dimension_of(&self, collection: &str) -> Result<usize> {
        if let Some(dimension) = self.dimensions.read().await.get(collection) {
            return Ok(*dimension);
        }

        let row = sqlx::query("SELECT dimension FROM vector_collections WHERE name = $1")
            .bind(collection)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::from_sqlx(STORE, e))?
            .ok_or_else(|| AppError::CollectionNotInitialized {
                collection: collection.to_string(),
            })?;

        let dimension: i32 = row
            .try_get("dimension")
            .map_err(|e| AppError::from_sqlx(STORE, e))?;
        let dimension = dimension as usize;
        self.dimensions
            .write()
            .await
            .insert(collection.to_string(), dimension);
        Ok(dimension)
    }
}

#[async_trait::async_trait]
impl VectorStore for PgVectorStore {
    async fn provision(&self, collection: &str, dimension: usize) -> Result<()> {
        check_collection_name(collection)?;

        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| AppError::from_sqlx(STORE, e))?;
        }

        sqlx::query(
            "INSERT INTO vector_collections (name, dimension) VALUES ($1, $2) ON CONFLICT (name) DO NOTHING",
        )
        .bind(collection)
        .bind(dimension as i32)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::from_sqlx(STORE, e))?;

        self.dimensions.write().await.remove(collection);
        let existing = self.dimension_of(collection).await?;
        if existing != dimension {
            return Err(AppError::DimensionMismatch {
                expected: existing,
                actual: dimension,
            });
        }

        info!(collection, dimension, "Vector collection ready");
        Ok(())
    }

    async fn upsert(&self, collection: &str, record: VectorRecord) -> Result<()> {
        let dimension = self.dimension_of(collection).await?;
        check_dimension(dimension, &record.vector)?;
        checked_norm(&record.vector)?;

        sqlx::query(UPSERT_SQL)
            .bind(collection)
            .bind(record.id)
            .bind(Vector::from(record.vector))
            .bind(Json(&record.payload))
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::from_sqlx(STORE, e))?;

        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        let dimension = self.dimension_of(collection).await?;
        check_dimension(dimension, query)?;
        checked_norm(query)?;
        if limit == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(SEARCH_SQL)
            .bind(collection)
            .bind(Vector::from(query.to_vec()))
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::from_sqlx(STORE, e))?;

        rows.iter()
            .map(|row| {
                let id: Uuid = row.try_get("id").map_err(|e| AppError::from_sqlx(STORE, e))?;
                let Json(payload): Json<Map<String, Value>> = row
                    .try_get("payload")
                    .map_err(|e| AppError::from_sqlx(STORE, e))?;
                let score: f32 = row
                    .try_get("score")
                    .map_err(|e| AppError::from_sqlx(STORE, e))?;
                Ok(SearchHit::vector(id, score, payload))
            })
            .collect()
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        self.dimension_of(collection).await?;
        let row = sqlx::query("SELECT COUNT(*) AS total FROM vector_points WHERE collection = $1")
            .bind(collection)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::from_sqlx(STORE, e))?;
        let total: i64 = row
            .try_get("total")
            .map_err(|e| AppError::from_sqlx(STORE, e))?;
        Ok(total as usize)
    }

    fn name(&self) -> &'static str {
        "pgvector"
    }
}
