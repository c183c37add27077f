//! Database layer for Strata
//!
//! One PostgreSQL pool shared by both stores: the vector store talks SQLx directly (pgvector
//! binds), the graph store goes through a SeaORM connection wrapping the same pool.

use crate::config::DatabaseConfig;
use crate::errors::{AppError, Result};
use sea_orm::{ConnectionTrait, DatabaseConnection, SqlxPostgresConnector};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::info;

/// Database connection pool wrapper
#[derive(Clone)]
pub struct DbPool {
    pool: PgPool,
    connection: DatabaseConnection,
}

impl DbPool {
    /// Create a new database pool from configuration
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        info!("Connecting to database...");

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .connect(&config.url)
            .await
            .map_err(|e| AppError::DatabaseConnection {
                message: format!("Failed to connect: {}", e),
            })?;

        let connection = SqlxPostgresConnector::from_sqlx_postgres_pool(pool.clone());

        info!("Database connection established");

        Ok(Self { pool, connection })
    }

    /// Raw SQLx pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// SeaORM connection over the same pool
    pub fn connection(&self) -> &DatabaseConnection {
        &self.connection
    }

    /// Ping the database to check connectivity
    pub async fn ping(&self) -> Result<()> {
        self.connection
            .execute_unprepared("SELECT 1")
            .await
            .map_err(|e| AppError::DatabaseConnection {
                message: format!("Ping failed: {}", e),
            })?;
        Ok(())
    }

    /// Close all connections; called on shutdown
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Database connections closed");
    }
}
