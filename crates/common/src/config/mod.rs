//! Configuration management for Strata services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default, config/{APP_ENV}, config/local)
//! - Default values
//!
//! Everything the router needs (rule tables, timeouts, retry ceilings, ranking) is read once
//! here and handed to the router at construction. Nothing is mutated afterwards.

use crate::models::{GraphQuery, NodePattern, RankingPolicy};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration (postgres backend only)
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Embedding service configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Vector collection configuration
    #[serde(default)]
    pub vector: VectorConfig,

    /// Graph store configuration
    #[serde(default)]
    pub graph: GraphConfig,

    /// Routing rules, timeouts and retries
    #[serde(default)]
    pub router: RouterConfig,

    /// Which store implementations to run
    #[serde(default)]
    pub storage: StorageConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Shutdown timeout in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Largest accepted content body in bytes
    #[serde(default = "default_max_text_bytes")]
    pub max_text_bytes: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// PostgreSQL URL
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// Embedding provider: openai, hashing
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// API key for embedding service
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model to use
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension; must match the vector collection
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Request timeout in seconds
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries
    #[serde(default = "default_embedding_retries")]
    pub max_retries: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VectorConfig {
    /// Collection every record is written to
    #[serde(default = "default_collection")]
    pub collection: String,

    /// Nearest neighbours fetched per query
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GraphConfig {
    /// Row cap applied to graph queries that carry no limit of their own
    #[serde(default = "default_graph_max_rows")]
    pub max_rows: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouterConfig {
    /// Ingest rules, evaluated in order; first match wins
    #[serde(default = "default_ingest_rules")]
    pub ingest_rules: Vec<IngestRuleConfig>,

    /// Query rules, evaluated in order; first match wins
    #[serde(default = "default_query_rules")]
    pub query_rules: Vec<QueryRuleConfig>,

    /// Per-branch timeout for vector operations
    #[serde(default = "default_branch_timeout_ms")]
    pub vector_timeout_ms: u64,

    /// Per-branch timeout for graph operations
    #[serde(default = "default_branch_timeout_ms")]
    pub graph_timeout_ms: u64,

    /// Retry policy for transient store failures
    #[serde(default)]
    pub retry: RetryConfig,

    /// Default ranking when a query rule does not choose one
    #[serde(default)]
    pub ranking: RankingPolicy,

    /// Score given to graph hits under blended ranking
    #[serde(default = "default_graph_score")]
    pub graph_score: f32,

    /// Create the collection and graph schema when the gateway starts
    #[serde(default = "default_provision_on_startup")]
    pub provision_on_startup: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    /// Total attempts including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub multiplier: f64,
}

/// One content rule: regex pattern plus the graph artifacts it extracts
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct IngestRuleConfig {
    pub name: String,
    pub pattern: String,
    #[serde(default)]
    pub entities: Vec<EntityTemplate>,
    #[serde(default)]
    pub relationships: Vec<RelationshipTemplate>,
}

/// Entity produced by a rule; `name` and string property values may hold `{group}` placeholders
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EntityTemplate {
    pub label: String,
    pub name: String,
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
}

/// Relationship produced by a rule; `from` / `to` may hold `{group}` placeholders
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RelationshipTemplate {
    #[serde(rename = "type")]
    pub rel_type: String,
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
}

/// One question rule: intent pattern plus the graph query it runs
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct QueryRuleConfig {
    pub name: String,
    pub pattern: String,
    pub query: GraphQuery,
    /// Query parameter → capture group of `pattern`
    #[serde(default)]
    pub bind: BTreeMap<String, String>,
    #[serde(default)]
    pub ranking: Option<RankingPolicy>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// In-process stores, nothing persisted
    #[default]
    Memory,
    /// PostgreSQL with pgvector
    Postgres,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log filter directive (e.g. "info", "strata_router=debug")
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for logs
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 30 }
fn default_shutdown_timeout() -> u64 { 30 }
fn default_max_text_bytes() -> usize { 64 * 1024 }
fn default_database_url() -> String { "postgres://localhost/strata".to_string() }
fn default_max_connections() -> u32 { 20 }
fn default_min_connections() -> u32 { 2 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_embedding_provider() -> String { "hashing".to_string() }
fn default_embedding_model() -> String { crate::DEFAULT_EMBEDDING_MODEL.to_string() }
fn default_embedding_dimension() -> usize { crate::DEFAULT_EMBEDDING_DIMENSION }
fn default_embedding_timeout() -> u64 { 30 }
fn default_embedding_retries() -> u32 { 3 }
fn default_collection() -> String { crate::DEFAULT_COLLECTION.to_string() }
fn default_search_limit() -> usize { 3 }
fn default_graph_max_rows() -> usize { 100 }
fn default_branch_timeout_ms() -> u64 { 2_000 }
fn default_graph_score() -> f32 { 0.75 }
fn default_provision_on_startup() -> bool { true }
fn default_max_attempts() -> u32 { 3 }
fn default_initial_backoff_ms() -> u64 { 50 }
fn default_max_backoff_ms() -> u64 { 2_000 }
fn default_backoff_multiplier() -> f64 { 2.0 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "strata".to_string() }

/// The rule shipped with the router: "<Person> works in <Department>"
pub fn default_ingest_rules() -> Vec<IngestRuleConfig> {
    vec![IngestRuleConfig {
        name: "works_in".to_string(),
        pattern: r"(?i)\b(?P<person>[a-z][\w'-]*)\s+works\s+in\s+(?:the\s+)?(?P<department>[a-z0-9][\w&-]*)"
            .to_string(),
        entities: vec![
            EntityTemplate {
                label: "Person".to_string(),
                name: "{person}".to_string(),
                properties: BTreeMap::new(),
            },
            EntityTemplate {
                label: "Department".to_string(),
                name: "{department}".to_string(),
                properties: BTreeMap::new(),
            },
        ],
        relationships: vec![RelationshipTemplate {
            rel_type: "WORKS_IN".to_string(),
            from: "{person}".to_string(),
            to: "{department}".to_string(),
            properties: BTreeMap::new(),
        }],
    }]
}

/// The question rule shipped with the router: people-to-department lookups
pub fn default_query_rules() -> Vec<QueryRuleConfig> {
    vec![QueryRuleConfig {
        name: "works_in_lookup".to_string(),
        pattern: r"(?i)\b(who|relationship|works)\b".to_string(),
        query: GraphQuery::matching(NodePattern::labeled("p", "Person"))
            .hop("WORKS_IN", NodePattern::labeled("d", "Department"))
            .returning("p", "name", "person")
            .returning("d", "name", "department")
            .order_by("person")
            .order_by("department"),
        bind: BTreeMap::new(),
        ranking: None,
    }]
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            max_text_bytes: default_max_text_bytes(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout(),
            idle_timeout_secs: default_idle_timeout(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            api_key: None,
            api_base: None,
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            timeout_secs: default_embedding_timeout(),
            max_retries: default_embedding_retries(),
        }
    }
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            collection: default_collection(),
            search_limit: default_search_limit(),
        }
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            max_rows: default_graph_max_rows(),
        }
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            ingest_rules: default_ingest_rules(),
            query_rules: default_query_rules(),
            vector_timeout_ms: default_branch_timeout_ms(),
            graph_timeout_ms: default_branch_timeout_ms(),
            retry: RetryConfig::default(),
            ranking: RankingPolicy::default(),
            graph_score: default_graph_score(),
            provision_on_startup: default_provision_on_startup(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            multiplier: default_backoff_multiplier(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}

impl RouterConfig {
    pub fn vector_timeout(&self) -> Duration {
        Duration::from_millis(self.vector_timeout_ms)
    }

    pub fn graph_timeout(&self) -> Duration {
        Duration::from_millis(self.graph_timeout_ms)
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables with APP__ prefix
            // e.g., APP__SERVER__PORT=8081
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific configuration file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }

    /// Address for the Prometheus listener, `None` when `metrics_port` is 0
    pub fn metrics_addr(&self) -> Option<SocketAddr> {
        match self.observability.metrics_port {
            0 => None,
            port => Some(SocketAddr::from(([0, 0, 0, 0], port))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.embedding.dimension, 768);
        assert_eq!(config.vector.collection, "hybrid_content");
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.router.ranking, RankingPolicy::GraphFirst);
    }

    #[test]
    fn test_metrics_port_zero_disables_listener() {
        let mut config = AppConfig::default();
        config.observability.metrics_port = 9464;
        assert_eq!(config.metrics_addr().map(|a| a.port()), Some(9464));

        config.observability.metrics_port = 0;
        assert!(config.metrics_addr().is_none());
    }

    #[test]
    fn test_default_rules() {
        let config = RouterConfig::default();
        assert_eq!(config.ingest_rules.len(), 1);
        assert_eq!(config.ingest_rules[0].relationships[0].rel_type, "WORKS_IN");
        assert_eq!(config.query_rules.len(), 1);
        assert!(config.query_rules[0].query.validate().is_ok());
        assert_eq!(config.graph_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn test_rules_deserialize_from_json() {
        let raw = serde_json::json!({
            "ingest_rules": [{
                "name": "uses",
                "pattern": "(?P<who>\\w+) uses (?P<tool>\\w+)",
                "entities": [
                    {"label": "Person", "name": "{who}"},
                    {"label": "Tool", "name": "{tool}"}
                ],
                "relationships": [
                    {"type": "USES", "from": "{who}", "to": "{tool}", "properties": {"frequency": "daily"}}
                ]
            }],
            "ranking": "blended"
        });
        let config: RouterConfig = serde_json::from_value(raw).unwrap();
        assert_eq!(config.ingest_rules[0].entities[1].label, "Tool");
        assert_eq!(config.ranking, RankingPolicy::Blended);
        // unspecified sections keep their defaults
        assert_eq!(config.query_rules, default_query_rules());
        assert_eq!(config.retry.max_attempts, 3);
    }
}
