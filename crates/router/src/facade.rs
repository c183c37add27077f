//! Public entry point

use crate::classifier::{ContentClassifier, QueryClassifier};
use crate::coordinator::{
    CoordinatorSettings, IngestResult, IngestionCoordinator, QueryCoordinator, QueryResult,
};
use std::sync::Arc;
use strata_common::config::AppConfig;
use strata_common::embeddings::Embedder;
use strata_common::errors::{AppError, Result};
use strata_common::models::Content;
use strata_stores::{GraphStore, VectorStore};
use tracing::{info, instrument};

/// Classify, dispatch and merge in one call.
///
/// Built once from configuration and shared behind an `Arc`; every method takes `&self`.
pub struct HybridRouter {
    content_classifier: ContentClassifier,
    query_classifier: QueryClassifier,
    ingestion: IngestionCoordinator,
    queries: QueryCoordinator,
    vector: Arc<dyn VectorStore>,
    graph: Arc<dyn GraphStore>,
    collection: String,
    dimension: usize,
    max_text_bytes: usize,
}

impl HybridRouter {
    /// Compile the rule tables and wire the coordinators. Fails if a rule is invalid or the
    /// embedder's dimension differs from the configured collection dimension.
    pub fn new(
        config: &AppConfig,
        embedder: Arc<dyn Embedder>,
        vector: Arc<dyn VectorStore>,
        graph: Arc<dyn GraphStore>,
    ) -> Result<Self> {
        if embedder.dimension() != config.embedding.dimension {
            return Err(AppError::DimensionMismatch {
                expected: config.embedding.dimension,
                actual: embedder.dimension(),
            });
        }

        let content_classifier = ContentClassifier::new(&config.router.ingest_rules)?;
        let query_classifier =
            QueryClassifier::new(&config.router.query_rules, config.router.ranking)?;
        let settings = CoordinatorSettings::from_config(config);

        info!(
            ingest_rules = content_classifier.rule_count(),
            query_rules = query_classifier.rule_count(),
            vector_store = vector.name(),
            graph_store = graph.name(),
            embedder = embedder.model_name(),
            "Hybrid router initialized"
        );

        Ok(Self {
            content_classifier,
            query_classifier,
            ingestion: IngestionCoordinator::new(
                embedder.clone(),
                vector.clone(),
                graph.clone(),
                settings.clone(),
            ),
            queries: QueryCoordinator::new(embedder, vector.clone(), graph.clone(), settings),
            vector,
            graph,
            collection: config.vector.collection.clone(),
            dimension: config.embedding.dimension,
            max_text_bytes: config.server.max_text_bytes,
        })
    }

    /// Create the vector collection and the graph schema; idempotent
    pub async fn provision(&self) -> Result<()> {
        self.vector
            .provision(&self.collection, self.dimension)
            .await?;
        self.graph.provision().await?;
        info!(collection = %self.collection, dimension = self.dimension, "Stores provisioned");
        Ok(())
    }

    /// Store `content` in whichever stores its plan names
    #[instrument(skip_all, fields(bytes = content.text.len()))]
    pub async fn ingest(&self, content: Content) -> Result<IngestResult> {
        self.check_size(&content.text)?;
        let plan = self.content_classifier.classify(&content);
        self.ingestion.execute(plan, &content).await
    }

    /// Answer `question` from whichever stores its plan names
    #[instrument(skip_all, fields(bytes = question.len()))]
    pub async fn query(&self, question: &str) -> Result<QueryResult> {
        self.check_size(question)?;
        let plan = self.query_classifier.classify(question);
        self.queries.execute(plan).await
    }

    /// Backend names, for health output
    pub fn store_names(&self) -> (&'static str, &'static str) {
        (self.vector.name(), self.graph.name())
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn check_size(&self, text: &str) -> Result<()> {
        if text.len() > self.max_text_bytes {
            return Err(AppError::PayloadTooLarge {
                size: text.len(),
                limit: self.max_text_bytes,
            });
        }
        Ok(())
    }
}
