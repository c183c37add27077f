//! Ingestion fan-out

use super::{settle, Branch, BranchStatus, CoordinatorSettings};
use crate::plan::IngestPlan;
use serde::Serialize;
use std::sync::Arc;
use strata_common::embeddings::Embedder;
use strata_common::errors::{AppError, Result};
use strata_common::metrics;
use strata_common::models::{Content, VectorRecord};
use strata_stores::{EntityMergeReport, GraphStore, RelationshipMergeReport, VectorStore};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// What the graph branch wrote
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GraphMergeReport {
    pub entities: EntityMergeReport,
    pub relationships: RelationshipMergeReport,
}

/// Per-store outcome of one ingestion
#[derive(Debug, Clone, Serialize)]
pub struct IngestResult {
    pub plan: IngestPlan,
    pub vector: BranchStatus,
    pub graph: BranchStatus,
    /// Id the content is stored under in the vector collection
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector_record_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graph_report: Option<GraphMergeReport>,
    /// Relationships skipped because an endpoint node does not exist
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl IngestResult {
    /// Every required branch succeeded
    pub fn is_complete(&self) -> bool {
        !self.vector.is_failed() && !self.graph.is_failed()
    }

    /// One branch landed and the other did not. Nothing is rolled back; re-ingesting the same
    /// content repairs the missing side because both writes are idempotent.
    pub fn is_partial(&self) -> bool {
        (self.vector.is_succeeded() && self.graph.is_failed())
            || (self.graph.is_succeeded() && self.vector.is_failed())
    }

    fn outcome(&self) -> &'static str {
        if !self.plan.requires_any() {
            "skipped"
        } else if self.is_complete() {
            "complete"
        } else if self.is_partial() {
            "partial"
        } else {
            "failed"
        }
    }
}

/// Executes an [`IngestPlan`] against both stores concurrently
pub struct IngestionCoordinator {
    embedder: Arc<dyn Embedder>,
    vector: Arc<dyn VectorStore>,
    graph: Arc<dyn GraphStore>,
    settings: CoordinatorSettings,
}

impl IngestionCoordinator {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        vector: Arc<dyn VectorStore>,
        graph: Arc<dyn GraphStore>,
        settings: CoordinatorSettings,
    ) -> Self {
        Self {
            embedder,
            vector,
            graph,
            settings,
        }
    }

    /// Run the plan. Store failures and timeouts are reported per branch in the result;
    /// only validation-class errors are returned as `Err`.
    #[instrument(skip_all, fields(record_id = %content.record_id(), rule = plan.matched_rule.as_deref()))]
    pub async fn execute(&self, plan: IngestPlan, content: &Content) -> Result<IngestResult> {
        let record_id = content.record_id();
        debug!(
            vector = plan.store_in_vector,
            graph = plan.store_in_graph,
            entities = plan.graph_entities.len(),
            relationships = plan.graph_relationships.len(),
            "Ingest planned"
        );

        let vector_branch = async {
            if plan.store_in_vector {
                settle(
                    "ingest",
                    Branch::Vector,
                    self.settings.vector_timeout,
                    self.write_vector(content, record_id),
                )
                .await
            } else {
                Ok((BranchStatus::Skipped, None))
            }
        };

        let graph_branch = async {
            if plan.store_in_graph {
                settle(
                    "ingest",
                    Branch::Graph,
                    self.settings.graph_timeout,
                    self.write_graph(&plan),
                )
                .await
            } else {
                Ok((BranchStatus::Skipped, None))
            }
        };

        debug!("Ingest dispatching");
        let result = tokio::try_join!(vector_branch, graph_branch);
        let ((vector, written), (graph, graph_report)) = match result {
            Ok(settled) => settled,
            Err(e) => {
                metrics::record_ingest("rejected");
                return Err(e);
            }
        };

        let mut warnings = Vec::new();
        if let Some(report) = &graph_report {
            if !report.relationships.is_complete() {
                let missing = report.relationships.missing_endpoints().join(", ");
                warn!(%missing, "Relationships skipped for missing endpoints");
                warnings.push(format!("missing relationship endpoint(s): {}", missing));
            }
        }

        let result = IngestResult {
            plan,
            vector,
            graph,
            vector_record_id: written.map(|()| record_id),
            graph_report,
            warnings,
        };
        debug!(vector = ?result.vector, graph = ?result.graph, "Ingest settled");
        metrics::record_ingest(result.outcome());
        Ok(result)
    }

    async fn write_vector(&self, content: &Content, record_id: Uuid) -> Result<()> {
        let vector = self.embedder.embed(&content.text).await?;
        if vector.len() != self.settings.dimension {
            return Err(AppError::DimensionMismatch {
                expected: self.settings.dimension,
                actual: vector.len(),
            });
        }

        let record = VectorRecord::new(record_id, vector, content.to_payload());
        let collection = self.settings.collection.as_str();
        self.settings
            .retry
            .run("vector_upsert", || self.vector.upsert(collection, record.clone()))
            .await
    }

    async fn write_graph(&self, plan: &IngestPlan) -> Result<GraphMergeReport> {
        let entities = self
            .settings
            .retry
            .run("graph_merge_entities", || {
                self.graph.merge_entities(&plan.graph_entities)
            })
            .await?;

        let relationships = if plan.graph_relationships.is_empty() {
            RelationshipMergeReport::default()
        } else {
            self.settings
                .retry
                .run("graph_merge_relationships", || {
                    self.graph.merge_relationships(&plan.graph_relationships)
                })
                .await?
        };

        Ok(GraphMergeReport {
            entities,
            relationships,
        })
    }
}
