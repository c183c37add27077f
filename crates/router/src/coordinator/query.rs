//! Query fan-out and merge

use super::{settle, Branch, BranchStatus, CoordinatorSettings};
use crate::merger::ResultMerger;
use crate::plan::QueryPlan;
use serde::Serialize;
use std::sync::Arc;
use strata_common::embeddings::Embedder;
use strata_common::errors::{AppError, Result};
use strata_common::metrics;
use strata_common::models::{GraphRow, SearchHit};
use strata_stores::{GraphStore, VectorStore};
use tracing::{debug, instrument};

/// Ranked answer to one question
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub plan: QueryPlan,
    pub hits: Vec<SearchHit>,
    pub vector: BranchStatus,
    pub graph: BranchStatus,
    /// A requested source failed; `hits` holds what the other one returned
    pub degraded: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Executes a [`QueryPlan`] against both stores concurrently and merges the answers
pub struct QueryCoordinator {
    embedder: Arc<dyn Embedder>,
    vector: Arc<dyn VectorStore>,
    graph: Arc<dyn GraphStore>,
    settings: CoordinatorSettings,
    merger: ResultMerger,
}

impl QueryCoordinator {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        vector: Arc<dyn VectorStore>,
        graph: Arc<dyn GraphStore>,
        settings: CoordinatorSettings,
    ) -> Self {
        let merger = ResultMerger::new(settings.graph_score);
        Self {
            embedder,
            vector,
            graph,
            settings,
            merger,
        }
    }

    /// Run the plan. A failed branch degrades the result; `NoSourceSucceeded` only when
    /// every requested branch failed.
    #[instrument(skip_all, fields(rule = plan.matched_rule.as_deref()))]
    pub async fn execute(&self, plan: QueryPlan) -> Result<QueryResult> {
        debug!(vector = plan.use_vector, graph = plan.use_graph, "Query planned");

        let vector_branch = async {
            if plan.use_vector {
                settle(
                    "query",
                    Branch::Vector,
                    self.settings.vector_timeout,
                    self.search_vector(&plan.vector_query_text),
                )
                .await
            } else {
                Ok((BranchStatus::Skipped, None))
            }
        };

        let graph_branch = async {
            if plan.use_graph {
                settle(
                    "query",
                    Branch::Graph,
                    self.settings.graph_timeout,
                    self.search_graph(&plan),
                )
                .await
            } else {
                Ok((BranchStatus::Skipped, None))
            }
        };

        debug!("Query dispatching");
        let ((vector, vector_hits), (graph, graph_rows)) =
            match tokio::try_join!(vector_branch, graph_branch) {
                Ok(settled) => settled,
                Err(e) => {
                    metrics::record_query("rejected", false, 0);
                    return Err(e);
                }
            };
        debug!(vector = ?vector, graph = ?graph, "Query settled");

        let warnings: Vec<String> = [(Branch::Vector, &vector), (Branch::Graph, &graph)]
            .into_iter()
            .filter_map(|(branch, status)| match status {
                BranchStatus::Failed { reason, .. } => {
                    Some(format!("{} search failed: {}", branch.as_str(), reason))
                }
                _ => None,
            })
            .collect();

        if plan.requires_any() && !vector.is_succeeded() && !graph.is_succeeded() {
            metrics::record_query("failed", true, 0);
            return Err(AppError::NoSourceSucceeded {
                details: warnings.join("; "),
            });
        }

        let hits = self.merger.merge(
            graph_rows.unwrap_or_default(),
            vector_hits.unwrap_or_default(),
            plan.ranking,
        );
        let degraded = vector.is_failed() || graph.is_failed();
        metrics::record_query(
            if plan.requires_any() { "answered" } else { "skipped" },
            degraded,
            hits.len(),
        );

        Ok(QueryResult {
            plan,
            hits,
            vector,
            graph,
            degraded,
            warnings,
        })
    }

    async fn search_vector(&self, text: &str) -> Result<Vec<SearchHit>> {
        let embedding = self.embedder.embed(text).await?;
        if embedding.len() != self.settings.dimension {
            return Err(AppError::DimensionMismatch {
                expected: self.settings.dimension,
                actual: embedding.len(),
            });
        }

        let collection = self.settings.collection.as_str();
        let limit = self.settings.search_limit;
        self.settings
            .retry
            .run("vector_search", || {
                self.vector.search(collection, &embedding, limit)
            })
            .await
    }

    async fn search_graph(&self, plan: &QueryPlan) -> Result<Vec<GraphRow>> {
        let mut query = plan
            .graph_query
            .clone()
            .ok_or_else(|| AppError::MalformedQuery {
                message: "graph search requested without a graph query".to_string(),
            })?;
        let cap = self.settings.graph_max_rows;
        query.limit = Some(query.limit.map_or(cap, |limit| limit.min(cap)));

        self.settings
            .retry
            .run("graph_query", || self.graph.query(&query))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        embedder, provisioned, settings, Fault, FaultyGraphStore, FaultyVectorStore, COLLECTION,
    };
    use serde_json::json;
    use std::time::Duration;
    use strata_common::models::{
        Content, GraphEntitySpec, GraphQuery, GraphRelationshipSpec, HitSource, NodePattern,
        RankingPolicy, VectorRecord,
    };

    fn works_in_query() -> GraphQuery {
        GraphQuery::matching(NodePattern::labeled("p", "Person"))
            .hop("WORKS_IN", NodePattern::labeled("d", "Department"))
            .returning("p", "name", "person")
            .returning("d", "name", "department")
            .order_by("person")
    }

    fn hybrid_plan(question: &str) -> QueryPlan {
        QueryPlan {
            use_vector: true,
            use_graph: true,
            graph_query: Some(works_in_query()),
            vector_query_text: question.to_string(),
            ranking: RankingPolicy::GraphFirst,
            matched_rule: Some("works_in_lookup".to_string()),
        }
    }

    /// Two people in the graph, three documents in the vector collection. Seeding goes to the
    /// inner stores so faults only apply to the coordinator's calls.
    async fn seeded(
        vector_fault: Fault,
        graph_fault: Fault,
    ) -> (QueryCoordinator, Arc<FaultyVectorStore>, Arc<FaultyGraphStore>) {
        let (vector, graph) = provisioned(vector_fault, graph_fault).await;

        let embedder = embedder();
        for text in [
            "Alice works in QA",
            "Bob works in Platform",
            "quarterly revenue report",
        ] {
            let content = Content::new(text);
            let embedding = embedder.embed(text).await.unwrap();
            vector
                .inner
                .upsert(
                    COLLECTION,
                    VectorRecord::new(content.record_id(), embedding, content.to_payload()),
                )
                .await
                .unwrap();
        }

        graph
            .inner
            .merge_entities(&[
                GraphEntitySpec::new("Person", "Alice"),
                GraphEntitySpec::new("Department", "QA"),
                GraphEntitySpec::new("Person", "Bob"),
                GraphEntitySpec::new("Department", "Platform"),
            ])
            .await
            .unwrap();
        graph
            .inner
            .merge_relationships(&[
                GraphRelationshipSpec::new("WORKS_IN", "Alice", "QA"),
                GraphRelationshipSpec::new("WORKS_IN", "Bob", "Platform"),
            ])
            .await
            .unwrap();

        let coordinator =
            QueryCoordinator::new(embedder, vector.clone(), graph.clone(), settings());
        (coordinator, vector, graph)
    }

    #[tokio::test]
    async fn test_hybrid_query_merges_both_sources() {
        let (coordinator, _, _) = seeded(Fault::None, Fault::None).await;
        let result = coordinator
            .execute(hybrid_plan("Who works in which department?"))
            .await
            .unwrap();

        assert!(!result.degraded);
        assert!(result.warnings.is_empty());
        assert_eq!(result.hits.len(), 5);
        assert_eq!(result.hits[0].source, HitSource::Graph);
        assert_eq!(result.hits[0].payload["person"], json!("Alice"));
        assert_eq!(result.hits[0].payload["department"], json!("QA"));
        assert_eq!(result.hits[1].payload["person"], json!("Bob"));
        assert!(result.hits[2..].iter().all(|h| h.source == HitSource::Vector));
        assert!(result.hits[2].score >= result.hits[3].score);
    }

    #[tokio::test]
    async fn test_graph_failure_degrades() {
        let (coordinator, _, _) = seeded(Fault::None, Fault::Unavailable).await;
        let result = coordinator
            .execute(hybrid_plan("Who works in which department?"))
            .await
            .unwrap();

        assert!(result.degraded);
        assert!(result.graph.is_failed());
        assert_eq!(result.hits.len(), 3);
        assert!(result.hits.iter().all(|h| h.source == HitSource::Vector));
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].starts_with("graph search failed"));
    }

    #[tokio::test]
    async fn test_slow_graph_degrades_to_vector_hits() {
        let (coordinator, _, _) = seeded(Fault::None, Fault::Hang(Duration::from_secs(5))).await;
        let result = coordinator
            .execute(hybrid_plan("Who works in which department?"))
            .await
            .unwrap();
        assert!(matches!(
            result.graph,
            BranchStatus::Failed {
                timed_out: true,
                ..
            }
        ));
        assert!(result.degraded);
        assert!(!result.hits.is_empty());
    }

    #[tokio::test]
    async fn test_all_sources_failed() {
        let (coordinator, _, _) = seeded(Fault::Unavailable, Fault::Unavailable).await;
        let result = coordinator
            .execute(hybrid_plan("Who works in which department?"))
            .await;
        match result {
            Err(AppError::NoSourceSucceeded { details }) => {
                assert!(details.contains("vector search failed"));
                assert!(details.contains("graph search failed"));
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_vector_only_plan() {
        let (coordinator, _, graph) = seeded(Fault::None, Fault::None).await;
        let result = coordinator
            .execute(QueryPlan::vector_only(
                "revenue report",
                RankingPolicy::GraphFirst,
            ))
            .await
            .unwrap();
        assert!(result.graph.is_skipped());
        assert!(!result.degraded);
        assert_eq!(result.hits.len(), 3);
        assert_eq!(graph.calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_plan_returns_empty_result() {
        let (coordinator, vector, graph) = seeded(Fault::Unavailable, Fault::Unavailable).await;
        let result = coordinator.execute(QueryPlan::empty()).await.unwrap();
        assert!(result.hits.is_empty());
        assert!(!result.degraded);
        assert_eq!(vector.calls() + graph.calls(), 0);
    }

    #[tokio::test]
    async fn test_graph_rows_capped() {
        let (_, vector, graph) = seeded(Fault::None, Fault::None).await;
        let mut capped = settings();
        capped.graph_max_rows = 1;
        let coordinator = QueryCoordinator::new(embedder(), vector, graph, capped);

        let mut plan = hybrid_plan("Who works in which department?");
        plan.use_vector = false;
        let result = coordinator.execute(plan).await.unwrap();
        assert_eq!(result.hits.len(), 1);
        assert_eq!(result.hits[0].payload["person"], json!("Alice"));
    }

    #[tokio::test]
    async fn test_graph_plan_without_query_is_rejected() {
        let (coordinator, _, _) = seeded(Fault::None, Fault::None).await;
        let mut plan = hybrid_plan("who");
        plan.graph_query = None;
        assert!(matches!(
            coordinator.execute(plan).await,
            Err(AppError::MalformedQuery { .. })
        ));
    }
}
