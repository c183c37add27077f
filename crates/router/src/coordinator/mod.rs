//! Plan execution
//!
//! Both coordinators fan out into at most two concurrent branches (vector, graph). A branch
//! runs under its own timeout with transient failures retried inside it, then settles to a
//! [`BranchStatus`]. Validation-class errors are the only ones that escape a branch.

mod ingest;
mod query;

pub use ingest::{GraphMergeReport, IngestResult, IngestionCoordinator};
pub use query::{QueryCoordinator, QueryResult};

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use strata_common::config::AppConfig;
use strata_common::errors::Result;
use strata_common::metrics::BranchTimer;
use strata_common::retry::RetryPolicy;
use tracing::warn;

/// Everything the coordinators read from configuration
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub collection: String,
    /// Embedding width every vector must have
    pub dimension: usize,
    pub search_limit: usize,
    /// Row cap for graph queries without their own limit
    pub graph_max_rows: usize,
    pub vector_timeout: Duration,
    pub graph_timeout: Duration,
    pub retry: RetryPolicy,
    /// Graph hit score under blended ranking
    pub graph_score: f32,
}

impl CoordinatorSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            collection: config.vector.collection.clone(),
            dimension: config.embedding.dimension,
            search_limit: config.vector.search_limit,
            graph_max_rows: config.graph.max_rows.max(1),
            vector_timeout: config.router.vector_timeout(),
            graph_timeout: config.router.graph_timeout(),
            retry: RetryPolicy::from(&config.router.retry),
            graph_score: config.router.graph_score,
        }
    }
}

/// Outcome of one store branch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BranchStatus {
    Succeeded,
    /// The plan did not require this store
    Skipped,
    Failed {
        reason: String,
        /// Outcome unknown; the write may or may not have landed
        timed_out: bool,
        /// Worth retrying the whole call
        retryable: bool,
    },
}

impl BranchStatus {
    pub fn is_succeeded(&self) -> bool {
        matches!(self, BranchStatus::Succeeded)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, BranchStatus::Failed { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, BranchStatus::Skipped)
    }
}

/// Which store a branch talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Branch {
    Vector,
    Graph,
}

impl Branch {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Branch::Vector => "vector",
            Branch::Graph => "graph",
        }
    }
}

/// Drive one branch to a status.
///
/// `Ok((Succeeded, Some(value)))` on success, `Ok((Failed { .. }, None))` for store failures
/// and timeouts, `Err` only for validation-class errors.
pub(crate) async fn settle<T, Fut>(
    operation: &'static str,
    branch: Branch,
    timeout: Duration,
    work: Fut,
) -> Result<(BranchStatus, Option<T>)>
where
    Fut: Future<Output = Result<T>>,
{
    let timer = BranchTimer::start(operation, branch.as_str());

    match tokio::time::timeout(timeout, work).await {
        Ok(Ok(value)) => {
            timer.finish("succeeded");
            Ok((BranchStatus::Succeeded, Some(value)))
        }
        Ok(Err(e)) if e.is_validation() => {
            timer.finish("failed");
            Err(e)
        }
        Ok(Err(e)) => {
            timer.finish("failed");
            warn!(operation, branch = branch.as_str(), error = %e, "Branch failed");
            Ok((
                BranchStatus::Failed {
                    reason: e.to_string(),
                    timed_out: false,
                    retryable: e.is_retryable(),
                },
                None,
            ))
        }
        Err(_) => {
            timer.finish("timed_out");
            let timeout_ms = timeout.as_millis() as u64;
            warn!(operation, branch = branch.as_str(), timeout_ms, "Branch timed out");
            Ok((
                BranchStatus::Failed {
                    reason: format!("{} timed out after {}ms", branch.as_str(), timeout_ms),
                    timed_out: true,
                    retryable: true,
                },
                None,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_common::errors::AppError;

    #[tokio::test]
    async fn test_settle_success() {
        let (status, value) = settle("query", Branch::Vector, Duration::from_secs(1), async {
            Ok::<_, AppError>(7)
        })
        .await
        .unwrap();
        assert_eq!(status, BranchStatus::Succeeded);
        assert_eq!(value, Some(7));
    }

    #[tokio::test]
    async fn test_settle_store_failure() {
        let (status, value) = settle("ingest", Branch::Graph, Duration::from_secs(1), async {
            Err::<(), _>(AppError::StoreUnavailable {
                store: "graph".into(),
                message: "connection refused".into(),
            })
        })
        .await
        .unwrap();
        assert!(matches!(
            status,
            BranchStatus::Failed {
                timed_out: false,
                retryable: true,
                ..
            }
        ));
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn test_settle_timeout() {
        let (status, _) = settle("query", Branch::Graph, Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, AppError>(())
        })
        .await
        .unwrap();
        assert!(matches!(status, BranchStatus::Failed { timed_out: true, .. }));
    }

    #[tokio::test]
    async fn test_settle_propagates_validation() {
        let result = settle("ingest", Branch::Vector, Duration::from_secs(1), async {
            Err::<(), _>(AppError::DimensionMismatch {
                expected: 768,
                actual: 3,
            })
        })
        .await;
        assert!(matches!(result, Err(AppError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_status_serialization() {
        let value = serde_json::to_value(BranchStatus::Failed {
            reason: "graph timed out after 10ms".into(),
            timed_out: true,
            retryable: true,
        })
        .unwrap();
        assert_eq!(value["status"], "failed");
        assert_eq!(value["timed_out"], true);
        assert_eq!(
            serde_json::to_value(BranchStatus::Skipped).unwrap()["status"],
            "skipped"
        );
    }
}
