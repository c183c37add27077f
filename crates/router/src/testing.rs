//! Store doubles with injectable faults

use crate::coordinator::CoordinatorSettings;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use strata_common::embeddings::{Embedder, HashingEmbedder};
use strata_common::errors::{AppError, Result};
use strata_common::models::{
    GraphEntitySpec, GraphQuery, GraphRelationshipSpec, GraphRow, SearchHit, VectorRecord,
};
use strata_common::retry::RetryPolicy;
use strata_stores::{
    EntityMergeReport, GraphStore, InMemoryGraphStore, InMemoryVectorStore,
    RelationshipMergeReport, VectorStore,
};

pub(crate) const DIMENSION: usize = 16;
pub(crate) const COLLECTION: &str = "test";

#[derive(Debug, Clone, Copy)]
pub(crate) enum Fault {
    None,
    /// Every call fails with a retryable error
    Unavailable,
    /// The first n calls fail with a retryable error
    FailTimes(u32),
    /// Every call sleeps before delegating
    Hang(Duration),
}

async fn inject(fault: Fault, calls: &AtomicU32, store: &str) -> Result<()> {
    let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
    let unavailable = || AppError::StoreUnavailable {
        store: store.to_string(),
        message: "injected fault".to_string(),
    };
    match fault {
        Fault::None => Ok(()),
        Fault::Unavailable => Err(unavailable()),
        Fault::FailTimes(n) if call <= n => Err(unavailable()),
        Fault::FailTimes(_) => Ok(()),
        Fault::Hang(delay) => {
            tokio::time::sleep(delay).await;
            Ok(())
        }
    }
}

pub(crate) struct FaultyVectorStore {
    pub(crate) inner: InMemoryVectorStore,
    fault: Fault,
    calls: AtomicU32,
}

impl FaultyVectorStore {
    pub(crate) fn new(fault: Fault) -> Self {
        Self {
            inner: InMemoryVectorStore::new(),
            fault,
            calls: AtomicU32::new(0),
        }
    }

    /// Upsert and search calls seen so far
    pub(crate) fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl VectorStore for FaultyVectorStore {
    async fn provision(&self, collection: &str, dimension: usize) -> Result<()> {
        self.inner.provision(collection, dimension).await
    }

    async fn upsert(&self, collection: &str, record: VectorRecord) -> Result<()> {
        inject(self.fault, &self.calls, "vector").await?;
        self.inner.upsert(collection, record).await
    }

    async fn search(
        &self,
        collection: &str,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        inject(self.fault, &self.calls, "vector").await?;
        self.inner.search(collection, query, limit).await
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        self.inner.count(collection).await
    }

    fn name(&self) -> &'static str {
        "faulty-vector"
    }
}

pub(crate) struct FaultyGraphStore {
    pub(crate) inner: InMemoryGraphStore,
    fault: Fault,
    calls: AtomicU32,
}

impl FaultyGraphStore {
    pub(crate) fn new(fault: Fault) -> Self {
        Self {
            inner: InMemoryGraphStore::new(),
            fault,
            calls: AtomicU32::new(0),
        }
    }

    /// Merge and query calls seen so far
    pub(crate) fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl GraphStore for FaultyGraphStore {
    async fn provision(&self) -> Result<()> {
        self.inner.provision().await
    }

    async fn merge_entities(&self, entities: &[GraphEntitySpec]) -> Result<EntityMergeReport> {
        inject(self.fault, &self.calls, "graph").await?;
        self.inner.merge_entities(entities).await
    }

    async fn merge_relationships(
        &self,
        relationships: &[GraphRelationshipSpec],
    ) -> Result<RelationshipMergeReport> {
        inject(self.fault, &self.calls, "graph").await?;
        self.inner.merge_relationships(relationships).await
    }

    async fn query(&self, query: &GraphQuery) -> Result<Vec<GraphRow>> {
        inject(self.fault, &self.calls, "graph").await?;
        self.inner.query(query).await
    }

    fn name(&self) -> &'static str {
        "faulty-graph"
    }
}

pub(crate) fn embedder() -> Arc<dyn Embedder> {
    Arc::new(HashingEmbedder::new(DIMENSION))
}

pub(crate) fn settings() -> CoordinatorSettings {
    CoordinatorSettings {
        collection: COLLECTION.to_string(),
        dimension: DIMENSION,
        search_limit: 3,
        graph_max_rows: 100,
        vector_timeout: Duration::from_millis(200),
        graph_timeout: Duration::from_millis(200),
        retry: RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
            multiplier: 2.0,
        },
        graph_score: 0.75,
    }
}

/// Both stores, provisioned for [`settings`]
pub(crate) async fn provisioned(
    vector_fault: Fault,
    graph_fault: Fault,
) -> (Arc<FaultyVectorStore>, Arc<FaultyGraphStore>) {
    let vector = Arc::new(FaultyVectorStore::new(vector_fault));
    let graph = Arc::new(FaultyGraphStore::new(graph_fault));
    vector.provision(COLLECTION, DIMENSION).await.unwrap();
    graph.provision().await.unwrap();
    (vector, graph)
}
