//! Metrics and observability utilities
//!
//! Prometheus metrics for the router: one counter per ingest/query outcome, branch latency
//! per store, and retry/failure counters. All names carry [`METRICS_PREFIX`].

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all Strata metrics
pub const METRICS_PREFIX: &str = "strata";

/// Histogram buckets for branch latency (in seconds)
pub const LATENCY_BUCKETS: &[f64] = &[
    0.001, // 1ms
    0.005, // 5ms
    0.010, // 10ms
    0.025, // 25ms
    0.050, // 50ms
    0.100, // 100ms
    0.250, // 250ms
    0.500, // 500ms
    1.000, // 1s
    2.000, // 2s, default branch timeout
    5.000, // 5s
];

/// Buckets for embedding latency (typically slower)
pub const EMBEDDING_BUCKETS: &[f64] = &[
    0.050, // 50ms
    0.100, // 100ms
    0.250, // 250ms
    0.500, // 500ms
    1.000, // 1s
    2.000, // 2s
    5.000, // 5s
    10.00, // 10s
    30.00, // 30s
];

/// Register all metric descriptions
pub fn register_metrics() {
    describe_counter!(
        format!("{}_ingest_total", METRICS_PREFIX),
        Unit::Count,
        "Ingest requests by outcome"
    );

    describe_counter!(
        format!("{}_query_total", METRICS_PREFIX),
        Unit::Count,
        "Query requests by outcome"
    );

    describe_histogram!(
        format!("{}_query_hits", METRICS_PREFIX),
        Unit::Count,
        "Number of hits returned per query"
    );

    describe_histogram!(
        format!("{}_branch_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Store branch latency in seconds"
    );

    describe_counter!(
        format!("{}_branch_failures_total", METRICS_PREFIX),
        Unit::Count,
        "Store branches that failed or timed out"
    );

    describe_counter!(
        format!("{}_store_retries_total", METRICS_PREFIX),
        Unit::Count,
        "Retries of transient store failures"
    );

    describe_counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total embedding requests"
    );

    describe_histogram!(
        format!("{}_embedding_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Embedding generation latency in seconds"
    );

    describe_counter!(
        format!("{}_embedding_errors_total", METRICS_PREFIX),
        Unit::Count,
        "Total embedding errors"
    );

    tracing::info!("Metrics registered");
}

/// Times one store branch and records its outcome
pub struct BranchTimer {
    start: Instant,
    operation: &'static str,
    store: &'static str,
}

impl BranchTimer {
    /// Start timing `operation` ("ingest" or "query") against `store`
    pub fn start(operation: &'static str, store: &'static str) -> Self {
        Self {
            start: Instant::now(),
            operation,
            store,
        }
    }

    /// Record completion; `outcome` is "succeeded", "failed" or "timed_out"
    pub fn finish(self, outcome: &'static str) {
        histogram!(
            format!("{}_branch_duration_seconds", METRICS_PREFIX),
            "operation" => self.operation,
            "store" => self.store,
            "outcome" => outcome
        )
        .record(self.start.elapsed().as_secs_f64());

        if outcome != "succeeded" {
            counter!(
                format!("{}_branch_failures_total", METRICS_PREFIX),
                "operation" => self.operation,
                "store" => self.store,
                "outcome" => outcome
            )
            .increment(1);
        }
    }
}

/// Helper to record ingest outcomes
pub fn record_ingest(outcome: &'static str) {
    counter!(
        format!("{}_ingest_total", METRICS_PREFIX),
        "outcome" => outcome
    )
    .increment(1);
}

/// Helper to record query outcomes and result size
pub fn record_query(outcome: &'static str, degraded: bool, hit_count: usize) {
    counter!(
        format!("{}_query_total", METRICS_PREFIX),
        "outcome" => outcome,
        "degraded" => degraded.to_string()
    )
    .increment(1);

    histogram!(format!("{}_query_hits", METRICS_PREFIX)).record(hit_count as f64);
}

/// Helper to record a retry of a transient store failure
pub fn record_retry(operation: &str) {
    counter!(
        format!("{}_store_retries_total", METRICS_PREFIX),
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// Helper to record embedding metrics
pub fn record_embedding(duration_secs: f64, model: &str, batch_size: usize, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => status
    )
    .increment(batch_size as u64);

    if success {
        histogram!(
            format!("{}_embedding_duration_seconds", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .record(duration_secs);
    } else {
        counter!(
            format!("{}_embedding_errors_total", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_buckets() {
        let mut prev = 0.0;
        for &bucket in LATENCY_BUCKETS {
            assert!(bucket > prev);
            prev = bucket;
        }
        // default branch timeout must land on a bucket boundary
        assert!(LATENCY_BUCKETS.contains(&2.000));
    }

    #[test]
    fn test_recorders_without_exporter() {
        // No recorder installed: every helper must be a no-op, not a panic
        let timer = BranchTimer::start("query", "graph");
        timer.finish("timed_out");
        record_ingest("succeeded");
        record_query("succeeded", true, 3);
        record_retry("merge_entities");
        record_embedding(0.01, "hashing", 1, true);
    }
}
