//! Prometheus metrics for the retrieval pipeline
//!
//! Counters and histograms for search requests, strategy runs, degraded
//! paths (rerank fallbacks, expansion failures, skipped documents) and
//! query embedding.

use lazy_static::lazy_static;
use prometheus::{Counter, Encoder, Histogram, HistogramOpts, Opts, Registry, TextEncoder};

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // ============================================================================
    // Search metrics
    // ============================================================================

    /// Total number of search requests
    pub static ref SEARCH_REQUESTS: Counter = Counter::with_opts(
        Opts::new(
            "hybrid_rank_search_requests_total",
            "Total number of search requests"
        )
    ).expect("Failed to create SEARCH_REQUESTS counter");

    /// Search request latency in seconds
    pub static ref SEARCH_LATENCY: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "hybrid_rank_search_latency_seconds",
            "Search request latency in seconds"
        ).buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5])
    ).expect("Failed to create SEARCH_LATENCY histogram");

    /// Number of search results returned per request
    pub static ref SEARCH_RESULTS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "hybrid_rank_search_results_count",
            "Number of search results returned per request"
        ).buckets(vec![0.0, 1.0, 5.0, 10.0, 20.0, 50.0])
    ).expect("Failed to create SEARCH_RESULTS histogram");

    // ============================================================================
    // Fan-out metrics
    // ============================================================================

    /// Strategy runs that produced results
    pub static ref STRATEGY_RUNS: Counter = Counter::with_opts(
        Opts::new(
            "hybrid_rank_strategy_runs_total",
            "Strategy runs that produced results"
        )
    ).expect("Failed to create STRATEGY_RUNS counter");

    /// Strategy runs that failed or timed out
    pub static ref STRATEGY_RUN_FAILURES: Counter = Counter::with_opts(
        Opts::new(
            "hybrid_rank_strategy_run_failures_total",
            "Strategy runs that failed or timed out"
        )
    ).expect("Failed to create STRATEGY_RUN_FAILURES counter");

    // ============================================================================
    // Degraded-path metrics
    // ============================================================================

    /// Candidates that kept their fused score because no similarity was available
    pub static ref RERANK_FALLBACKS: Counter = Counter::with_opts(
        Opts::new(
            "hybrid_rank_rerank_fallbacks_total",
            "Candidates that kept their fused score during reranking"
        )
    ).expect("Failed to create RERANK_FALLBACKS counter");

    /// Query expansions that failed and fell back to the original query
    pub static ref EXPANSION_FAILURES: Counter = Counter::with_opts(
        Opts::new(
            "hybrid_rank_expansion_failures_total",
            "Query expansions that failed"
        )
    ).expect("Failed to create EXPANSION_FAILURES counter");

    /// Documents excluded from dense scoring at snapshot time
    pub static ref SKIPPED_DOCUMENTS: Counter = Counter::with_opts(
        Opts::new(
            "hybrid_rank_skipped_documents_total",
            "Documents excluded from dense scoring at snapshot time"
        )
    ).expect("Failed to create SKIPPED_DOCUMENTS counter");

    // ============================================================================
    // Embedding metrics
    // ============================================================================

    /// Total query embedding requests
    pub static ref EMBEDDING_REQUESTS: Counter = Counter::with_opts(
        Opts::new(
            "hybrid_rank_embedding_requests_total",
            "Total query embedding requests"
        )
    ).expect("Failed to create EMBEDDING_REQUESTS counter");

    /// Query embedding latency in seconds
    pub static ref EMBEDDING_LATENCY: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "hybrid_rank_embedding_latency_seconds",
            "Query embedding latency in seconds"
        ).buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0])
    ).expect("Failed to create EMBEDDING_LATENCY histogram");
}

/// Register all metrics with the global registry
///
/// Call once at startup. A second call fails with `AlreadyReg`.
pub fn register_metrics() -> prometheus::Result<()> {
    REGISTRY.register(Box::new(SEARCH_REQUESTS.clone()))?;
    REGISTRY.register(Box::new(SEARCH_LATENCY.clone()))?;
    REGISTRY.register(Box::new(SEARCH_RESULTS.clone()))?;
    REGISTRY.register(Box::new(STRATEGY_RUNS.clone()))?;
    REGISTRY.register(Box::new(STRATEGY_RUN_FAILURES.clone()))?;
    REGISTRY.register(Box::new(RERANK_FALLBACKS.clone()))?;
    REGISTRY.register(Box::new(EXPANSION_FAILURES.clone()))?;
    REGISTRY.register(Box::new(SKIPPED_DOCUMENTS.clone()))?;
    REGISTRY.register(Box::new(EMBEDDING_REQUESTS.clone()))?;
    REGISTRY.register(Box::new(EMBEDDING_LATENCY.clone()))?;
    Ok(())
}

/// Gather all metrics and encode them in Prometheus text format
///
/// Returns an empty string if encoding fails.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }

    String::from_utf8(buffer).unwrap_or_else(|e| {
        tracing::error!("Metrics contained invalid UTF-8: {}", e);
        String::new()
    })
}

/// Current metric values in a human-readable form
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricSnapshot {
    pub search_requests_total: f64,
    pub search_latency_avg: f64,
    pub search_results_avg: f64,
    pub strategy_runs_total: f64,
    pub strategy_run_failures_total: f64,
    pub rerank_fallbacks_total: f64,
    pub expansion_failures_total: f64,
    pub skipped_documents_total: f64,
    pub embedding_requests_total: f64,
    pub embedding_latency_avg: f64,
}

impl MetricSnapshot {
    /// Capture the current state of all metrics
    pub fn capture() -> Self {
        Self {
            search_requests_total: SEARCH_REQUESTS.get(),
            search_latency_avg: calculate_histogram_avg(&SEARCH_LATENCY),
            search_results_avg: calculate_histogram_avg(&SEARCH_RESULTS),
            strategy_runs_total: STRATEGY_RUNS.get(),
            strategy_run_failures_total: STRATEGY_RUN_FAILURES.get(),
            rerank_fallbacks_total: RERANK_FALLBACKS.get(),
            expansion_failures_total: EXPANSION_FAILURES.get(),
            skipped_documents_total: SKIPPED_DOCUMENTS.get(),
            embedding_requests_total: EMBEDDING_REQUESTS.get(),
            embedding_latency_avg: calculate_histogram_avg(&EMBEDDING_LATENCY),
        }
    }
}

fn calculate_histogram_avg(histogram: &Histogram) -> f64 {
    let count = histogram.get_sample_count();
    if count == 0 {
        return 0.0;
    }
    histogram.get_sample_sum() / count as f64
}
