//! Error taxonomy for the retrieval pipeline.
//!
//! Failures local to one document, strategy run, or rerank candidate are
//! absorbed and logged where they happen. Only the variants that describe a
//! whole query failing reach the caller of [`crate::search::HybridSearch::search`].

use thiserror::Error;

/// Convenience alias used throughout the engine.
pub type Result<T> = std::result::Result<T, RetrievalError>;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum RetrievalError {
    /// Query and document (or corpus) embeddings disagree on dimensionality.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    /// No documents are available. `search` turns this into an empty list.
    #[error("corpus is empty")]
    EmptyCorpus,

    /// The embedding provider could not produce a vector.
    #[error("embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// A single (variant, strategy) run failed; the others still proceed.
    #[error("strategy run {key} failed: {reason}")]
    StrategyRunFailed { key: String, reason: String },

    /// Every fan-out run failed, so there is nothing to fuse.
    #[error("retrieval failed: all {failed} strategy runs failed")]
    RetrievalFailed { failed: usize },

    /// Reranking could not be performed; callers fall back to fused scores.
    #[error("rerank unavailable: {0}")]
    RerankUnavailable(String),

    /// The document store could not hand out a snapshot.
    #[error("corpus unavailable: {0}")]
    CorpusUnavailable(String),

    /// A strategy string or alpha value could not be parsed or is out of range.
    #[error("invalid strategy: {0}")]
    InvalidStrategy(String),

    /// The caller cancelled the query before fan-out completed.
    #[error("query cancelled")]
    Cancelled,
}

impl RetrievalError {
    /// Whether this error is absorbed inside the pipeline rather than surfaced.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            Self::InvalidDimension { .. }
                | Self::EmbeddingUnavailable(_)
                | Self::StrategyRunFailed { .. }
                | Self::RerankUnavailable(_)
        )
    }
}
