//! Search trait and the result types that flow through the ranking pipeline.
//!
//! Results move through three shapes: [`RawResult`] from a single strategy
//! run, [`FusedResult`] after rank fusion, and [`RankedResult`] after
//! reranking, which is what callers receive.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::strategy::{Strategy, StrategyKey};
use crate::corpus::Metadata;
use crate::error::Result;

/// Common trait for search entry points.
#[async_trait]
pub trait Search: Send + Sync {
    /// Search for the documents most relevant to `query`.
    ///
    /// # Returns
    /// At most `limit` results sorted by final score (highest first)
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<RankedResult>>;

    /// Get the search type identifier.
    fn search_type(&self) -> &'static str;
}

/// One entry of a single strategy run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawResult {
    pub document_id: String,
    /// Score under the run's own strategy; scales differ between strategies.
    pub score: f32,
    /// Rank position within the run (1-indexed)
    pub rank: usize,
}

/// RRF contribution of one strategy family to a fused document.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FamilyScore {
    /// Sum of `1 / (k + rank)` over every variant run of this family.
    pub rrf_score: f32,
    /// Lowest rank observed across the family's variant runs.
    pub best_rank: usize,
    /// Number of variant runs of this family that returned the document.
    pub runs: usize,
}

/// A document after rank fusion, deduplicated across all runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedResult {
    pub document_id: String,
    pub text: String,
    pub metadata: Metadata,
    pub fused_score: f32,
    pub breakdown: BTreeMap<Strategy, FamilyScore>,
    /// Every run that returned this document.
    pub retrieved_by: BTreeSet<StrategyKey>,
}

impl FusedResult {
    /// Summed RRF contribution of `strategy`, zero if it never returned this document.
    pub fn strategy_score(&self, strategy: Strategy) -> f32 {
        self.breakdown
            .get(&strategy)
            .map(|f| f.rrf_score)
            .unwrap_or(0.0)
    }

    /// Best rank under `strategy` across all variants.
    pub fn best_rank(&self, strategy: Strategy) -> Option<usize> {
        self.breakdown.get(&strategy).map(|f| f.best_rank)
    }
}

/// Final output unit returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedResult {
    #[serde(flatten)]
    pub fused: FusedResult,
    /// Similarity to the original query; `None` when reranking fell back or was skipped.
    pub rerank_score: Option<f32>,
    pub final_score: f32,
}

impl RankedResult {
    pub fn document_id(&self) -> &str {
        &self.fused.document_id
    }

    pub fn fused_score(&self) -> f32 {
        self.fused.fused_score
    }
}
