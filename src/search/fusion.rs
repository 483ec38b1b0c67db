//! Reciprocal Rank Fusion across every strategy run of a query.
//!
//! Combines ranked lists using `score(d) = sum 1 / (k + rank)` over each run
//! that returned `d`. Contributions are first summed per strategy family
//! (collapsing query variants), then across families.

use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

use super::strategy::{Strategy, StrategyKey};
use super::traits::{FamilyScore, FusedResult, RawResult};
use crate::corpus::CorpusSnapshot;

/// Default RRF constant (k parameter).
///
/// Higher values make the ranking smoother, lower values emphasize top ranks more.
pub const DEFAULT_RRF_K: f32 = 60.0;

/// Contribution of a single rank (1-indexed) to an RRF score.
pub fn rrf_contribution(rank: usize, k: f32) -> f32 {
    1.0 / (k + rank as f32)
}

#[derive(Default)]
struct Accumulator {
    breakdown: BTreeMap<Strategy, FamilyScore>,
    retrieved_by: BTreeSet<StrategyKey>,
}

/// Reciprocal Rank Fusion (RRF) algorithm.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RrfFusion {
    /// The k constant in the RRF formula
    k: f32,
}

impl RrfFusion {
    /// Create RRF with default k=60.
    pub fn new() -> Self {
        Self { k: DEFAULT_RRF_K }
    }

    /// Create RRF with custom k value.
    pub fn with_k(k: f32) -> Self {
        Self { k }
    }

    pub fn k(&self) -> f32 {
        self.k
    }

    /// Fuse raw results from all runs into one deduplicated list.
    ///
    /// Every document that appears in at least one run appears exactly once
    /// in the output; documents that never appear are absent. Text and
    /// metadata are taken from `snapshot`. The result is sorted by fused
    /// score descending, ties by document id.
    ///
    /// For a fixed input sequence every score is bit-for-bit reproducible.
    pub fn fuse<'a, I>(&self, entries: I, snapshot: &CorpusSnapshot) -> Vec<FusedResult>
    where
        I: IntoIterator<Item = (&'a RawResult, StrategyKey)>,
    {
        let mut by_document: BTreeMap<&'a str, Accumulator> = BTreeMap::new();

        for (result, key) in entries {
            let contribution = rrf_contribution(result.rank, self.k);
            let acc = by_document.entry(result.document_id.as_str()).or_default();

            acc.breakdown
                .entry(key.strategy)
                .and_modify(|family| {
                    family.rrf_score += contribution;
                    family.best_rank = family.best_rank.min(result.rank);
                    family.runs += 1;
                })
                .or_insert(FamilyScore {
                    rrf_score: contribution,
                    best_rank: result.rank,
                    runs: 1,
                });
            acc.retrieved_by.insert(key);
        }

        let mut fused: Vec<FusedResult> = by_document
            .into_iter()
            .filter_map(|(document_id, acc)| {
                let Some(document) = snapshot.get(document_id) else {
                    warn!(document_id = document_id, "Fused document missing from snapshot");
                    return None;
                };
                let fused_score = acc.breakdown.values().map(|f| f.rrf_score).sum();

                Some(FusedResult {
                    document_id: document_id.to_string(),
                    text: document.text.clone(),
                    metadata: document.metadata.clone(),
                    fused_score,
                    breakdown: acc.breakdown,
                    retrieved_by: acc.retrieved_by,
                })
            })
            .collect();

        sort_by_fused_score(&mut fused);
        debug!(documents = fused.len(), k = self.k, "RRF fusion completed");
        fused
    }
}

impl Default for RrfFusion {
    fn default() -> Self {
        Self::new()
    }
}

/// Sort by fused score descending, ties by document id ascending.
pub fn sort_by_fused_score(results: &mut [FusedResult]) {
    results.sort_by(|a, b| {
        b.fused_score
            .total_cmp(&a.fused_score)
            .then_with(|| a.document_id.cmp(&b.document_id))
    });
}
