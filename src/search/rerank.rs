//! Final reranking against the original query embedding.
//!
//! `final = weight * cosine(query, doc) + (1 - weight) * fused`. Candidates
//! whose similarity cannot be computed keep their fused score as the final
//! score; they are never dropped.

use tracing::{debug, warn};

use super::traits::{FusedResult, RankedResult};
use super::vector::DenseScorer;
use crate::corpus::CorpusSnapshot;
use crate::error::RetrievalError;
use crate::metrics::RERANK_FALLBACKS;

/// Default weight of the rerank similarity in the final score.
pub const DEFAULT_RERANK_WEIGHT: f32 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reranker {
    weight: f32,
    dense: DenseScorer,
}

impl Reranker {
    pub fn new(weight: f32) -> Self {
        Self {
            weight: weight.clamp(0.0, 1.0),
            dense: DenseScorer::new(),
        }
    }

    pub fn weight(&self) -> f32 {
        self.weight
    }

    /// Blend similarity to the original query into the fused scores.
    ///
    /// `query_embedding` is `None` when the embedding provider could not embed
    /// the original query; every candidate then falls back to its fused score.
    pub fn rerank(
        &self,
        query_embedding: Option<&[f32]>,
        fused: Vec<FusedResult>,
        snapshot: &CorpusSnapshot,
        top_k: usize,
    ) -> Vec<RankedResult> {
        let similarities = match query_embedding {
            Some(query) => self.similarities(query, &fused, snapshot),
            None => {
                let reason = RetrievalError::RerankUnavailable(
                    "no embedding for the original query".to_string(),
                );
                warn!(error = %reason, candidates = fused.len(), "Falling back to fused scores");
                vec![None; fused.len()]
            }
        };

        let fallbacks = similarities.iter().filter(|s| s.is_none()).count();
        if fallbacks > 0 {
            RERANK_FALLBACKS.inc_by(fallbacks as f64);
            debug!(fallbacks = fallbacks, "Candidates reranked on fused score alone");
        }

        let ranked = fused
            .into_iter()
            .zip(similarities)
            .map(|(fused, similarity)| {
                let final_score = match similarity {
                    Some(s) => self.weight * s + (1.0 - self.weight) * fused.fused_score,
                    None => fused.fused_score,
                };
                RankedResult {
                    fused,
                    rerank_score: similarity,
                    final_score,
                }
            })
            .collect();

        finalize(ranked, top_k)
    }

    /// Cosine similarity for every candidate, computed in one batch.
    fn similarities(
        &self,
        query: &[f32],
        fused: &[FusedResult],
        snapshot: &CorpusSnapshot,
    ) -> Vec<Option<f32>> {
        let positions: Vec<Option<usize>> = fused
            .iter()
            .map(|f| snapshot.position(&f.document_id))
            .collect();
        let known: Vec<usize> = positions.iter().flatten().copied().collect();

        let scores = match self.dense.score_positions(query, snapshot.matrix(), &known) {
            Ok(scores) => scores,
            Err(e) => {
                let reason = RetrievalError::RerankUnavailable(e.to_string());
                warn!(error = %reason, "Falling back to fused scores");
                return vec![None; fused.len()];
            }
        };

        let mut scores = scores.into_iter();
        positions
            .into_iter()
            .map(|position| position.and_then(|_| scores.next().flatten()))
            .collect()
    }
}

impl Default for Reranker {
    fn default() -> Self {
        Self::new(DEFAULT_RERANK_WEIGHT)
    }
}

/// Reranking disabled: the final score is the fused score.
pub fn skip_rerank(fused: Vec<FusedResult>, top_k: usize) -> Vec<RankedResult> {
    let ranked = fused
        .into_iter()
        .map(|fused| RankedResult {
            final_score: fused.fused_score,
            rerank_score: None,
            fused,
        })
        .collect();
    finalize(ranked, top_k)
}

/// Sort by final score descending, ties by document id, then truncate.
fn finalize(mut ranked: Vec<RankedResult>, top_k: usize) -> Vec<RankedResult> {
    ranked.sort_by(|a, b| {
        b.final_score
            .total_cmp(&a.final_score)
            .then_with(|| a.fused.document_id.cmp(&b.fused.document_id))
    });
    ranked.truncate(top_k);
    ranked
}
