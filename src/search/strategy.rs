//! Retrieval strategies and the runner that executes one of them.
//!
//! A strategy is applied to one query variant at a time. The runner is pure:
//! it reads the corpus snapshot and returns a ranked list, nothing else.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use super::bm25::Bm25Scorer;
use super::tokenizer::tokenize;
use super::traits::RawResult;
use super::vector::DenseScorer;
use crate::corpus::CorpusSnapshot;
use crate::error::{Result, RetrievalError};

/// Added to the lexical maximum before normalizing, so an all-zero lexical
/// vector normalizes to zeros.
pub const LEXICAL_NORM_EPSILON: f32 = 1e-4;

/// Blend weight of the dense component, in `[0, 1]`.
#[derive(Debug, Clone, Copy)]
pub struct Alpha(f32);

impl Alpha {
    pub fn new(value: f32) -> Result<Self> {
        if value.is_finite() && (0.0..=1.0).contains(&value) {
            Ok(Self(value))
        } else {
            Err(RetrievalError::InvalidStrategy(format!(
                "alpha must be within [0, 1], got {value}"
            )))
        }
    }

    pub fn value(self) -> f32 {
        self.0
    }
}

impl PartialEq for Alpha {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0) == Ordering::Equal
    }
}

impl Eq for Alpha {}

impl PartialOrd for Alpha {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Alpha {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl Hash for Alpha {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

/// A retrieval strategy family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Strategy {
    /// BM25-style term scoring only.
    Lexical,
    /// Cosine similarity only.
    Dense,
    /// `alpha * dense + (1 - alpha) * normalized lexical`.
    Blend(Alpha),
}

impl Strategy {
    /// Blend with the given dense weight.
    pub fn blend(alpha: f32) -> Result<Self> {
        Ok(Self::Blend(Alpha::new(alpha)?))
    }

    /// Lexical-leaning blend, dense-leaning blend, and pure dense.
    pub fn default_set() -> Vec<Strategy> {
        vec![
            Self::Blend(Alpha(0.3)),
            Self::Blend(Alpha(0.7)),
            Self::Dense,
        ]
    }

    /// Whether running this strategy needs a query embedding.
    pub fn needs_embedding(self) -> bool {
        !matches!(self, Self::Lexical)
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lexical => write!(f, "lexical"),
            Self::Dense => write!(f, "dense"),
            Self::Blend(alpha) => write!(f, "hybrid-{}", alpha.value()),
        }
    }
}

impl FromStr for Strategy {
    type Err = RetrievalError;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_lowercase();
        match lower.as_str() {
            "lexical" | "bm25" => Ok(Self::Lexical),
            "dense" | "vector" => Ok(Self::Dense),
            other => {
                let alpha = other
                    .strip_prefix("hybrid-")
                    .or_else(|| other.strip_prefix("blend-"))
                    .ok_or_else(|| RetrievalError::InvalidStrategy(s.to_string()))?;
                let alpha: f32 = alpha
                    .parse()
                    .map_err(|_| RetrievalError::InvalidStrategy(s.to_string()))?;
                Self::blend(alpha)
            }
        }
    }
}

impl TryFrom<String> for Strategy {
    type Error = RetrievalError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Strategy> for String {
    fn from(value: Strategy) -> Self {
        value.to_string()
    }
}

/// Identifies one fan-out run: a strategy applied to one query variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StrategyKey {
    pub strategy: Strategy,
    pub variant: usize,
}

impl StrategyKey {
    pub fn new(strategy: Strategy, variant: usize) -> Self {
        Self { strategy, variant }
    }
}

impl fmt::Display for StrategyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_q{}", self.strategy, self.variant)
    }
}

impl FromStr for StrategyKey {
    type Err = RetrievalError;

    fn from_str(s: &str) -> Result<Self> {
        let (strategy, variant) = s
            .rsplit_once("_q")
            .ok_or_else(|| RetrievalError::InvalidStrategy(s.to_string()))?;
        let variant = variant
            .parse()
            .map_err(|_| RetrievalError::InvalidStrategy(s.to_string()))?;
        Ok(Self::new(strategy.parse()?, variant))
    }
}

impl TryFrom<String> for StrategyKey {
    type Error = RetrievalError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<StrategyKey> for String {
    fn from(value: StrategyKey) -> Self {
        value.to_string()
    }
}

/// Executes a single strategy for a single query string.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrategyRunner {
    bm25: Bm25Scorer,
    dense: DenseScorer,
}

impl StrategyRunner {
    pub fn new(bm25: Bm25Scorer) -> Self {
        Self {
            bm25,
            dense: DenseScorer::new(),
        }
    }

    /// Rank the snapshot for `query_text` under `strategy`, returning at most
    /// `top_k` results with ranks `1..=len`.
    ///
    /// Dense and blended strategies need `query_embedding`; without it the
    /// run fails with [`RetrievalError::EmbeddingUnavailable`].
    pub fn run(
        &self,
        snapshot: &CorpusSnapshot,
        query_text: &str,
        query_embedding: Option<&[f32]>,
        top_k: usize,
        strategy: Strategy,
    ) -> Result<Vec<RawResult>> {
        if snapshot.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let scored: Vec<(usize, f32)> = match strategy {
            Strategy::Lexical => {
                if snapshot.avg_doc_length() <= 0.0 {
                    return Ok(Vec::new());
                }
                self.lexical_scores(snapshot, query_text)
                    .into_iter()
                    .enumerate()
                    .collect()
            }
            Strategy::Dense => {
                let embedding = require_embedding(query_embedding)?;
                self.dense
                    .score_all(embedding, snapshot.matrix())?
                    .into_iter()
                    .enumerate()
                    .filter_map(|(position, score)| score.map(|s| (position, s)))
                    .collect()
            }
            Strategy::Blend(alpha) => {
                let embedding = require_embedding(query_embedding)?;
                let dense = self.dense.score_all(embedding, snapshot.matrix())?;
                let lexical = self.lexical_scores(snapshot, query_text);
                let max_lexical = lexical.iter().copied().fold(0.0_f32, f32::max);
                let alpha = alpha.value();

                // With no lexical weight a document without a row has no score at all
                let keep_rowless = alpha < 1.0;

                dense
                    .into_iter()
                    .zip(lexical)
                    .enumerate()
                    .filter(|(_, (dense, _))| dense.is_some() || keep_rowless)
                    .map(|(position, (dense, lexical))| {
                        let normalized = lexical / (max_lexical + LEXICAL_NORM_EPSILON);
                        let combined = alpha * dense.unwrap_or(0.0) + (1.0 - alpha) * normalized;
                        (position, combined)
                    })
                    .collect()
            }
        };

        Ok(rank_top_k(snapshot, scored, top_k))
    }

    fn lexical_scores(&self, snapshot: &CorpusSnapshot, query_text: &str) -> Vec<f32> {
        if snapshot.avg_doc_length() <= 0.0 {
            return vec![0.0; snapshot.len()];
        }
        let query_terms = tokenize(query_text);
        self.bm25
            .score_all(&query_terms, snapshot.terms(), snapshot.avg_doc_length())
    }
}

fn require_embedding(embedding: Option<&[f32]>) -> Result<&[f32]> {
    embedding.ok_or_else(|| {
        RetrievalError::EmbeddingUnavailable("no embedding for query variant".to_string())
    })
}

/// Sort by score descending, ties by document id ascending, and keep `top_k`.
fn rank_top_k(snapshot: &CorpusSnapshot, mut scored: Vec<(usize, f32)>, top_k: usize) -> Vec<RawResult> {
    let documents = snapshot.documents();
    scored.sort_by(|a, b| {
        b.1.total_cmp(&a.1)
            .then_with(|| documents[a.0].id.cmp(&documents[b.0].id))
    });

    scored
        .into_iter()
        .take(top_k)
        .enumerate()
        .map(|(index, (position, score))| RawResult {
            document_id: documents[position].id.clone(),
            score,
            rank: index + 1,
        })
        .collect()
}
