//! Search module: scoring, fan-out, fusion and reranking.
//!
//! This module contains:
//! - `tokenizer` - Lowercasing, punctuation-stripping tokenizer
//! - `bm25` - Length-normalized term-frequency scoring
//! - `vector` - Batched cosine similarity over the embedding matrix
//! - `strategy` - Lexical, dense and blended strategies for one query string
//! - `orchestrator` - Parallel (variant x strategy) fan-out
//! - `fusion` - Reciprocal Rank Fusion across all runs
//! - `rerank` - Final rerank against the original query embedding
//! - `hybrid` - The `HybridSearch` service tying the pipeline together

pub mod bm25;
pub mod fusion;
pub mod hybrid;
pub mod orchestrator;
pub mod rerank;
pub mod strategy;
pub mod tokenizer;
pub mod traits;
pub mod vector;

// Re-export commonly used types
pub use bm25::Bm25Scorer;
pub use fusion::RrfFusion;
pub use hybrid::{HybridSearch, PreparedQuery, SearchOptions};
pub use orchestrator::{MultiQueryOrchestrator, QueryVariant, RetrievalOutcome};
pub use rerank::Reranker;
pub use strategy::{Alpha, Strategy, StrategyKey, StrategyRunner};
pub use tokenizer::tokenize;
pub use traits::{FamilyScore, FusedResult, RankedResult, RawResult, Search};
pub use vector::{cosine_similarity, DenseScorer, EmbeddingMatrix};
