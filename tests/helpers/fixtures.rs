use std::sync::Arc;

use hybrid_rank::embeddings::FixedEmbedder;
use hybrid_rank::expansion::StaticExpander;
use hybrid_rank::{Document, HybridSearch, InMemoryStore, SearchConfig, SearchOptions, Strategy};

/// Three documents with 3-dim toy embeddings, two of them about pets.
pub fn pets_corpus() -> Vec<Document> {
    vec![
        Document::new("d1", "cats are small pets", vec![0.9, 0.1, 0.0]),
        Document::new("d2", "dogs are loyal pets", vec![0.8, 0.3, 0.0]),
        Document::new("d3", "stock market trends", vec![0.0, 0.1, 0.9]),
    ]
}

/// Five documents where `d1` wins every lexical and dense comparison for
/// both "pets" and "pet animals".
pub fn five_doc_corpus() -> Vec<Document> {
    vec![
        Document::new("d1", "pet animals make great pets", vec![1.0, 0.0, 0.0]),
        Document::new("d2", "dogs bark at night", vec![0.0, 1.0, 0.0]),
        Document::new("d3", "stock market trends", vec![0.0, 0.0, 1.0]),
        Document::new("d4", "weather report for tomorrow", vec![0.0, 0.7, 0.7]),
        Document::new("d5", "cooking with fresh herbs", vec![-1.0, 0.0, 0.0]),
    ]
}

/// Embeddings for the queries used against [`five_doc_corpus`].
pub fn five_doc_embedder() -> FixedEmbedder {
    FixedEmbedder::new()
        .with("pets", vec![1.0, 0.0, 0.0])
        .with("pet animals", vec![0.9, 0.1, 0.0])
}

pub fn pets_expander() -> StaticExpander {
    StaticExpander::new().with("pets", ["pet animals"])
}

pub fn store(documents: Vec<Document>) -> Arc<InMemoryStore> {
    Arc::new(InMemoryStore::new(documents))
}

pub fn engine(documents: Vec<Document>) -> HybridSearch {
    HybridSearch::with_defaults(store(documents))
}

pub fn engine_with(documents: Vec<Document>, config: SearchConfig) -> HybridSearch {
    HybridSearch::new(store(documents), config)
}

/// Single strategy, no expansion, no rerank: fused scores come straight out.
pub fn plain_options(strategy: Strategy) -> SearchOptions {
    SearchOptions::default()
        .with_strategies(vec![strategy])
        .with_expansion(false)
        .with_rerank(false)
}

pub fn ids(results: &[hybrid_rank::RankedResult]) -> Vec<&str> {
    results.iter().map(|r| r.document_id()).collect()
}
