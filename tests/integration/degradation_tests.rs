use anyhow::Result;
use std::sync::Arc;

use hybrid_rank::embeddings::FixedEmbedder;
use hybrid_rank::metrics::RERANK_FALLBACKS;
use hybrid_rank::search::StrategyKey;
use hybrid_rank::{Document, RetrievalError, SearchOptions, Strategy};

use crate::helpers::collaborators::{FailingEmbedder, FailingExpander};
use crate::helpers::fixtures::{engine, five_doc_corpus, ids, pets_expander, plain_options};

#[tokio::test]
async fn test_rerank_falls_back_when_query_cannot_be_embedded() -> Result<()> {
    let search = engine(five_doc_corpus()).with_embedder(Arc::new(FailingEmbedder));
    let options = SearchOptions::default()
        .with_strategies(vec![Strategy::Lexical])
        .with_expansion(false);
    let fallbacks_before = RERANK_FALLBACKS.get();

    let results = search.search("pets", 3, &options).await?;

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].document_id(), "d1");
    for result in &results {
        assert_eq!(result.rerank_score, None);
        assert_eq!(result.final_score, result.fused_score());
    }
    assert!(RERANK_FALLBACKS.get() - fallbacks_before >= 3.0);
    Ok(())
}

#[tokio::test]
async fn test_every_run_failing_surfaces_retrieval_failed() {
    let search = engine(five_doc_corpus()).with_embedder(Arc::new(FailingEmbedder));

    let err = search
        .search("pets", 3, &plain_options(Strategy::Dense))
        .await
        .unwrap_err();

    assert_eq!(err, RetrievalError::RetrievalFailed { failed: 1 });
}

#[tokio::test]
async fn test_no_embedder_leaves_lexical_runs_working() -> Result<()> {
    let search = engine(five_doc_corpus());
    let options = SearchOptions::default()
        .with_strategies(vec![Strategy::Lexical, Strategy::blend(0.5)?, Strategy::Dense])
        .with_expansion(false);

    let results = search.search("pets", 2, &options).await?;

    assert_eq!(results[0].document_id(), "d1");
    let keys: Vec<StrategyKey> = results[0].fused.retrieved_by.iter().copied().collect();
    assert_eq!(keys, vec![StrategyKey::new(Strategy::Lexical, 0)]);
    Ok(())
}

#[tokio::test]
async fn test_failed_variant_embedding_only_drops_its_dense_runs() -> Result<()> {
    // Only the paraphrase can be embedded
    let embedder = FixedEmbedder::new().with("pet animals", vec![0.9, 0.1, 0.0]);
    let search = engine(five_doc_corpus())
        .with_embedder(Arc::new(embedder))
        .with_expander(Arc::new(pets_expander()));
    let options = SearchOptions::default()
        .with_strategies(vec![Strategy::Lexical, Strategy::Dense])
        .with_rerank(false);

    let results = search.search("pets", 5, &options).await?;

    let top = &results[0];
    assert_eq!(top.document_id(), "d1");
    assert!(top.fused.retrieved_by.contains(&StrategyKey::new(Strategy::Lexical, 0)));
    assert!(top.fused.retrieved_by.contains(&StrategyKey::new(Strategy::Lexical, 1)));
    assert!(top.fused.retrieved_by.contains(&StrategyKey::new(Strategy::Dense, 1)));
    assert!(!top.fused.retrieved_by.contains(&StrategyKey::new(Strategy::Dense, 0)));
    assert_eq!(top.fused.breakdown[&Strategy::Dense].runs, 1);
    Ok(())
}

#[tokio::test]
async fn test_expansion_failure_uses_original_query_only() -> Result<()> {
    let search = engine(five_doc_corpus()).with_expander(Arc::new(FailingExpander));
    let options = SearchOptions::default()
        .with_strategies(vec![Strategy::Lexical])
        .with_rerank(false);

    let results = search.search("pets", 5, &options).await?;

    assert_eq!(results.len(), 5);
    assert!(results
        .iter()
        .all(|r| r.fused.retrieved_by.iter().all(|key| key.variant == 0)));
    Ok(())
}

#[tokio::test]
async fn test_query_dimension_mismatch_fails_dense_runs_only() -> Result<()> {
    let embedder = FixedEmbedder::new().with("pets", vec![1.0, 0.0]);
    let search = engine(five_doc_corpus()).with_embedder(Arc::new(embedder));
    let options = SearchOptions::default()
        .with_strategies(vec![Strategy::Lexical, Strategy::Dense])
        .with_expansion(false);

    let results = search.search("pets", 5, &options).await?;

    assert_eq!(results.len(), 5);
    for result in &results {
        assert!(!result.fused.breakdown.contains_key(&Strategy::Dense));
        // Rerank cannot use a mismatched query vector either
        assert_eq!(result.rerank_score, None);
    }
    Ok(())
}

#[tokio::test]
async fn test_documents_without_embeddings() -> Result<()> {
    let documents = vec![
        Document::new("a", "pets and more pets", Vec::new()),
        Document::new("b", "pets", vec![1.0, 0.0]),
        Document::new("c", "market report", vec![0.0, 1.0]),
        Document::new("d", "pets at odd dimension", vec![1.0, 0.0, 0.0]),
    ];
    let embedder = FixedEmbedder::new().with("pets", vec![1.0, 0.0]);
    let search = engine(documents).with_embedder(Arc::new(embedder));

    let dense = search
        .search("pets", 10, &plain_options(Strategy::Dense))
        .await?;
    assert_eq!(ids(&dense), vec!["b", "c"]);

    let blended = search
        .search("pets", 10, &plain_options(Strategy::blend(0.5)?))
        .await?;
    assert_eq!(blended.len(), 4);
    assert!(ids(&blended).contains(&"a"));
    assert!(ids(&blended).contains(&"d"));
    Ok(())
}
