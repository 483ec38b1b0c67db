use anyhow::Result;
use std::sync::Arc;

use hybrid_rank::corpus::CorpusSnapshot;
use hybrid_rank::search::{StrategyKey, StrategyRunner};
use hybrid_rank::{SearchOptions, Strategy};

use crate::helpers::fixtures::{
    engine, five_doc_corpus, five_doc_embedder, ids, pets_corpus, pets_expander, plain_options,
};

fn hand_bm25(tf: f32, doc_len: f32, avg_len: f32) -> f32 {
    let (k1, b) = (1.5_f32, 0.75_f32);
    tf * (k1 + 1.0) / (tf + k1 * (1.0 - b + b * (doc_len / avg_len)))
}

#[tokio::test]
async fn test_lexical_pets_query_ranks_pet_documents_first() -> Result<()> {
    let search = engine(pets_corpus());

    let results = search
        .search("pets", 2, &plain_options(Strategy::Lexical))
        .await?;

    assert_eq!(ids(&results), vec!["d1", "d2"]);
    assert!((results[0].final_score - 1.0 / 61.0).abs() < 1e-7);
    assert!((results[1].final_score - 1.0 / 62.0).abs() < 1e-7);
    Ok(())
}

#[test]
fn test_lexical_pets_scores_match_hand_computation() {
    let snapshot = CorpusSnapshot::from_documents(pets_corpus());
    let runner = StrategyRunner::default();

    let results = runner
        .run(&snapshot, "pets", None, 3, Strategy::Lexical)
        .unwrap();

    // Lengths 4, 4 and 3 tokens
    let avg = 11.0 / 3.0;
    let expected = hand_bm25(1.0, 4.0, avg);
    assert!((expected - 0.960_699).abs() < 1e-5);

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].document_id, "d1");
    assert_eq!(results[1].document_id, "d2");
    assert_eq!(results[2].document_id, "d3");
    assert!((results[0].score - expected).abs() < 1e-6);
    assert!((results[1].score - expected).abs() < 1e-6);
    assert_eq!(results[2].score, 0.0);
    assert_eq!(
        results.iter().map(|r| r.rank).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
}

#[tokio::test]
async fn test_document_first_in_every_run_gets_exact_fused_score() -> Result<()> {
    let search = engine(five_doc_corpus())
        .with_embedder(Arc::new(five_doc_embedder()))
        .with_expander(Arc::new(pets_expander()));
    let options = SearchOptions::default().with_rerank(false);
    assert_eq!(options.strategies.len(), 3);

    let results = search.search("pets", 5, &options).await?;

    let top = &results[0];
    assert_eq!(top.document_id(), "d1");
    assert!((top.fused_score() - 6.0 / 61.0).abs() < 1e-6);
    assert_eq!(top.fused.retrieved_by.len(), 6);
    assert!(top
        .fused
        .retrieved_by
        .contains(&StrategyKey::new(Strategy::Dense, 1)));

    for strategy in Strategy::default_set() {
        let family = top.fused.breakdown[&strategy];
        assert_eq!(family.runs, 2);
        assert_eq!(family.best_rank, 1);
        assert!((family.rrf_score - 2.0 / 61.0).abs() < 1e-7);
    }
    Ok(())
}

#[tokio::test]
async fn test_empty_corpus_is_not_an_error() -> Result<()> {
    let search = engine(Vec::new()).with_embedder(Arc::new(five_doc_embedder()));

    let results = search.search("pets", 10, &SearchOptions::default()).await?;

    assert!(results.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_rerank_disabled_orders_by_fused_score() -> Result<()> {
    let search = engine(five_doc_corpus())
        .with_embedder(Arc::new(five_doc_embedder()))
        .with_expander(Arc::new(pets_expander()));
    let options = SearchOptions::default().with_rerank(false);

    let results = search.search("pets", 5, &options).await?;

    let mut expected = results.clone();
    expected.sort_by(|a, b| {
        b.fused_score()
            .total_cmp(&a.fused_score())
            .then_with(|| a.document_id().cmp(b.document_id()))
    });
    assert_eq!(ids(&results), ids(&expected));
    for result in &results {
        assert_eq!(result.final_score, result.fused_score());
        assert_eq!(result.rerank_score, None);
    }
    Ok(())
}
