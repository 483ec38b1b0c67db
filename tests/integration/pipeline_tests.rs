use anyhow::Result;
use std::sync::Arc;

use hybrid_rank::search::{cosine_similarity, Search};
use hybrid_rank::{
    Config, Document, HybridSearch, PreparedQuery, SearchConfig, SearchOptions, Strategy,
};
use tokio_util::sync::CancellationToken;

use crate::helpers::collaborators::CountingStore;
use crate::helpers::fixtures::{
    engine, engine_with, five_doc_corpus, five_doc_embedder, ids, pets_expander, plain_options,
    store,
};

#[tokio::test]
async fn test_repeated_queries_are_identical() -> Result<()> {
    let search = engine(five_doc_corpus())
        .with_embedder(Arc::new(five_doc_embedder()))
        .with_expander(Arc::new(pets_expander()));
    let options = SearchOptions::default();

    let first = search.search("pets", 5, &options).await?;
    let second = search.search("pets", 5, &options).await?;

    assert_eq!(first, second);
    Ok(())
}

#[tokio::test]
async fn test_worker_count_does_not_change_results() -> Result<()> {
    let mut serial = SearchConfig::default();
    serial.max_concurrency = 1;
    let mut parallel = SearchConfig::default();
    parallel.max_concurrency = 8;

    let serial = engine_with(five_doc_corpus(), serial)
        .with_embedder(Arc::new(five_doc_embedder()))
        .with_expander(Arc::new(pets_expander()));
    let parallel = engine_with(five_doc_corpus(), parallel)
        .with_embedder(Arc::new(five_doc_embedder()))
        .with_expander(Arc::new(pets_expander()));
    let options = SearchOptions::default().with_strategies(vec![
        Strategy::Lexical,
        Strategy::blend(0.5)?,
        Strategy::Dense,
    ]);

    let a = serial.search("pets", 5, &options).await?;
    let b = parallel.search("pets", 5, &options).await?;

    assert_eq!(a, b);
    Ok(())
}

#[tokio::test]
async fn test_rerank_blends_similarity_with_fused_score() -> Result<()> {
    let search = engine(five_doc_corpus()).with_embedder(Arc::new(five_doc_embedder()));
    let options = SearchOptions::default().with_expansion(false);
    let query = [1.0, 0.0, 0.0];

    let results = search.search("pets", 5, &options).await?;

    assert_eq!(results.len(), 5);
    let corpus = five_doc_corpus();
    for result in &results {
        let doc = corpus
            .iter()
            .find(|d| d.id == result.document_id())
            .unwrap();
        let cosine = cosine_similarity(&query, &doc.embedding)?;
        let expected = 0.7 * cosine + 0.3 * result.fused_score();

        assert_eq!(result.rerank_score, Some(cosine));
        assert!((result.final_score - expected).abs() < 1e-6);
    }
    for pair in results.windows(2) {
        assert!(pair[0].final_score >= pair[1].final_score);
    }
    Ok(())
}

#[tokio::test]
async fn test_top_k_bounds_output() -> Result<()> {
    let search = engine(five_doc_corpus()).with_embedder(Arc::new(five_doc_embedder()));

    let results = search.search("pets", 2, &SearchOptions::default()).await?;
    assert_eq!(results.len(), 2);

    let results = search.search("pets", 50, &SearchOptions::default()).await?;
    assert_eq!(results.len(), 5);
    Ok(())
}

#[tokio::test]
async fn test_metadata_and_text_pass_through() -> Result<()> {
    let documents = vec![
        Document::new("a", "pets at home", vec![1.0, 0.0])
            .with_metadata("source", serde_json::json!("handbook")),
        Document::new("b", "market report", vec![0.0, 1.0]),
    ];
    let search = engine(documents);

    let results = search
        .search("pets", 1, &plain_options(Strategy::Lexical))
        .await?;

    assert_eq!(results[0].fused.text, "pets at home");
    assert_eq!(
        results[0].fused.metadata.get("source"),
        Some(&serde_json::json!("handbook"))
    );
    Ok(())
}

#[tokio::test]
async fn test_duplicate_ids_keep_first_occurrence() -> Result<()> {
    let documents = vec![
        Document::new("a", "pets first copy", vec![1.0, 0.0]),
        Document::new("b", "unrelated", vec![0.0, 1.0]),
        Document::new("a", "pets second copy", vec![0.0, 1.0]),
    ];
    let search = engine(documents);

    let results = search
        .search("pets", 10, &plain_options(Strategy::Lexical))
        .await?;

    assert_eq!(ids(&results), vec!["a", "b"]);
    assert_eq!(results[0].fused.text, "pets first copy");
    Ok(())
}

#[tokio::test]
async fn test_store_mutation_visible_to_later_queries() -> Result<()> {
    let store = store(vec![Document::new("a", "market report", vec![1.0])]);
    let search = HybridSearch::with_defaults(store.clone());
    let options = plain_options(Strategy::Lexical);

    let before = search.search("pets", 5, &options).await?;
    assert_eq!(ids(&before), vec!["a"]);

    store.upsert(Document::new("b", "pets pets pets", vec![1.0]));
    let after = search.search("pets", 5, &options).await?;
    assert_eq!(ids(&after), vec!["b", "a"]);
    Ok(())
}

#[tokio::test]
async fn test_search_prepared_uses_caller_embeddings() -> Result<()> {
    let store = Arc::new(CountingStore::new(five_doc_corpus()));
    let search = HybridSearch::with_defaults(store.clone());
    let prepared = PreparedQuery::new("pets", Some(vec![1.0, 0.0, 0.0]))
        .with_variant("pet animals", Some(vec![0.9, 0.1, 0.0]));

    let results = search
        .search_prepared(
            prepared,
            3,
            &SearchOptions::default(),
            &CancellationToken::new(),
        )
        .await?;

    assert_eq!(store.calls(), 1);
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].document_id(), "d1");
    assert_eq!(results[0].fused.retrieved_by.len(), 6);
    assert!(results[0].rerank_score.is_some());
    Ok(())
}

#[tokio::test]
async fn test_engine_from_toml_config() -> Result<()> {
    let config = Config::from_toml_str(
        r#"
        [search]
        strategies = ["lexical"]
        enable_rerank = false
        enable_expansion = false
        "#,
    )?;
    let search = engine_with(five_doc_corpus(), config.search);

    let results = Search::search(&search, "pets", 3).await?;

    assert_eq!(search.search_type(), "hybrid");
    assert_eq!(results[0].document_id(), "d1");
    assert!((results[0].final_score - 1.0 / 61.0).abs() < 1e-7);
    Ok(())
}

#[tokio::test]
async fn test_results_serialize_with_run_keys() -> Result<()> {
    let search = engine(five_doc_corpus()).with_embedder(Arc::new(five_doc_embedder()));
    let options = SearchOptions::default().with_expansion(false);

    let results = search.search("pets", 1, &options).await?;
    let json = serde_json::to_value(&results[0])?;

    assert_eq!(json["document_id"], "d1");
    assert!(json["final_score"].is_number());
    let keys: Vec<&str> = json["retrieved_by"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|k| k.as_str())
        .collect();
    assert!(keys.contains(&"hybrid-0.3_q0"));
    assert!(keys.contains(&"dense_q0"));
    Ok(())
}

#[tokio::test]
async fn test_repeated_strategy_counts_once() -> Result<()> {
    let search = engine(five_doc_corpus());
    let options = plain_options(Strategy::Lexical)
        .with_strategies(vec![Strategy::Lexical, Strategy::Lexical]);

    let results = search.search("pets", 1, &options).await?;

    assert_eq!(ids(&results), vec!["d1"]);
    let fused = &results[0].fused;
    assert!((fused.fused_score - 1.0 / 61.0).abs() < 1e-6);
    assert_eq!(fused.retrieved_by.len(), 1);
    assert_eq!(fused.breakdown[&Strategy::Lexical].runs, 1);
    Ok(())
}
