use anyhow::Result;
use std::sync::Arc;

use hybrid_rank::corpus::CorpusSnapshot;
use hybrid_rank::search::{MultiQueryOrchestrator, QueryVariant, StrategyRunner};
use hybrid_rank::{RetrievalError, Strategy};
use tokio_util::sync::CancellationToken;

use crate::helpers::fixtures::{engine, five_doc_corpus, five_doc_embedder, ids, plain_options};

#[tokio::test]
async fn test_blend_extremes_rank_like_pure_strategies() -> Result<()> {
    let search = engine(five_doc_corpus()).with_embedder(Arc::new(five_doc_embedder()));

    let dense = search
        .search("pets", 5, &plain_options(Strategy::Dense))
        .await?;
    let all_dense = search
        .search("pets", 5, &plain_options(Strategy::blend(1.0)?))
        .await?;
    assert_eq!(ids(&dense), ids(&all_dense));

    let lexical = search
        .search("pets", 5, &plain_options(Strategy::Lexical))
        .await?;
    let all_lexical = search
        .search("pets", 5, &plain_options(Strategy::blend(0.0)?))
        .await?;
    assert_eq!(ids(&lexical), ids(&all_lexical));
    Ok(())
}

#[test]
fn test_lexical_includes_zero_score_documents() {
    let snapshot = CorpusSnapshot::from_documents(five_doc_corpus());

    let results = StrategyRunner::default()
        .run(&snapshot, "herbs", None, 5, Strategy::Lexical)
        .unwrap();

    assert_eq!(results.len(), 5);
    assert_eq!(results[0].document_id, "d5");
    assert!(results[0].score > 0.0);
    assert!(results[1..].iter().all(|r| r.score == 0.0));
    // Zero scores tie, so ids decide
    let tail: Vec<&str> = results[1..].iter().map(|r| r.document_id.as_str()).collect();
    assert_eq!(tail, vec!["d1", "d2", "d3", "d4"]);
}

#[test]
fn test_strategy_names_round_trip_through_parse() {
    for name in ["lexical", "dense", "hybrid-0.3", "hybrid-0.7", "hybrid-1"] {
        let strategy: Strategy = name.parse().unwrap();
        assert_eq!(strategy.to_string(), name);
    }
    assert!(matches!(
        "hybrid-1.5".parse::<Strategy>(),
        Err(RetrievalError::InvalidStrategy(_))
    ));
    assert!("semantic".parse::<Strategy>().is_err());
}

#[tokio::test]
async fn test_orchestrator_runs_every_variant_strategy_pair() -> Result<()> {
    let snapshot = Arc::new(CorpusSnapshot::from_documents(five_doc_corpus()));
    let variants = Arc::new(vec![
        QueryVariant::new(0, "pets", Some(vec![1.0, 0.0, 0.0])),
        QueryVariant::new(1, "pet animals", None),
    ]);
    let strategies = [Strategy::Lexical, Strategy::Dense, Strategy::blend(0.3)?];
    let orchestrator = MultiQueryOrchestrator::new(StrategyRunner::default(), 2);

    let outcome = orchestrator
        .retrieve(snapshot, variants, 5, &strategies, &CancellationToken::new())
        .await?;

    assert_eq!(outcome.total_runs(), 6);
    assert_eq!(outcome.runs.len(), 4);
    assert_eq!(outcome.failures.len(), 2);
    let failed: Vec<String> = outcome.failures.iter().map(|f| f.key.to_string()).collect();
    assert_eq!(failed, vec!["dense_q1", "hybrid-0.3_q1"]);
    Ok(())
}
