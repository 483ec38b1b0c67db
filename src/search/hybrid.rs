//! Hybrid search service: the full retrieval and ranking pipeline.
//!
//! One query goes through expansion, per-variant embedding, the multi-query
//! fan-out over every configured strategy, RRF fusion, and finally reranking
//! against the original query embedding.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::bm25::Bm25Scorer;
use super::fusion::RrfFusion;
use super::orchestrator::{MultiQueryOrchestrator, QueryVariant};
use super::rerank::{skip_rerank, Reranker};
use super::strategy::{Strategy, StrategyRunner};
use super::traits::{RankedResult, Search};
use crate::config::SearchConfig;
use crate::corpus::{CorpusSnapshot, Document, DocumentStore};
use crate::embeddings::{embed_variants, EmbeddingProvider};
use crate::error::{Result, RetrievalError};
use crate::expansion::{expand_query, QueryExpander};
use crate::metrics::{SEARCH_LATENCY, SEARCH_REQUESTS, SEARCH_RESULTS};

/// Per-query knobs.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOptions {
    /// Strategy families run for every query variant
    pub strategies: Vec<Strategy>,
    pub enable_rerank: bool,
    pub enable_expansion: bool,
}

impl SearchOptions {
    pub fn with_strategies(mut self, strategies: Vec<Strategy>) -> Self {
        self.strategies = strategies;
        self
    }

    pub fn with_rerank(mut self, enabled: bool) -> Self {
        self.enable_rerank = enabled;
        self
    }

    pub fn with_expansion(mut self, enabled: bool) -> Self {
        self.enable_expansion = enabled;
        self
    }
}

impl From<&SearchConfig> for SearchOptions {
    fn from(config: &SearchConfig) -> Self {
        Self {
            strategies: config.strategies.clone(),
            enable_rerank: config.enable_rerank,
            enable_expansion: config.enable_expansion,
        }
    }
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self::from(&SearchConfig::default())
    }
}

/// Query variants with embeddings already materialized by the caller.
///
/// Variant 0 is the original query; its embedding is the one used for
/// reranking.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedQuery {
    variants: Vec<QueryVariant>,
}

impl PreparedQuery {
    pub fn new(original: impl Into<String>, embedding: Option<Vec<f32>>) -> Self {
        Self {
            variants: vec![QueryVariant::new(0, original, embedding)],
        }
    }

    /// Append a paraphrase.
    pub fn with_variant(mut self, text: impl Into<String>, embedding: Option<Vec<f32>>) -> Self {
        let index = self.variants.len();
        self.variants.push(QueryVariant::new(index, text, embedding));
        self
    }

    /// Pair variant texts with their embeddings. The first text is the original query.
    fn from_parts(texts: Vec<String>, embeddings: Vec<Option<Vec<f32>>>) -> Option<Self> {
        let mut parts = texts.into_iter().zip(embeddings);
        let (original, embedding) = parts.next()?;
        Some(parts.fold(Self::new(original, embedding), |query, (text, embedding)| {
            query.with_variant(text, embedding)
        }))
    }

    pub fn original(&self) -> &str {
        &self.variants[0].text
    }

    pub fn variants(&self) -> &[QueryVariant] {
        &self.variants
    }

    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }
}

/// Snapshot built from one particular `Arc` handed out by the store.
struct CachedSnapshot {
    documents: Arc<Vec<Document>>,
    snapshot: Arc<CorpusSnapshot>,
}

/// Hybrid retrieval over a document store.
///
/// Collaborators are injected: the store hands out corpus snapshots, the
/// optional embedding provider embeds query variants, and the optional
/// expander supplies paraphrases.
pub struct HybridSearch {
    store: Arc<dyn DocumentStore>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    expander: Option<Arc<dyn QueryExpander>>,
    orchestrator: MultiQueryOrchestrator,
    fusion: RrfFusion,
    reranker: Reranker,
    config: SearchConfig,
    cache: RwLock<Option<CachedSnapshot>>,
}

impl HybridSearch {
    pub fn new(store: Arc<dyn DocumentStore>, config: SearchConfig) -> Self {
        let runner = StrategyRunner::new(Bm25Scorer::with_params(config.bm25_k1, config.bm25_b));
        let orchestrator = MultiQueryOrchestrator::new(runner, config.max_concurrency)
            .with_run_timeout(config.run_timeout());

        Self {
            store,
            embedder: None,
            expander: None,
            orchestrator,
            fusion: RrfFusion::with_k(config.rrf_k),
            reranker: Reranker::new(config.rerank_weight),
            config,
            cache: RwLock::new(None),
        }
    }

    /// Create a service with default configuration.
    pub fn with_defaults(store: Arc<dyn DocumentStore>) -> Self {
        Self::new(store, SearchConfig::default())
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn with_expander(mut self, expander: Arc<dyn QueryExpander>) -> Self {
        self.expander = Some(expander);
        self
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Options derived from the configuration.
    pub fn default_options(&self) -> SearchOptions {
        SearchOptions::from(&self.config)
    }

    /// Run the full pipeline for `query`.
    ///
    /// Returns at most `top_k` results sorted by final score. An empty corpus
    /// yields an empty list.
    ///
    /// # Errors
    /// * [`RetrievalError::RetrievalFailed`] if every strategy run failed
    /// * [`RetrievalError::CorpusUnavailable`] if the store could not be read
    /// * [`RetrievalError::InvalidStrategy`] if `options` names no strategy
    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
        options: &SearchOptions,
    ) -> Result<Vec<RankedResult>> {
        self.search_with_cancel(query, top_k, options, &CancellationToken::new())
            .await
    }

    /// Same as [`HybridSearch::search`], abandoning the query with
    /// [`RetrievalError::Cancelled`] once `cancel` fires.
    pub async fn search_with_cancel(
        &self,
        query: &str,
        top_k: usize,
        options: &SearchOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<RankedResult>> {
        let start = Instant::now();
        SEARCH_REQUESTS.inc();

        let Some(snapshot) = self.snapshot_for(top_k, options).await? else {
            return Ok(record(query, Vec::new(), start));
        };

        let prepared = self.prepare(query, options).await;
        let results = self
            .rank(snapshot, prepared, top_k, options, cancel)
            .await?;
        Ok(record(query, results, start))
    }

    /// Rank with variants and embeddings supplied by the caller; expansion
    /// and query embedding are skipped.
    pub async fn search_prepared(
        &self,
        prepared: PreparedQuery,
        top_k: usize,
        options: &SearchOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<RankedResult>> {
        let start = Instant::now();
        SEARCH_REQUESTS.inc();
        let query = prepared.original().to_string();

        let Some(snapshot) = self.snapshot_for(top_k, options).await? else {
            return Ok(record(&query, Vec::new(), start));
        };

        let results = self
            .rank(snapshot, prepared, top_k, options, cancel)
            .await?;
        Ok(record(&query, results, start))
    }

    /// Expand `query` and embed every variant.
    pub async fn prepare(&self, query: &str, options: &SearchOptions) -> PreparedQuery {
        let texts = if options.enable_expansion {
            expand_query(self.expander.as_deref(), query, self.config.max_variants).await
        } else {
            vec![query.to_string()]
        };

        let embeddings = match &self.embedder {
            Some(embedder) => embed_variants(embedder.as_ref(), &texts).await,
            None => {
                debug!("No embedding provider configured, dense strategies will fail");
                vec![None; texts.len()]
            }
        };

        PreparedQuery::from_parts(texts, embeddings)
            .unwrap_or_else(|| PreparedQuery::new(query, None))
    }

    /// Validate the request and fetch the snapshot. `None` means there is
    /// nothing to rank.
    async fn snapshot_for(
        &self,
        top_k: usize,
        options: &SearchOptions,
    ) -> Result<Option<Arc<CorpusSnapshot>>> {
        if options.strategies.is_empty() {
            return Err(RetrievalError::InvalidStrategy(
                "no strategies requested".to_string(),
            ));
        }
        if top_k == 0 {
            return Ok(None);
        }
        self.snapshot().await
    }

    /// Current corpus snapshot, rebuilt only when the store hands out a new
    /// document set.
    async fn snapshot(&self) -> Result<Option<Arc<CorpusSnapshot>>> {
        let documents = self
            .store
            .list_documents()
            .await
            .map_err(|e| RetrievalError::CorpusUnavailable(format!("{e:#}")))?;

        if documents.is_empty() {
            debug!(error = %RetrievalError::EmptyCorpus, "Nothing to search");
            return Ok(None);
        }

        if let Some(cached) = self.cache.read().await.as_ref() {
            if Arc::ptr_eq(&cached.documents, &documents) {
                return Ok(Some(Arc::clone(&cached.snapshot)));
            }
        }

        let source = Arc::clone(&documents);
        let snapshot = tokio::task::spawn_blocking(move || CorpusSnapshot::build(source))
            .await
            .map(Arc::new)
            .map_err(|e| {
                RetrievalError::CorpusUnavailable(format!("snapshot build did not complete: {e}"))
            })?;

        *self.cache.write().await = Some(CachedSnapshot {
            documents,
            snapshot: Arc::clone(&snapshot),
        });
        Ok(Some(snapshot))
    }

    async fn rank(
        &self,
        snapshot: Arc<CorpusSnapshot>,
        prepared: PreparedQuery,
        top_k: usize,
        options: &SearchOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<RankedResult>> {
        let depth = top_k.saturating_mul(self.config.candidate_multiplier.max(1));
        let variants = Arc::new(prepared.variants);

        let outcome = self
            .orchestrator
            .retrieve(
                Arc::clone(&snapshot),
                Arc::clone(&variants),
                depth,
                &options.strategies,
                cancel,
            )
            .await?;

        if !outcome.failures.is_empty() {
            warn!(
                failed_runs = outcome.failures.len(),
                total_runs = outcome.total_runs(),
                "Ranking with partial strategy results"
            );
        }

        let fused = self.fusion.fuse(outcome.entries(), &snapshot);
        let candidates = fused.len();

        let ranked = if options.enable_rerank {
            let query_embedding = variants.first().and_then(|v| v.embedding.as_deref());
            self.reranker.rerank(query_embedding, fused, &snapshot, top_k)
        } else {
            skip_rerank(fused, top_k)
        };

        debug!(
            variants = variants.len(),
            runs = outcome.runs.len(),
            candidates = candidates,
            returned = ranked.len(),
            "Ranking completed"
        );
        Ok(ranked)
    }
}

fn record(query: &str, results: Vec<RankedResult>, start: Instant) -> Vec<RankedResult> {
    let elapsed = start.elapsed();
    SEARCH_LATENCY.observe(elapsed.as_secs_f64());
    SEARCH_RESULTS.observe(results.len() as f64);

    info!(
        search_type = "hybrid",
        query = query,
        results = results.len(),
        elapsed_ms = elapsed.as_millis() as u64,
        "Hybrid search completed"
    );
    results
}

#[async_trait]
impl Search for HybridSearch {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<RankedResult>> {
        let options = self.default_options();
        HybridSearch::search(self, query, limit, &options).await
    }

    fn search_type(&self) -> &'static str {
        "hybrid"
    }
}
