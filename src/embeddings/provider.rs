use anyhow::Result;
use async_trait::async_trait;
use futures::future::join_all;
use std::time::Instant;
use tracing::{debug, warn};

use crate::metrics::{EMBEDDING_LATENCY, EMBEDDING_REQUESTS};

/// Core trait for embedding providers
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding for a single query string
    async fn embed_query(&self, query: &str) -> Result<Vec<f32>>;

    /// Get provider name for logging and metrics
    fn provider_name(&self) -> &'static str;
}

/// Embed every query variant independently.
///
/// A failure for one variant does not affect the others: its slot is `None`
/// and the failure is logged.
pub async fn embed_variants(provider: &dyn EmbeddingProvider, texts: &[String]) -> Vec<Option<Vec<f32>>> {
    let start = Instant::now();
    let calls = texts.iter().map(|text| async move {
        EMBEDDING_REQUESTS.inc();
        match provider.embed_query(text).await {
            Ok(vector) => Some(vector),
            Err(e) => {
                warn!(
                    provider = provider.provider_name(),
                    query = text.as_str(),
                    error = %e,
                    "Failed to embed query variant"
                );
                None
            }
        }
    });
    let vectors = join_all(calls).await;

    let elapsed = start.elapsed();
    EMBEDDING_LATENCY.observe(elapsed.as_secs_f64());
    debug!(
        provider = provider.provider_name(),
        variants = texts.len(),
        embedded = vectors.iter().filter(|v| v.is_some()).count(),
        elapsed_ms = elapsed.as_millis() as u64,
        "Embedded query variants"
    );
    vectors
}
