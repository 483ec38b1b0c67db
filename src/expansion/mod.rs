//! Query expansion: alternative phrasings of the user's query.
//!
//! Paraphrases come from an external [`QueryExpander`]. Expansion is optional;
//! when the expander is absent or fails, the search runs on the original
//! query alone.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

use crate::metrics::EXPANSION_FAILURES;

/// Default number of paraphrases kept in addition to the original query.
pub const DEFAULT_MAX_VARIANTS: usize = 3;

/// Produces alternative phrasings of a query.
#[async_trait]
pub trait QueryExpander: Send + Sync {
    /// Return zero or more paraphrases of `query`, not including `query` itself.
    async fn expand(&self, query: &str) -> Result<Vec<String>>;
}

/// Expander backed by a fixed table of paraphrases.
#[derive(Debug, Clone, Default)]
pub struct StaticExpander {
    table: HashMap<String, Vec<String>>,
}

impl StaticExpander {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<I, S>(mut self, query: impl Into<String>, paraphrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.table
            .insert(query.into(), paraphrases.into_iter().map(Into::into).collect());
        self
    }
}

#[async_trait]
impl QueryExpander for StaticExpander {
    async fn expand(&self, query: &str) -> Result<Vec<String>> {
        Ok(self.table.get(query).cloned().unwrap_or_default())
    }
}

/// Assemble the variant list: the original query first, then up to
/// `max_variants` distinct, non-empty paraphrases.
///
/// Paraphrases that only differ from an earlier entry by case or
/// surrounding whitespace are dropped.
pub fn build_variants(original: &str, paraphrases: Vec<String>, max_variants: usize) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    seen.insert(original.trim().to_lowercase());

    let mut variants = vec![original.to_string()];
    for paraphrase in paraphrases {
        if variants.len() > max_variants {
            break;
        }
        let trimmed = paraphrase.trim();
        if trimmed.is_empty() || !seen.insert(trimmed.to_lowercase()) {
            continue;
        }
        variants.push(trimmed.to_string());
    }
    variants
}

/// Expand `query` with `expander`, degrading to the original query alone on
/// failure or when no expander is configured.
pub async fn expand_query(
    expander: Option<&dyn QueryExpander>,
    query: &str,
    max_variants: usize,
) -> Vec<String> {
    let Some(expander) = expander else {
        return vec![query.to_string()];
    };

    match expander.expand(query).await {
        Ok(paraphrases) => {
            let variants = build_variants(query, paraphrases, max_variants);
            debug!(query = query, variants = variants.len(), "Expanded query");
            variants
        }
        Err(e) => {
            EXPANSION_FAILURES.inc();
            warn!(query = query, error = %e, "Query expansion failed, using original query only");
            vec![query.to_string()]
        }
    }
}
