//! BM25-style lexical scoring over an in-memory corpus.
//!
//! This is the IDF-free variant: every query term carries the same weight no
//! matter how rare it is across the corpus. Scores only depend on term
//! frequency in the document and the document's length relative to the
//! corpus average, which keeps scoring single-pass.

use rayon::prelude::*;
use std::collections::HashMap;

use super::tokenizer::tokenize;

/// Default term-frequency saturation parameter.
pub const DEFAULT_K1: f32 = 1.5;

/// Default length-normalization parameter.
pub const DEFAULT_B: f32 = 0.75;

/// Term-frequency table for one document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentTerms {
    term_freqs: HashMap<String, u32>,
    length: usize,
}

impl DocumentTerms {
    /// Tokenize `text` and count its terms.
    pub fn from_text(text: &str) -> Self {
        Self::from_tokens(tokenize(text))
    }

    pub fn from_tokens(tokens: Vec<String>) -> Self {
        let length = tokens.len();
        let mut term_freqs: HashMap<String, u32> = HashMap::with_capacity(length);
        for token in tokens {
            *term_freqs.entry(token).or_insert(0) += 1;
        }
        Self { term_freqs, length }
    }

    /// Number of tokens in the document.
    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Occurrences of `term`, zero if absent.
    pub fn term_frequency(&self, term: &str) -> u32 {
        self.term_freqs.get(term).copied().unwrap_or(0)
    }
}

/// Mean token count across a corpus. Zero for an empty corpus.
pub fn average_length(docs: &[DocumentTerms]) -> f32 {
    if docs.is_empty() {
        return 0.0;
    }
    let total: usize = docs.iter().map(DocumentTerms::len).sum();
    total as f32 / docs.len() as f32
}

/// Lexical scorer with fixed `k1` and `b` parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bm25Scorer {
    k1: f32,
    b: f32,
}

impl Bm25Scorer {
    /// Create a scorer with the standard parameters (k1=1.5, b=0.75).
    pub fn new() -> Self {
        Self {
            k1: DEFAULT_K1,
            b: DEFAULT_B,
        }
    }

    pub fn with_params(k1: f32, b: f32) -> Self {
        Self { k1, b }
    }

    pub fn k1(&self) -> f32 {
        self.k1
    }

    pub fn b(&self) -> f32 {
        self.b
    }

    /// Score one document against the query terms.
    ///
    /// Terms absent from the document contribute nothing. Callers must not
    /// pass an `avg_doc_length` of zero; an empty corpus is handled before
    /// scoring, and this returns 0.0 if it happens anyway.
    pub fn score(&self, query_terms: &[String], doc: &DocumentTerms, avg_doc_length: f32) -> f32 {
        if avg_doc_length <= 0.0 {
            return 0.0;
        }

        let length_ratio = doc.len() as f32 / avg_doc_length;
        let norm = self.k1 * (1.0 - self.b + self.b * length_ratio);

        query_terms
            .iter()
            .map(|term| doc.term_frequency(term))
            .filter(|&tf| tf > 0)
            .map(|tf| {
                let tf = tf as f32;
                tf * (self.k1 + 1.0) / (tf + norm)
            })
            .sum()
    }

    /// Score every document, in input order.
    pub fn score_all(
        &self,
        query_terms: &[String],
        docs: &[DocumentTerms],
        avg_doc_length: f32,
    ) -> Vec<f32> {
        docs.par_iter()
            .map(|doc| self.score(query_terms, doc, avg_doc_length))
            .collect()
    }
}

impl Default for Bm25Scorer {
    fn default() -> Self {
        Self::new()
    }
}
