//! Documents, the store that hands them out, and the per-query corpus snapshot.

mod memory;

pub use memory::InMemoryStore;

use anyhow::Result;
use async_trait::async_trait;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::metrics::SKIPPED_DOCUMENTS;
use crate::search::bm25::{average_length, DocumentTerms};
use crate::search::vector::EmbeddingMatrix;

/// Free-form document metadata, passed through to results untouched.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// A document with its precomputed embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Unique, corpus-stable identifier.
    pub id: String,
    pub text: String,
    /// Embedding vector; empty when the store has none for this document.
    #[serde(default)]
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Document {
    pub fn new(id: impl Into<String>, text: impl Into<String>, embedding: Vec<f32>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            embedding,
            metadata: Metadata::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Source of document snapshots.
///
/// Ids are expected to be unique within one snapshot. Implementations must
/// hand out an immutable view: later mutations may not be visible through a
/// snapshot that was already returned.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Return the current set of documents.
    async fn list_documents(&self) -> Result<Arc<Vec<Document>>>;
}

/// Read-only view of the corpus prepared for one query.
///
/// Tokenization, term frequencies, the average document length, and the
/// normalized embedding matrix are all computed once when the snapshot is
/// built and shared by every strategy run of the query.
#[derive(Debug, Default)]
pub struct CorpusSnapshot {
    documents: Arc<Vec<Document>>,
    terms: Vec<DocumentTerms>,
    avg_doc_length: f32,
    matrix: EmbeddingMatrix,
    by_id: HashMap<String, usize>,
}

impl CorpusSnapshot {
    /// Prepare a snapshot from the documents handed out by a store.
    ///
    /// Duplicate ids violate the store contract; the first occurrence is kept
    /// and later ones are dropped with a warning.
    pub fn build(documents: Arc<Vec<Document>>) -> Self {
        let documents = dedup_by_id(documents);

        let terms: Vec<DocumentTerms> = documents
            .par_iter()
            .map(|doc| DocumentTerms::from_text(&doc.text))
            .collect();
        let avg_doc_length = average_length(&terms);

        let (matrix, skipped) =
            EmbeddingMatrix::build(documents.iter().map(|doc| doc.embedding.as_slice()));
        for (position, reason) in &skipped {
            warn!(
                document_id = %documents[*position].id,
                error = %reason,
                "Document skipped for dense scoring"
            );
        }
        SKIPPED_DOCUMENTS.inc_by(skipped.len() as f64);

        let by_id = documents
            .iter()
            .enumerate()
            .map(|(position, doc)| (doc.id.clone(), position))
            .collect();

        debug!(
            documents = documents.len(),
            avg_doc_length = avg_doc_length,
            dimension = matrix.dimension(),
            skipped = skipped.len(),
            "Built corpus snapshot"
        );

        Self {
            documents,
            terms,
            avg_doc_length,
            matrix,
            by_id,
        }
    }

    /// Convenience constructor for owned documents.
    pub fn from_documents(documents: Vec<Document>) -> Self {
        Self::build(Arc::new(documents))
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn document(&self, position: usize) -> Option<&Document> {
        self.documents.get(position)
    }

    /// Position of the document with `id`, if present.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.by_id.get(id).copied()
    }

    pub fn get(&self, id: &str) -> Option<&Document> {
        self.position(id).and_then(|p| self.documents.get(p))
    }

    pub fn terms(&self) -> &[DocumentTerms] {
        &self.terms
    }

    /// Mean token count across the snapshot.
    pub fn avg_doc_length(&self) -> f32 {
        self.avg_doc_length
    }

    pub fn matrix(&self) -> &EmbeddingMatrix {
        &self.matrix
    }

    /// Corpus embedding dimension, zero when no document has an embedding.
    pub fn dimension(&self) -> usize {
        self.matrix.dimension()
    }
}

fn dedup_by_id(documents: Arc<Vec<Document>>) -> Arc<Vec<Document>> {
    let mut seen = std::collections::HashSet::with_capacity(documents.len());
    let has_duplicates = documents.iter().any(|doc| !seen.insert(doc.id.as_str()));
    if !has_duplicates {
        return documents;
    }

    let mut seen = std::collections::HashSet::with_capacity(documents.len());
    let unique: Vec<Document> = documents
        .iter()
        .filter(|doc| {
            let first = seen.insert(doc.id.as_str());
            if !first {
                warn!(document_id = %doc.id, "Duplicate document id in snapshot, keeping first");
            }
            first
        })
        .cloned()
        .collect();
    Arc::new(unique)
}
