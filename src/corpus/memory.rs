use anyhow::Result;
use async_trait::async_trait;
use std::sync::{Arc, RwLock};
use tracing::debug;

use super::{Document, DocumentStore};

/// Document store held entirely in memory.
///
/// Every mutation swaps in a fresh `Arc`, so snapshots handed out earlier
/// keep seeing the documents as they were.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    documents: RwLock<Arc<Vec<Document>>>,
}

impl InMemoryStore {
    pub fn new(documents: Vec<Document>) -> Self {
        Self {
            documents: RwLock::new(Arc::new(documents)),
        }
    }

    /// Replace the whole corpus.
    pub fn replace(&self, documents: Vec<Document>) {
        let count = documents.len();
        *self.write() = Arc::new(documents);
        debug!(documents = count, "Replaced in-memory corpus");
    }

    /// Insert a document, overwriting any document with the same id.
    pub fn upsert(&self, document: Document) {
        let mut guard = self.write();
        let mut next: Vec<Document> = guard.iter().filter(|d| d.id != document.id).cloned().collect();
        next.push(document);
        *guard = Arc::new(next);
    }

    /// Remove a document by id. Returns whether it existed.
    pub fn remove(&self, id: &str) -> bool {
        let mut guard = self.write();
        let before = guard.len();
        let next: Vec<Document> = guard.iter().filter(|d| d.id != id).cloned().collect();
        let removed = next.len() != before;
        *guard = Arc::new(next);
        removed
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Arc<Vec<Document>>> {
        // A writer that panicked mid-swap cannot leave a torn Arc behind
        self.documents.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Arc<Vec<Document>>> {
        self.documents.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn list_documents(&self) -> Result<Arc<Vec<Document>>> {
        Ok(Arc::clone(&self.read()))
    }
}
