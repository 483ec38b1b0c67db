//! Embedding providers consumed by the engine.
//!
//! The engine never computes embeddings itself; it asks an
//! [`EmbeddingProvider`] for query vectors and reads document vectors from
//! the corpus snapshot.

pub mod mock;
mod provider;

pub use mock::{FixedEmbedder, MockEmbedder};
pub use provider::{embed_variants, EmbeddingProvider};
