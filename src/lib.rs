pub mod config;
pub mod corpus;
pub mod embeddings;
pub mod error;
pub mod expansion;
pub mod logging;
pub mod metrics;
pub mod search;

pub use config::{Config, LoggingConfig, SearchConfig};
pub use corpus::{CorpusSnapshot, Document, DocumentStore, InMemoryStore};
pub use error::{Result, RetrievalError};
pub use search::{HybridSearch, PreparedQuery, RankedResult, SearchOptions, Strategy};
