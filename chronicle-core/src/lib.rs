//! # Chronicle Core
//!
//! Core library for the Chronicle question-answering pipeline over a corpus
//! of historical events. Provides the corpus loader, vector index, semantic
//! retriever, context formatter, generation backends, response sanitizer,
//! and the orchestrator that drives one query through all of them.

pub mod config;
pub mod context;
pub mod corpus;
pub mod embeddings;
pub mod error;
pub mod index;
pub mod pipeline;
pub mod providers;
pub mod retriever;
pub mod sanitize;

// Re-export commonly used types at the crate root.
pub use config::{ChronicleConfig, load_config};
pub use context::{ContextBlock, ContextFormatter};
pub use corpus::{Corpus, EventRecord, EventRow};
pub use embeddings::{Embedder, HashEmbedder, OllamaEmbedder, create_embedder};
pub use error::{ChronicleError, Result};
pub use index::VectorIndex;
pub use pipeline::{Pipeline, QueryRequest, QueryResponse};
pub use providers::{BackendKind, GenerationBackend, MockBackend, create_backend};
pub use retriever::{KnowledgeBase, RetrievedEvent, retrieve};
pub use sanitize::sanitize_response;
