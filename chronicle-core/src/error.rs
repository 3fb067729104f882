//! Error types for the Chronicle core library.
//!
//! Uses `thiserror` for public API error types with structured variants
//! covering query validation, corpus, index, embedding, and generation
//! domains.

/// Top-level error type for the Chronicle core library.
#[derive(Debug, thiserror::Error)]
pub enum ChronicleError {
    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    #[error("Corpus error: {0}")]
    Corpus(#[from] CorpusError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Validation errors for an incoming query. Caller mistakes — reported,
/// never retried.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("Query text is empty or whitespace-only")]
    Empty,

    #[error("Query too long: {length} chars exceeds limit of {max}")]
    TooLong { length: usize, max: usize },
}

/// Errors from the corpus of event records.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CorpusError {
    #[error("Corpus is empty: no rows to load")]
    Empty,

    #[error("Record position {position} out of range for corpus of {len}")]
    OutOfRange { position: usize, len: usize },
}

/// Errors from the vector index.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum IndexError {
    #[error("Cannot build an index over zero vectors")]
    EmptyCorpus,

    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid k: {k} (must be at least 1)")]
    InvalidK { k: usize },

    #[error("Corrupt index file: {message}")]
    Corrupt { message: String },
}

/// Errors from embedding providers. Opaque to callers beyond the cause
/// string; embedding is assumed deterministic, so these are never retried.
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("Embedding failed: {message}")]
    Failed { message: String },
}

/// Errors from generation backends.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("Credential missing: env var '{env_var}' not set")]
    MissingCredential { env_var: String },

    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Backend connection failed: {message}")]
    Connection { message: String },

    #[error("Generation timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },
}

impl GenerationError {
    /// Whether a caller could reasonably retry this failure. Transport-level
    /// failures are transient; credential, request, and parse failures are
    /// permanent. No retries happen inside the pipeline either way — this is
    /// advisory for the external caller.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GenerationError::Connection { .. } | GenerationError::Timeout { .. }
        )
    }
}

/// Errors from configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration load failed: {message}")]
    LoadFailed { message: String },
}

/// A type alias for results using the top-level `ChronicleError`.
pub type Result<T> = std::result::Result<T, ChronicleError>;
