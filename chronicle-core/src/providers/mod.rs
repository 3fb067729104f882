//! Generation backend implementations.
//!
//! Provides the `GenerationBackend` trait and two concrete backends:
//! - `LocalBackend` — an on-box inference process speaking the Ollama chat API
//! - `HostedBackend` — a remote OpenAI-compatible completion API
//!
//! Backend selection is always explicit via [`BackendKind`]; there is no
//! fallback from one backend to the other, and no retries — a failed
//! generation surfaces as-is.

pub mod hosted;
pub mod local;

use crate::config::GenerationConfig;
use crate::error::GenerationError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

pub use hosted::HostedBackend;
pub use local::LocalBackend;

/// Trait for generation backends: turn a (system prompt, user prompt) pair
/// into raw text, or fail. The instruction contract in the system prompt is
/// owned by the orchestrator, so sanitization expectations are
/// backend-independent.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, GenerationError>;

    /// Return the backend name for logging.
    fn name(&self) -> &'static str;
}

/// The closed set of backend variants a request can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Local,
    Hosted,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Local => write!(f, "local"),
            BackendKind::Hosted => write!(f, "hosted"),
        }
    }
}

/// Create a backend of the given kind from configuration.
pub fn create_backend(
    kind: BackendKind,
    config: &GenerationConfig,
) -> Result<Arc<dyn GenerationBackend>, GenerationError> {
    match kind {
        BackendKind::Local => Ok(Arc::new(LocalBackend::new(&config.local)?)),
        BackendKind::Hosted => Ok(Arc::new(HostedBackend::new(&config.hosted))),
    }
}

/// Normalize a reqwest transport error into the generation taxonomy.
pub(crate) fn map_transport_error(err: reqwest::Error, timeout_secs: u64) -> GenerationError {
    if err.is_timeout() {
        GenerationError::Timeout { timeout_secs }
    } else if err.is_connect() {
        GenerationError::Connection {
            message: err.to_string(),
        }
    } else {
        GenerationError::ApiRequest {
            message: err.to_string(),
        }
    }
}

/// Scripted backend for tests.
///
/// Replays a fixed response (or error) and counts invocations, so tests can
/// assert that a stage was — or was not — reached.
pub struct MockBackend {
    response: Result<String, String>,
    calls: AtomicUsize,
}

impl MockBackend {
    /// A mock that always answers with `response`.
    pub fn replying(response: impl Into<String>) -> Self {
        Self {
            response: Ok(response.into()),
            calls: AtomicUsize::new(0),
        }
    }

    /// A mock that always fails with an `ApiRequest` error.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            response: Err(message.into()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of times `generate` has been called.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationBackend for MockBackend {
    async fn generate(
        &self,
        _system_prompt: &str,
        _user_prompt: &str,
    ) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.response {
            Ok(text) => Ok(text.clone()),
            Err(message) => Err(GenerationError::ApiRequest {
                message: message.clone(),
            }),
        }
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
