//! Configuration system for Chronicle.
//!
//! Uses `figment` for layered configuration: defaults -> `chronicle.toml`
//! in the workspace directory -> environment variables prefixed with
//! `CHRONICLE_` (nested fields split on `__`, e.g.
//! `CHRONICLE_GENERATION__HOSTED__MODEL`).

use crate::error::ConfigError;
use crate::providers::BackendKind;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration for the Chronicle pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChronicleConfig {
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub index: IndexConfig,
}

/// Validation bounds and context budget for incoming queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Hard upper bound on query length in characters. Longer queries are
    /// rejected outright.
    #[serde(default = "default_max_query_length")]
    pub max_query_length: usize,
    /// Upper bound on the requested number of retrieved events. Out-of-range
    /// values fall back to `default_top_k` instead of erroring.
    #[serde(default = "default_max_top_k")]
    pub max_top_k: usize,
    /// Number of events retrieved when the request leaves `top_k` unset or
    /// out of range.
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,
    /// Character budget for the formatted context block.
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
}

fn default_max_query_length() -> usize {
    1000
}

fn default_max_top_k() -> usize {
    50
}

fn default_top_k() -> usize {
    5
}

fn default_max_context_chars() -> usize {
    8000
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            max_query_length: default_max_query_length(),
            max_top_k: default_max_top_k(),
            default_top_k: default_top_k(),
            max_context_chars: default_max_context_chars(),
        }
    }
}

/// Configuration for embedding providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Provider name: "hash" (default, always available) or "ollama".
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    /// Provider-specific model name (ignored by the hash embedder).
    #[serde(default)]
    pub model: Option<String>,
    /// Embedding dimensions for the hash embedder.
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
    /// Base URL for remote embedding providers.
    #[serde(default)]
    pub base_url: Option<String>,
}

fn default_embedding_provider() -> String {
    "hash".into()
}

fn default_dimensions() -> usize {
    384
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dimensions: default_dimensions(),
            base_url: None,
        }
    }
}

/// Configuration for the generation backends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Backend used when the request does not name one explicitly.
    #[serde(default = "default_backend")]
    pub default_backend: BackendKind,
    #[serde(default)]
    pub local: LocalBackendConfig,
    #[serde(default)]
    pub hosted: HostedBackendConfig,
}

fn default_backend() -> BackendKind {
    BackendKind::Local
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            default_backend: default_backend(),
            local: LocalBackendConfig::default(),
            hosted: HostedBackendConfig::default(),
        }
    }
}

/// Configuration for the on-box (Ollama-style) backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalBackendConfig {
    /// Base URL of the local inference process.
    #[serde(default = "default_local_base_url")]
    pub base_url: String,
    /// Model identifier to request.
    #[serde(default = "default_local_model")]
    pub model: String,
    /// Request timeout in seconds.
    #[serde(default = "default_local_timeout")]
    pub timeout_secs: u64,
}

fn default_local_base_url() -> String {
    "http://localhost:11434".into()
}

fn default_local_model() -> String {
    "phi3:mini".into()
}

fn default_local_timeout() -> u64 {
    120
}

impl Default for LocalBackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_local_base_url(),
            model: default_local_model(),
            timeout_secs: default_local_timeout(),
        }
    }
}

/// Configuration for the hosted (OpenAI-compatible) backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostedBackendConfig {
    /// Base URL of the hosted completion API.
    #[serde(default = "default_hosted_base_url")]
    pub base_url: String,
    /// Model identifier to request.
    #[serde(default = "default_hosted_model")]
    pub model: String,
    /// Environment variable name containing the API key. The key itself is
    /// resolved lazily on first use, never stored in config files.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Maximum tokens to generate in a response.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Request timeout in seconds.
    #[serde(default = "default_hosted_timeout")]
    pub timeout_secs: u64,
}

fn default_hosted_base_url() -> String {
    "https://api.openai.com/v1".into()
}

fn default_hosted_model() -> String {
    "gpt-4o-mini".into()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}

fn default_max_tokens() -> usize {
    512
}

fn default_temperature() -> f32 {
    0.2
}

fn default_hosted_timeout() -> u64 {
    60
}

impl Default for HostedBackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_hosted_base_url(),
            model: default_hosted_model(),
            api_key_env: default_api_key_env(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_hosted_timeout(),
        }
    }
}

/// Location of the persisted index snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    #[serde(default = "default_index_path")]
    pub path: PathBuf,
}

fn default_index_path() -> PathBuf {
    PathBuf::from(".chronicle/events.idx")
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: default_index_path(),
        }
    }
}

/// Load configuration with layered precedence (highest wins):
///
/// 1. Environment variables (`CHRONICLE_QUERY__DEFAULT_TOP_K`, etc.)
/// 2. Workspace config file (`chronicle.toml` in `workspace`, if present)
/// 3. Built-in defaults
pub fn load_config(workspace: Option<&Path>) -> std::result::Result<ChronicleConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(ChronicleConfig::default()));

    if let Some(ws) = workspace {
        let ws_config = ws.join("chronicle.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    figment = figment.merge(Env::prefixed("CHRONICLE_").split("__"));

    figment.extract().map_err(|e| ConfigError::LoadFailed {
        message: e.to_string(),
    })
}
