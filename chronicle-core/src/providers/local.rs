//! On-box generation backend speaking the Ollama chat API.

use crate::config::LocalBackendConfig;
use crate::error::GenerationError;
use crate::providers::{GenerationBackend, map_transport_error};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

/// Backend that talks to a local inference process (Ollama, or anything
/// speaking its `/api/chat` endpoint). Process unreachable, model not
/// loaded, and malformed responses all normalize into the generation error
/// taxonomy.
pub struct LocalBackend {
    client: Client,
    base_url: String,
    model: String,
    timeout_secs: u64,
}

impl LocalBackend {
    pub fn new(config: &LocalBackendConfig) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GenerationError::Connection {
                message: format!("failed to construct HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            timeout_secs: config.timeout_secs,
        })
    }

    /// Extract the assistant text from an Ollama chat response body.
    fn parse_response(body: &Value) -> Result<String, GenerationError> {
        body["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| GenerationError::ResponseParse {
                message: "no message.content in local backend response".into(),
            })
    }
}

#[async_trait]
impl GenerationBackend for LocalBackend {
    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, GenerationError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_prompt },
            ],
            "stream": false,
        });

        debug!(model = %self.model, url = %url, "Dispatching to local backend");

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_transport_error(e, self.timeout_secs))?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(GenerationError::ApiRequest {
                message: format!(
                    "local backend returned {status}: {}",
                    detail.chars().take(200).collect::<String>()
                ),
            });
        }

        let json: Value = resp
            .json()
            .await
            .map_err(|e| GenerationError::ResponseParse {
                message: format!("local backend response was not JSON: {e}"),
            })?;

        Self::parse_response(&json)
    }

    fn name(&self) -> &'static str {
        "local"
    }
}
