//! Hosted generation backend speaking an OpenAI-compatible completion API.

use crate::config::HostedBackendConfig;
use crate::error::GenerationError;
use crate::providers::{GenerationBackend, map_transport_error};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::debug;

/// Lazily-initialized credential + HTTP client pair. Only one instance is
/// ever retained per process.
struct HostedClient {
    http: Client,
    api_key: String,
}

/// Backend for a remote hosted completion API.
///
/// The API key is resolved from the configured environment variable on first
/// use. A missing credential is reported as [`GenerationError::MissingCredential`]
/// before any network call is attempted — it never shows up as a remote 4xx.
pub struct HostedBackend {
    base_url: String,
    model: String,
    api_key_env: String,
    max_tokens: usize,
    temperature: f32,
    timeout_secs: u64,
    client: OnceLock<HostedClient>,
}

impl HostedBackend {
    pub fn new(config: &HostedBackendConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            api_key_env: config.api_key_env.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            timeout_secs: config.timeout_secs,
            client: OnceLock::new(),
        }
    }

    /// Resolve the credential and client, initializing them on first use.
    ///
    /// Safe under concurrent first use: racing callers may each resolve the
    /// env var and build a client, but `OnceLock::get_or_init` stores
    /// exactly one; the rest are dropped without ever sending a request.
    fn client(&self) -> Result<&HostedClient, GenerationError> {
        if let Some(client) = self.client.get() {
            return Ok(client);
        }

        let api_key = std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| GenerationError::MissingCredential {
                env_var: self.api_key_env.clone(),
            })?;

        let http = Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()
            .map_err(|e| GenerationError::Connection {
                message: format!("failed to construct HTTP client: {e}"),
            })?;

        Ok(self.client.get_or_init(|| HostedClient { http, api_key }))
    }

    /// Extract the assistant text from an OpenAI-format response body.
    fn parse_response(body: &Value) -> Result<String, GenerationError> {
        body["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| GenerationError::ResponseParse {
                message: "no choices[0].message.content in hosted response".into(),
            })
    }
}

#[async_trait]
impl GenerationBackend for HostedBackend {
    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, GenerationError> {
        // Credential check happens before anything touches the network.
        let client = self.client()?;

        let url = format!("{}/chat/completions", self.base_url);
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_prompt },
            ],
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
        });

        debug!(model = %self.model, url = %url, "Dispatching to hosted backend");

        let resp = client
            .http
            .post(&url)
            .bearer_auth(&client.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_transport_error(e, self.timeout_secs))?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(GenerationError::ApiRequest {
                message: format!(
                    "hosted backend returned {status}: {}",
                    detail.chars().take(200).collect::<String>()
                ),
            });
        }

        let json: Value = resp
            .json()
            .await
            .map_err(|e| GenerationError::ResponseParse {
                message: format!("hosted backend response was not JSON: {e}"),
            })?;

        Self::parse_response(&json)
    }

    fn name(&self) -> &'static str {
        "hosted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_env(env_var: &str) -> HostedBackendConfig {
        HostedBackendConfig {
            api_key_env: env_var.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_response_extracts_content() {
        let body = json!({
            "choices": [
                { "message": { "role": "assistant", "content": "<p>Answer</p>" } }
            ]
        });
        assert_eq!(
            HostedBackend::parse_response(&body).unwrap(),
            "<p>Answer</p>"
        );
    }

    #[test]
    fn test_parse_response_missing_choices() {
        let body = json!({ "error": { "message": "overloaded" } });
        let err = HostedBackend::parse_response(&body).unwrap_err();
        assert!(matches!(err, GenerationError::ResponseParse { .. }));
    }

    #[tokio::test]
    async fn test_missing_credential_before_any_network_call() {
        unsafe { std::env::remove_var("CHRONICLE_TEST_ABSENT_KEY") };
        let backend = HostedBackend::new(&config_with_env("CHRONICLE_TEST_ABSENT_KEY"));

        let err = backend.generate("sys", "user").await.unwrap_err();
        match err {
            GenerationError::MissingCredential { env_var } => {
                assert_eq!(env_var, "CHRONICLE_TEST_ABSENT_KEY");
            }
            other => panic!("expected MissingCredential, got {other:?}"),
        }
        // The client was never constructed, so no request could have left
        // the process.
        assert!(backend.client.get().is_none());
    }

    #[tokio::test]
    async fn test_blank_credential_is_missing() {
        unsafe { std::env::set_var("CHRONICLE_TEST_BLANK_KEY", "   ") };
        let backend = HostedBackend::new(&config_with_env("CHRONICLE_TEST_BLANK_KEY"));
        let err = backend.generate("sys", "user").await.unwrap_err();
        assert!(matches!(err, GenerationError::MissingCredential { .. }));
        assert!(!err.is_retryable());
        unsafe { std::env::remove_var("CHRONICLE_TEST_BLANK_KEY") };
    }

    #[test]
    fn test_client_initialized_once() {
        unsafe { std::env::set_var("CHRONICLE_TEST_ONCE_KEY", "sk-test") };
        let backend = HostedBackend::new(&config_with_env("CHRONICLE_TEST_ONCE_KEY"));

        let first = backend.client().unwrap() as *const HostedClient;
        // Changing the env var afterwards does not re-resolve the credential.
        unsafe { std::env::set_var("CHRONICLE_TEST_ONCE_KEY", "sk-other") };
        let second = backend.client().unwrap() as *const HostedClient;
        assert_eq!(first, second);
        assert_eq!(backend.client.get().unwrap().api_key, "sk-test");
        unsafe { std::env::remove_var("CHRONICLE_TEST_ONCE_KEY") };
    }
}
