//! Pluggable embedding providers.
//!
//! Provides a trait-based abstraction over embedding models, with a
//! deterministic hashed bag-of-words implementation (always available, no
//! external dependencies) and an Ollama API implementation. Embedding
//! failures propagate to the caller; a failed embedding is never replaced
//! with a zero vector, since retrieval over a zero vector would silently
//! return garbage.

use crate::config::EmbeddingConfig;
use crate::error::EmbeddingError;
use std::collections::HashMap;

/// Trait for embedding providers. Embeddings must be deterministic for
/// identical input.
pub trait Embedder: Send + Sync {
    /// Generate an embedding for a single text.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Generate embeddings for a batch of texts.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    /// Return the dimensionality of embeddings.
    fn dimensions(&self) -> usize;

    /// Return the provider name.
    fn provider_name(&self) -> &str;
}

/// Deterministic hashed bag-of-words embedder.
///
/// Each word is hashed to a dimension index and its term frequency
/// accumulated; the result is L2-normalised. Crude, but fully offline and
/// deterministic, which makes it the default for tests and air-gapped runs.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

fn term_hash(s: &str) -> usize {
    let mut hash: usize = 5381;
    for b in s.bytes() {
        hash = hash.wrapping_mul(33).wrapping_add(b as usize);
    }
    hash
}

impl Embedder for HashEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vector = vec![0.0f32; self.dimensions];

        let lowered = text.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        if words.is_empty() {
            return Ok(vector);
        }

        let mut tf: HashMap<&str, usize> = HashMap::new();
        for word in &words {
            *tf.entry(word).or_insert(0) += 1;
        }

        for (term, count) in &tf {
            let idx = term_hash(term) % self.dimensions;
            vector[idx] += *count as f32;
        }

        // L2 normalise
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }

        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn provider_name(&self) -> &str {
        "hash"
    }
}

/// Ollama embedder (uses the local Ollama embedding API).
pub struct OllamaEmbedder {
    client: reqwest::Client,
    model: String,
    dims: usize,
    base_url: String,
}

impl OllamaEmbedder {
    pub fn new(model: Option<String>, base_url: Option<String>) -> Self {
        let model = model.unwrap_or_else(|| "nomic-embed-text".into());
        let dims = match model.as_str() {
            "nomic-embed-text" => 768,
            "mxbai-embed-large" => 1024,
            "all-minilm" => 384,
            _ => 768,
        };
        Self {
            client: reqwest::Client::new(),
            model,
            dims,
            base_url: base_url.unwrap_or_else(|| "http://localhost:11434".into()),
        }
    }

    fn embed_sync(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        // The Embedder trait is sync; block on the async HTTP call from a
        // scoped thread so we never block the async runtime itself.
        let handle =
            tokio::runtime::Handle::try_current().map_err(|_| EmbeddingError::Failed {
                message: "no tokio runtime available for Ollama embedding".into(),
            })?;

        let client = self.client.clone();
        let model = self.model.clone();
        let base_url = self.base_url.clone();
        let text = text.to_string();

        std::thread::scope(|s| {
            s.spawn(|| {
                handle.block_on(async {
                    Self::embed_api_call(&client, &model, &base_url, &text).await
                })
            })
            .join()
            .unwrap_or_else(|_| {
                Err(EmbeddingError::Failed {
                    message: "embedding worker thread panicked".into(),
                })
            })
        })
    }

    async fn embed_api_call(
        client: &reqwest::Client,
        model: &str,
        base_url: &str,
        text: &str,
    ) -> Result<Vec<f32>, EmbeddingError> {
        let url = format!("{}/api/embed", base_url);
        let body = serde_json::json!({
            "model": model,
            "input": text,
        });

        let resp = client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| EmbeddingError::Failed {
                message: format!("Ollama request failed: {e}"),
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(EmbeddingError::Failed {
                message: format!("Ollama returned {status}"),
            });
        }

        let json: serde_json::Value =
            resp.json().await.map_err(|e| EmbeddingError::Failed {
                message: format!("Ollama response was not JSON: {e}"),
            })?;

        json["embeddings"][0]
            .as_array()
            .map(|embedding| {
                embedding
                    .iter()
                    .filter_map(|v| v.as_f64().map(|f| f as f32))
                    .collect()
            })
            .ok_or_else(|| EmbeddingError::Failed {
                message: "Ollama response missing embeddings[0]".into(),
            })
    }
}

impl Embedder for OllamaEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed_sync(text)
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn provider_name(&self) -> &str {
        "ollama"
    }
}

/// Create an embedder based on configuration.
pub fn create_embedder(config: &EmbeddingConfig) -> Box<dyn Embedder> {
    match config.provider.as_str() {
        "ollama" => Box::new(OllamaEmbedder::new(
            config.model.clone(),
            config.base_url.clone(),
        )),
        other => {
            if other != "hash" {
                tracing::warn!(
                    provider = other,
                    "Unknown embedding provider, falling back to hash"
                );
            }
            let dims = if config.dimensions > 0 {
                config.dimensions
            } else {
                384
            };
            Box::new(HashEmbedder::new(dims))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_embedder_dimensions() {
        let embedder = HashEmbedder::new(128);
        assert_eq!(embedder.dimensions(), 128);
        let v = embedder.embed("hello world").unwrap();
        assert_eq!(v.len(), 128);
    }

    #[test]
    fn test_hash_embedder_normalized() {
        let embedder = HashEmbedder::new(128);
        let v = embedder.embed("velvet revolution in prague").unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!(
            (norm - 1.0).abs() < 0.01,
            "Expected normalized vector, got norm={}",
            norm
        );
    }

    #[test]
    fn test_hash_embedder_empty_text() {
        let embedder = HashEmbedder::new(128);
        let v = embedder.embed("").unwrap();
        assert_eq!(v.len(), 128);
        assert!(v.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_hash_embedder_deterministic() {
        let embedder = HashEmbedder::new(128);
        let v1 = embedder.embed("same text").unwrap();
        let v2 = embedder.embed("same text").unwrap();
        assert_eq!(v1, v2);
    }

    #[test]
    fn test_hash_embedder_different_texts_differ() {
        let embedder = HashEmbedder::new(128);
        let v1 = embedder.embed("hello world").unwrap();
        let v2 = embedder.embed("goodbye universe").unwrap();
        assert_ne!(v1, v2);
    }

    #[test]
    fn test_embed_batch_default() {
        let embedder = HashEmbedder::new(64);
        let embeddings = embedder.embed_batch(&["hello", "world", "test"]).unwrap();
        assert_eq!(embeddings.len(), 3);
        for emb in &embeddings {
            assert_eq!(emb.len(), 64);
        }
    }

    #[test]
    fn test_embedder_trait_object() {
        let embedder: Box<dyn Embedder> = Box::new(HashEmbedder::new(128));
        assert_eq!(embedder.dimensions(), 128);
        assert_eq!(embedder.provider_name(), "hash");
    }

    #[test]
    fn test_create_embedder_default() {
        let config = EmbeddingConfig::default();
        let embedder = create_embedder(&config);
        assert_eq!(embedder.provider_name(), "hash");
        assert_eq!(embedder.dimensions(), 384);
    }

    #[test]
    fn test_create_embedder_unknown_falls_back_to_hash() {
        let config = EmbeddingConfig {
            provider: "fastembed".into(),
            dimensions: 256,
            ..Default::default()
        };
        let embedder = create_embedder(&config);
        assert_eq!(embedder.provider_name(), "hash");
        assert_eq!(embedder.dimensions(), 256);
    }

    #[test]
    fn test_create_embedder_zero_dimensions_uses_default() {
        let config = EmbeddingConfig {
            dimensions: 0,
            ..Default::default()
        };
        let embedder = create_embedder(&config);
        assert_eq!(embedder.dimensions(), 384);
    }

    #[test]
    fn test_ollama_embedder_dimensions() {
        let embedder = OllamaEmbedder::new(None, None);
        assert_eq!(embedder.dimensions(), 768); // nomic-embed-text default
    }
}
