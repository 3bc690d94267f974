//! Text embedding: the provider trait, the Gemini API client, and a
//! deterministic in-process mock for tests.
//!
//! Gemini specifics:
//! - Auth via `?key=API_KEY` query parameter (not header-based)
//! - Single texts use `embedContent`, batches use `batchEmbedContents`
//! - Batch requests are capped at 100 texts per call

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::config::EmbeddingConfig;
use crate::error::ProviderError;

/// The default Google Gemini API base URL.
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Gemini's documented ceiling on texts per batch embedding call.
const MAX_BATCH_SIZE: usize = 100;

/// Trait for embedding providers.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single text into a fixed-dimension vector.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;

    /// Embed a batch of texts, in order.
    ///
    /// The default implementation loops over [`Embedder::embed`]; providers
    /// with a batch endpoint should override it.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }

    /// Name of the embedding model in use.
    fn model_name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// GeminiEmbedder
// ---------------------------------------------------------------------------

/// Google Gemini embedding client.
pub struct GeminiEmbedder {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl GeminiEmbedder {
    /// Create a new Gemini embedder from configuration.
    ///
    /// Reads the API key from the environment variable named in
    /// `config.api_key_env`. Returns `ProviderError::AuthFailed` if the
    /// variable is not set.
    pub fn new(config: &EmbeddingConfig) -> Result<Self, ProviderError> {
        let api_key =
            std::env::var(&config.api_key_env).map_err(|_| ProviderError::AuthFailed {
                provider: format!("Gemini (env var '{}' not set)", config.api_key_env),
            })?;
        Self::new_with_key(config, api_key)
    }

    /// Create a new Gemini embedder with an explicitly provided API key.
    pub fn new_with_key(config: &EmbeddingConfig, api_key: String) -> Result<Self, ProviderError> {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ProviderError::Connection {
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        // Accept both "embedding-001" and "models/embedding-001" notation.
        let model = config.model.trim_start_matches("models/").to_string();

        Ok(Self {
            client,
            base_url,
            api_key,
            model,
        })
    }

    /// Build the endpoint URL for a Gemini API call.
    fn endpoint_url(&self, method: &str) -> String {
        format!(
            "{}/models/{}:{}?key={}",
            self.base_url, self.model, method, self.api_key
        )
    }

    /// Map an HTTP status code to the appropriate `ProviderError`.
    fn map_http_error(status: reqwest::StatusCode, body_text: &str) -> ProviderError {
        match status.as_u16() {
            401 | 403 => ProviderError::AuthFailed {
                provider: "Gemini".to_string(),
            },
            429 => ProviderError::RateLimited {
                retry_after_secs: 30,
            },
            _ => ProviderError::ApiRequest {
                message: format!("HTTP {} from Gemini API: {}", status, body_text),
            },
        }
    }

    /// Extract the `values` array of one embedding object.
    fn parse_embedding(embedding: &Value) -> Result<Vec<f32>, ProviderError> {
        let values = embedding
            .get("values")
            .and_then(|v| v.as_array())
            .ok_or_else(|| ProviderError::ResponseParse {
                message: "missing 'values' array in embedding response".to_string(),
            })?;

        values
            .iter()
            .map(|v| {
                v.as_f64()
                    .map(|f| f as f32)
                    .ok_or_else(|| ProviderError::ResponseParse {
                        message: "non-numeric entry in embedding values".to_string(),
                    })
            })
            .collect()
    }

    fn content_json(&self, text: &str) -> Value {
        serde_json::json!({
            "model": format!("models/{}", self.model),
            "content": {"parts": [{"text": text}]},
        })
    }

    async fn post_json(&self, url: &str, body: &Value) -> Result<Value, ProviderError> {
        let response = self
            .client
            .post(url)
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::ApiRequest {
                message: format!("Request to Gemini API failed: {}", e),
            })?;

        let status = response.status();
        let body_text = response
            .text()
            .await
            .map_err(|e| ProviderError::ResponseParse {
                message: format!("Failed to read response body: {}", e),
            })?;

        if !status.is_success() {
            return Err(Self::map_http_error(status, &body_text));
        }

        serde_json::from_str(&body_text).map_err(|e| ProviderError::ResponseParse {
            message: format!("Invalid JSON in response: {}", e),
        })
    }
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let url = self.endpoint_url("embedContent");
        let body = self.content_json(text);

        debug!(model = self.model.as_str(), "Sending Gemini embedding request");

        let response_json = self.post_json(&url, &body).await?;
        let embedding =
            response_json
                .get("embedding")
                .ok_or_else(|| ProviderError::ResponseParse {
                    message: "missing 'embedding' in response".to_string(),
                })?;
        Self::parse_embedding(embedding)
    }

    /// Embed texts via `batchEmbedContents`, splitting into API-sized batches.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = self.endpoint_url("batchEmbedContents");
        let mut vectors = Vec::with_capacity(texts.len());

        for batch in texts.chunks(MAX_BATCH_SIZE) {
            let requests: Vec<Value> = batch.iter().map(|t| self.content_json(t)).collect();
            let body = serde_json::json!({ "requests": requests });

            debug!(
                model = self.model.as_str(),
                count = batch.len(),
                "Sending Gemini batch embedding request"
            );

            let response_json = self.post_json(&url, &body).await?;
            let embeddings = response_json
                .get("embeddings")
                .and_then(|v| v.as_array())
                .ok_or_else(|| ProviderError::ResponseParse {
                    message: "missing 'embeddings' array in batch response".to_string(),
                })?;

            if embeddings.len() != batch.len() {
                return Err(ProviderError::ResponseParse {
                    message: format!(
                        "expected {} embeddings in batch response, got {}",
                        batch.len(),
                        embeddings.len()
                    ),
                });
            }

            for embedding in embeddings {
                vectors.push(Self::parse_embedding(embedding)?);
            }
        }

        Ok(vectors)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// ---------------------------------------------------------------------------
// MockEmbedder
// ---------------------------------------------------------------------------

/// Deterministic hash-based embedder for tests.
///
/// Hashes term frequencies into a fixed number of dimensions and L2
/// normalizes the result. Similar texts get similar vectors, which is enough
/// to exercise retrieval end to end without network access. Can also be
/// configured to fail every call with a rate-limit error.
pub struct MockEmbedder {
    dimensions: usize,
    rate_limited: bool,
}

impl MockEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            rate_limited: false,
        }
    }

    /// An embedder whose every call fails with `ProviderError::RateLimited`.
    pub fn rate_limited() -> Self {
        Self {
            dimensions: 64,
            rate_limited: true,
        }
    }

    fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];

        let lowered = text.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        if words.is_empty() {
            return vector;
        }

        let mut tf: HashMap<&str, usize> = HashMap::new();
        for word in &words {
            *tf.entry(word).or_insert(0) += 1;
        }

        for (term, count) in &tf {
            let idx = simple_hash(term) % self.dimensions;
            vector[idx] += *count as f32;
        }

        // L2 normalize
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }

        vector
    }
}

/// djb2 string hash.
fn simple_hash(s: &str) -> usize {
    let mut hash: usize = 5381;
    for b in s.bytes() {
        hash = hash.wrapping_mul(33).wrapping_add(b as usize);
    }
    hash
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        if self.rate_limited {
            return Err(ProviderError::RateLimited {
                retry_after_secs: 30,
            });
        }
        Ok(self.embed_sync(text))
    }

    fn model_name(&self) -> &str {
        "mock-embedder"
    }
}
