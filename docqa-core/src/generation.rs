//! Answer generation: the provider trait, the Gemini API client, and a
//! scriptable mock for tests.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::config::GenerationConfig;
use crate::error::ProviderError;

/// The default Google Gemini API base URL.
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Trait for answer generators.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generate a completion for a fully rendered prompt.
    async fn generate(&self, prompt: &str) -> Result<String, ProviderError>;

    /// Name of the generation model in use.
    fn model_name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// GeminiGenerator
// ---------------------------------------------------------------------------

/// Google Gemini text generation client, using the `generateContent` endpoint.
pub struct GeminiGenerator {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_output_tokens: u32,
}

impl GeminiGenerator {
    /// Create a new Gemini generator from configuration.
    ///
    /// Reads the API key from the environment variable named in
    /// `config.api_key_env`. Returns `ProviderError::AuthFailed` if the
    /// variable is not set.
    pub fn new(config: &GenerationConfig) -> Result<Self, ProviderError> {
        let api_key =
            std::env::var(&config.api_key_env).map_err(|_| ProviderError::AuthFailed {
                provider: format!("Gemini (env var '{}' not set)", config.api_key_env),
            })?;
        Self::new_with_key(config, api_key)
    }

    /// Create a new Gemini generator with an explicitly provided API key.
    pub fn new_with_key(
        config: &GenerationConfig,
        api_key: String,
    ) -> Result<Self, ProviderError> {
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

        Ok(Self {
            client,
            base_url,
            api_key,
            model: config.model.trim_start_matches("models/").to_string(),
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
        })
    }

    fn endpoint_url(&self, method: &str) -> String {
        format!(
            "{}/models/{}:{}?key={}",
            self.base_url, self.model, method, self.api_key
        )
    }

    fn build_request_body(&self, prompt: &str) -> Value {
        serde_json::json!({
            "contents": [{
                "role": "user",
                "parts": [{"text": prompt}],
            }],
            "generationConfig": {
                "maxOutputTokens": self.max_output_tokens,
                "temperature": self.temperature,
            },
        })
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

    /// Extract generated text from a `generateContent` response.
    ///
    /// Concatenates all text parts of the first candidate. A candidate with
    /// no text parts (for example a safety-blocked completion) yields an
    /// empty string rather than an error.
    fn parse_response(response: &Value) -> Result<String, ProviderError> {
        let candidates = response
            .get("candidates")
            .and_then(|c| c.as_array())
            .ok_or_else(|| ProviderError::ResponseParse {
                message: "missing 'candidates' array in response".to_string(),
            })?;

        let candidate = candidates.first().ok_or_else(|| ProviderError::ResponseParse {
            message: "empty 'candidates' array in response".to_string(),
        })?;

        let mut text = String::new();
        if let Some(parts) = candidate["content"]["parts"].as_array() {
            for part in parts {
                if let Some(t) = part.get("text").and_then(|t| t.as_str()) {
                    text.push_str(t);
                }
            }
        }
        Ok(text)
    }
}

#[async_trait]
impl Generator for GeminiGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        let url = self.endpoint_url("generateContent");
        let body = self.build_request_body(prompt);

        debug!(
            model = self.model.as_str(),
            prompt_chars = prompt.len(),
            "Sending Gemini generation request"
        );

        let response = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .json(&body)
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

        let response_json: Value =
            serde_json::from_str(&body_text).map_err(|e| ProviderError::ResponseParse {
                message: format!("Invalid JSON in response: {}", e),
            })?;

        Self::parse_response(&response_json)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// ---------------------------------------------------------------------------
// MockGenerator
// ---------------------------------------------------------------------------

/// Scriptable generator for tests.
///
/// Returns queued responses in order, falling back to a fixed string when
/// the queue is empty, and records the last prompt it was asked to complete
/// so tests can assert on prompt construction.
pub struct MockGenerator {
    responses: std::sync::Mutex<Vec<String>>,
    last_prompt: std::sync::Mutex<Option<String>>,
    rate_limited: bool,
}

impl MockGenerator {
    pub fn new() -> Self {
        Self {
            responses: std::sync::Mutex::new(Vec::new()),
            last_prompt: std::sync::Mutex::new(None),
            rate_limited: false,
        }
    }

    /// Create a MockGenerator that always returns the given text.
    ///
    /// Queues multiple copies of the response so it can handle multiple calls.
    pub fn with_response(text: &str) -> Self {
        let generator = Self::new();
        for _ in 0..20 {
            generator.queue_response(text);
        }
        generator
    }

    /// A generator whose every call fails with `ProviderError::RateLimited`.
    pub fn rate_limited() -> Self {
        Self {
            responses: std::sync::Mutex::new(Vec::new()),
            last_prompt: std::sync::Mutex::new(None),
            rate_limited: true,
        }
    }

    /// Queue a response to be returned by the next `generate` call.
    pub fn queue_response(&self, text: &str) {
        self.responses.lock().unwrap().push(text.to_string());
    }

    /// The prompt passed to the most recent `generate` call.
    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt.lock().unwrap().clone()
    }
}

impl Default for MockGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Generator for MockGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        *self.last_prompt.lock().unwrap() = Some(prompt.to_string());

        if self.rate_limited {
            return Err(ProviderError::RateLimited {
                retry_after_secs: 30,
            });
        }

        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok("Mock generator: no queued responses available.".to_string())
        } else {
            Ok(responses.remove(0))
        }
    }

    fn model_name(&self) -> &str {
        "mock-generator"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_generator() -> GeminiGenerator {
        let config = GenerationConfig {
            model: "gemini-1.5-flash".to_string(),
            temperature: 0.2,
            max_output_tokens: 1024,
            api_key_env: "UNUSED".to_string(),
            base_url: None,
        };
        GeminiGenerator::new_with_key(&config, "test-key".to_string()).unwrap()
    }

    #[test]
    fn test_endpoint_url() {
        let generator = make_generator();
        let url = generator.endpoint_url("generateContent");
        assert!(url.contains("models/gemini-1.5-flash:generateContent"));
        assert!(url.contains("key=test-key"));
    }

    #[test]
    fn test_build_request_body() {
        let generator = make_generator();
        let body = generator.build_request_body("What is 2+2?");

        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "What is 2+2?");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 1024);
        let temp = body["generationConfig"]["temperature"].as_f64().unwrap();
        assert!((temp - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_parse_response_single_part() {
        let response = serde_json::json!({
            "candidates": [{
                "content": {
                    "parts": [{"text": "Paris is the capital of France."}],
                    "role": "model"
                },
                "finishReason": "STOP"
            }]
        });
        let text = GeminiGenerator::parse_response(&response).unwrap();
        assert_eq!(text, "Paris is the capital of France.");
    }

    #[test]
    fn test_parse_response_concatenates_parts() {
        let response = serde_json::json!({
            "candidates": [{
                "content": {
                    "parts": [{"text": "Part one. "}, {"text": "Part two."}],
                    "role": "model"
                }
            }]
        });
        let text = GeminiGenerator::parse_response(&response).unwrap();
        assert_eq!(text, "Part one. Part two.");
    }

    #[test]
    fn test_parse_response_missing_candidates() {
        let response = serde_json::json!({"error": {"message": "bad request"}});
        let err = GeminiGenerator::parse_response(&response).unwrap_err();
        match err {
            ProviderError::ResponseParse { message } => {
                assert!(message.contains("candidates"));
            }
            other => panic!("Expected ResponseParse, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_response_empty_parts_is_empty_string() {
        let response = serde_json::json!({
            "candidates": [{
                "content": {"parts": [], "role": "model"},
                "finishReason": "SAFETY"
            }]
        });
        let text = GeminiGenerator::parse_response(&response).unwrap();
        assert_eq!(text, "");
    }

    #[test]
    fn test_http_error_mapping() {
        let err = GeminiGenerator::map_http_error(
            reqwest::StatusCode::TOO_MANY_REQUESTS,
            r#"{"error":{"message":"Quota exceeded"}}"#,
        );
        assert!(matches!(
            err,
            ProviderError::RateLimited {
                retry_after_secs: 30
            }
        ));

        let err = GeminiGenerator::map_http_error(
            reqwest::StatusCode::FORBIDDEN,
            r#"{"error":{"message":"Forbidden"}}"#,
        );
        assert!(matches!(err, ProviderError::AuthFailed { .. }));
    }

    #[tokio::test]
    async fn test_mock_generator_returns_queued_responses_in_order() {
        let generator = MockGenerator::new();
        generator.queue_response("first");
        generator.queue_response("second");

        assert_eq!(generator.generate("q1").await.unwrap(), "first");
        assert_eq!(generator.generate("q2").await.unwrap(), "second");
    }

    #[tokio::test]
    async fn test_mock_generator_falls_back_when_queue_empty() {
        let generator = MockGenerator::new();
        let answer = generator.generate("anything").await.unwrap();
        assert!(answer.contains("no queued responses"));
    }

    #[tokio::test]
    async fn test_mock_generator_with_response_handles_many_calls() {
        let generator = MockGenerator::with_response("always this");
        for _ in 0..5 {
            assert_eq!(generator.generate("q").await.unwrap(), "always this");
        }
    }

    #[tokio::test]
    async fn test_mock_generator_records_last_prompt() {
        let generator = MockGenerator::with_response("ok");
        assert!(generator.last_prompt().is_none());

        generator.generate("tell me about rust").await.unwrap();
        assert_eq!(
            generator.last_prompt().as_deref(),
            Some("tell me about rust")
        );
    }

    #[tokio::test]
    async fn test_mock_generator_rate_limited() {
        let generator = MockGenerator::rate_limited();
        let err = generator.generate("q").await.unwrap_err();
        assert!(matches!(err, ProviderError::RateLimited { .. }));
        // Prompt is still recorded even when the call fails.
        assert_eq!(generator.last_prompt().as_deref(), Some("q"));
    }
}
