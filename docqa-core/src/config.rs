//! Configuration for the docqa service.
//!
//! Uses `figment` for layered configuration: built-in defaults, then a
//! `docqa.toml` file, then environment variables prefixed with `DOCQA_`
//! (nested keys separated by `__`, e.g. `DOCQA_SERVER__PORT=8080`).

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::chunker::ChunkingConfig;
use crate::error::ConfigError;

/// Top-level configuration for the docqa service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
}

impl AppConfig {
    /// Validate this config and return any warnings.
    ///
    /// Returns human-readable warning messages for suspect values. Hard
    /// invariants (chunking parameters) are enforced separately when the
    /// engine is constructed.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.retrieval.top_k == 0 {
            warnings.push("retrieval.top_k is 0; every query will retrieve nothing".to_string());
        }
        if self.generation.temperature < 0.0 || self.generation.temperature > 2.0 {
            warnings.push(format!(
                "generation.temperature ({}) is outside the typical range 0.0-2.0",
                self.generation.temperature
            ));
        }
        if self.embedding.api_key_env.is_empty() {
            warnings.push("embedding.api_key_env is empty; no API key can be resolved".to_string());
        }
        if self.generation.api_key_env.is_empty() {
            warnings
                .push("generation.api_key_env is empty; no API key can be resolved".to_string());
        }
        warnings
    }
}

/// HTTP server bind configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Interface to bind.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Vector index storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Filesystem path of the SQLite index. Reopened if it already exists.
    #[serde(default = "default_index_path")]
    pub path: PathBuf,
}

fn default_index_path() -> PathBuf {
    PathBuf::from("./docqa_index.db")
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: default_index_path(),
        }
    }
}

/// Retrieval configuration for query-time search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Number of nearest chunks to retrieve per query.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Minimum cosine similarity for a hit to count as relevant.
    #[serde(default)]
    pub min_score: f32,
}

fn default_top_k() -> usize {
    4
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            min_score: 0.0,
        }
    }
}

/// Embedding provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Embedding model identifier (without the `models/` prefix).
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Optional base URL override for the API endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

fn default_embedding_model() -> String {
    "embedding-001".to_string()
}

fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            api_key_env: default_api_key_env(),
            base_url: None,
        }
    }
}

/// Answer generator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Generation model identifier.
    #[serde(default = "default_generation_model")]
    pub model: String,
    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Maximum tokens to generate per answer.
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Optional base URL override for the API endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

fn default_generation_model() -> String {
    "gemini-1.5-flash".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_max_output_tokens() -> u32 {
    1024
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: default_generation_model(),
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            api_key_env: default_api_key_env(),
            base_url: None,
        }
    }
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Environment variables (prefixed with `DOCQA_`)
/// 2. Explicit config file, if given, else `<dir>/docqa.toml`
/// 3. Built-in defaults
pub fn load_config(dir: Option<&Path>, file: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

    if let Some(file) = file {
        figment = figment.merge(Toml::file(file));
    } else if let Some(dir) = dir {
        let candidate = dir.join("docqa.toml");
        if candidate.exists() {
            figment = figment.merge(Toml::file(&candidate));
        }
    }

    // Environment variables (DOCQA_SERVER__PORT, DOCQA_GENERATION__MODEL, ...)
    figment = figment.merge(Env::prefixed("DOCQA_").split("__"));

    figment.extract().map_err(Box::new).map_err(ConfigError::from)
}
