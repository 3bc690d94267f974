//! Error types for the docqa core library.
//!
//! Uses `thiserror` for public API error types with structured variants
//! covering document loading, embedding/generation providers, the vector
//! index, and configuration. Rate limiting is a typed variant decided at
//! the provider boundary, never inferred from message strings downstream.

use std::path::PathBuf;

/// Top-level error type for the docqa core library.
#[derive(Debug, thiserror::Error)]
pub enum RagError {
    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    #[error("Embedding error: {0}")]
    Embedding(ProviderError),

    #[error("Generation error: {0}")]
    Generation(ProviderError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl RagError {
    /// Whether this error is a provider rate limit (quota exhaustion).
    pub fn is_rate_limited(&self) -> bool {
        matches!(
            self,
            RagError::Embedding(ProviderError::RateLimited { .. })
                | RagError::Generation(ProviderError::RateLimited { .. })
        )
    }
}

/// Errors from remote provider interactions (embedding and generation).
///
/// Variants are assigned from the HTTP response at the client boundary:
/// 401/403 map to `AuthFailed`, 429 to `RateLimited`, any other non-2xx
/// to `ApiRequest`.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Provider connection failed: {message}")]
    Connection { message: String },
}

/// Errors from document loaders (PDF files and URLs).
///
/// `EmptyDocument` carries the document's source identifier (file name or
/// URL) as `origin`; there is no underlying cause to chain.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to extract text from PDF {path}: {message}")]
    PdfParse { path: PathBuf, message: String },

    #[error("Failed to fetch {url}: {message}")]
    Fetch { url: String, message: String },

    #[error("HTTP {status} fetching {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Unsupported content type '{content_type}' at {url}")]
    UnsupportedContent { url: String, content_type: String },

    #[error("No extractable text in {origin}")]
    EmptyDocument { origin: String },
}

/// Errors from the vector index storage layer.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("Invalid chunking configuration: {message}")]
    InvalidChunking { message: String },
}

/// A type alias for results using the top-level `RagError`.
pub type Result<T> = std::result::Result<T, RagError>;
