//! # docqa-core
//!
//! Core library for the docqa document question-answering service.
//! Provides document loaders (PDF, URL), fixed-size chunking, embedding and
//! generation provider clients, a persistent SQLite vector index, and the
//! RAG engine that ties them together.

pub mod chunker;
pub mod config;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod generation;
pub mod index;
pub mod loader;

// Re-export commonly used types at the crate root.
pub use chunker::{Chunk, ChunkingConfig};
pub use config::{
    AppConfig, EmbeddingConfig, GenerationConfig, IndexConfig, RetrievalConfig, ServerConfig,
    load_config,
};
pub use embedding::{Embedder, GeminiEmbedder, MockEmbedder};
pub use engine::{
    EMBEDDING_QUOTA_MESSAGE, EMPTY_INDEX_MESSAGE, GENERATION_QUOTA_MESSAGE, IngestReport,
    NO_CONTEXT_MESSAGE, RagEngine,
};
pub use error::{
    ConfigError, IndexError, LoadError, ProviderError, RagError, Result,
};
pub use generation::{GeminiGenerator, Generator, MockGenerator};
pub use index::{IndexEntry, IndexStats, SearchHit, VectorIndex};
pub use loader::{Document, PdfLoader, UrlLoader};
