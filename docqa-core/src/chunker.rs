//! Fixed-size document chunking with overlap.
//!
//! Splits document text into bounded segments on character boundaries.
//! Every chunk after the first starts `chunk_overlap` characters before
//! the end of its predecessor, so no text is lost at segment boundaries.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::loader::Document;

/// Chunking parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks of one document.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

fn default_chunk_size() -> usize {
    1000
}

fn default_chunk_overlap() -> usize {
    100
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

impl ChunkingConfig {
    /// Validate the chunking invariants.
    ///
    /// `chunk_size` must be positive and `chunk_overlap` strictly smaller
    /// than `chunk_size`, otherwise the sliding window cannot advance.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::InvalidChunking {
                message: "chunk_size must be greater than 0".to_string(),
            });
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ConfigError::InvalidChunking {
                message: format!(
                    "chunk_overlap ({}) must be smaller than chunk_size ({})",
                    self.chunk_overlap, self.chunk_size
                ),
            });
        }
        Ok(())
    }
}

/// A bounded segment of a document, carrying its source identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Source identifier inherited from the document (file name or URL).
    pub source: String,
    /// Position of this chunk within its document, starting at 0.
    pub chunk_index: usize,
    /// The chunk text.
    pub text: String,
}

/// Split one document into overlapping fixed-size chunks.
///
/// Operates on `char` boundaries so multibyte text never splits mid-glyph.
/// The caller is expected to have validated `config` (see
/// [`ChunkingConfig::validate`]); an unvalidated config with
/// `chunk_overlap >= chunk_size` would stall the window.
pub fn chunk_document(doc: &Document, config: &ChunkingConfig) -> Vec<Chunk> {
    let chars: Vec<char> = doc.text.chars().collect();
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut idx = 0;

    while start < chars.len() {
        let end = (start + config.chunk_size).min(chars.len());
        let text: String = chars[start..end].iter().collect();
        chunks.push(Chunk {
            source: doc.source.clone(),
            chunk_index: idx,
            text,
        });
        idx += 1;
        if end >= chars.len() {
            break;
        }
        start = end.saturating_sub(config.chunk_overlap);
    }
    chunks
}

/// Split a sequence of documents, preserving document order.
pub fn chunk_documents(docs: &[Document], config: &ChunkingConfig) -> Vec<Chunk> {
    docs.iter()
        .flat_map(|doc| chunk_document(doc, config))
        .collect()
}
