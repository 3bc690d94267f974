//! RAG engine: orchestrates loading, chunking, embedding, retrieval, and
//! answer generation over a persistent vector index.
//!
//! One engine instance is built at startup with its collaborators injected,
//! and shared across requests behind an `Arc`. The index sits behind a
//! `tokio::sync::Mutex`; provider calls are awaited outside the lock so
//! index access stays short while network I/O overlaps across requests.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::chunker::{self, ChunkingConfig};
use crate::config::RetrievalConfig;
use crate::embedding::Embedder;
use crate::error::{LoadError, RagError, Result};
use crate::generation::Generator;
use crate::index::{IndexEntry, IndexStats, SearchHit, VectorIndex};
use crate::loader::{Document, PdfLoader, UrlLoader};

/// Answer returned when the index holds no entries at all.
pub const EMPTY_INDEX_MESSAGE: &str = "System is initializing or knowledge base is empty.";

/// Answer returned when retrieval finds nothing relevant to the question.
pub const NO_CONTEXT_MESSAGE: &str =
    "I couldn't find any relevant information in the provided context.";

/// User-facing message when the generation model reports quota exhaustion.
pub const GENERATION_QUOTA_MESSAGE: &str =
    "The AI's quota is exhausted. Please try again in 1-2 minutes or use a different API key.";

/// User-facing message when embedding reports quota exhaustion during ingestion.
pub const EMBEDDING_QUOTA_MESSAGE: &str = "API Quota Exhausted: Could not create embeddings \
     for the document. Please try again in a few minutes.";

/// The fixed answering prompt. `{context}` and `{question}` are substituted
/// at query time.
pub const PROMPT_TEMPLATE: &str = "Answer the question using ONLY the context below.\n\
     If the answer is not contained in the context, say you don't know.\n\
     \n\
     Context:\n\
     {context}\n\
     \n\
     Question:\n\
     {question}";

/// What one ingestion call wrote to the index.
#[derive(Debug, Clone, serde::Serialize)]
pub struct IngestReport {
    pub source: String,
    pub chunks_ingested: usize,
    pub total_chars: usize,
}

/// Retrieval-augmented question answering over ingested documents.
pub struct RagEngine {
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    index: Mutex<VectorIndex>,
    chunking: ChunkingConfig,
    retrieval: RetrievalConfig,
}

impl std::fmt::Debug for RagEngine {
    // The embedder and generator are trait objects without a `Debug`
    // supertrait, so the impl is manual and elides them.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RagEngine")
            .field("chunking", &self.chunking)
            .field("retrieval", &self.retrieval)
            .finish_non_exhaustive()
    }
}

impl RagEngine {
    /// Build an engine from its collaborators.
    ///
    /// Validates the chunking parameters up front so a misconfigured window
    /// fails at startup rather than on the first ingestion.
    pub fn new(
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
        index: VectorIndex,
        chunking: ChunkingConfig,
        retrieval: RetrievalConfig,
    ) -> Result<Self> {
        chunking.validate()?;
        Ok(Self {
            embedder,
            generator,
            index: Mutex::new(index),
            chunking,
            retrieval,
        })
    }

    /// Ingest a PDF file from disk.
    pub async fn ingest_pdf(&self, path: &Path) -> Result<IngestReport> {
        let docs = PdfLoader::new().load(path)?;
        self.ingest_documents(docs).await
    }

    /// Fetch a URL and ingest its text content.
    pub async fn ingest_url(&self, url: &str) -> Result<IngestReport> {
        let docs = UrlLoader::new().load(url).await?;
        self.ingest_documents(docs).await
    }

    /// Shared ingestion pipeline: chunk, embed, append to the index.
    ///
    /// All chunks of one call are embedded first and then written in a
    /// single transaction, so a failure mid-embedding persists nothing.
    /// Re-ingesting a source the index already holds appends new entries
    /// under fresh ids; no deduplication is attempted.
    pub async fn ingest_documents(&self, docs: Vec<Document>) -> Result<IngestReport> {
        let source = docs
            .first()
            .map(|d| d.source.clone())
            .ok_or_else(|| {
                RagError::Load(LoadError::EmptyDocument {
                    origin: "<no documents>".to_string(),
                })
            })?;
        let total_chars: usize = docs.iter().map(|d| d.text.chars().count()).sum();

        let chunks = chunker::chunk_documents(&docs, &self.chunking);
        if chunks.is_empty() {
            return Err(RagError::Load(LoadError::EmptyDocument { origin: source }));
        }

        debug!(
            source = source.as_str(),
            chunks = chunks.len(),
            "Embedding document chunks"
        );

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self
            .embedder
            .embed_batch(&texts)
            .await
            .map_err(RagError::Embedding)?;

        let entries: Vec<IndexEntry> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| {
                IndexEntry::new(chunk.source, chunk.chunk_index, chunk.text, embedding)
            })
            .collect();

        let written = {
            let mut index = self.index.lock().await;
            index.add(&entries)?
        };

        info!(
            source = source.as_str(),
            chunks = written,
            total_chars,
            "Ingested document"
        );

        Ok(IngestReport {
            source,
            chunks_ingested: written,
            total_chars,
        })
    }

    /// Answer a question from the ingested corpus.
    ///
    /// An empty index and a retrieval miss both produce fixed answers rather
    /// than errors; provider failures surface typed so the API layer can map
    /// them to proper status codes.
    pub async fn query(&self, question: &str) -> Result<String> {
        {
            let index = self.index.lock().await;
            if index.is_empty()? {
                return Ok(EMPTY_INDEX_MESSAGE.to_string());
            }
        }

        let query_embedding = self
            .embedder
            .embed(question)
            .await
            .map_err(RagError::Embedding)?;

        let hits = {
            let index = self.index.lock().await;
            index.search(&query_embedding, self.retrieval.top_k)?
        };

        let relevant: Vec<SearchHit> = hits
            .into_iter()
            .filter(|h| h.score >= self.retrieval.min_score)
            .collect();

        if relevant.is_empty() {
            return Ok(NO_CONTEXT_MESSAGE.to_string());
        }

        debug!(
            hits = relevant.len(),
            top_score = relevant[0].score,
            "Retrieved context for question"
        );

        let context = relevant
            .iter()
            .map(|h| h.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let prompt = render_prompt(&context, question);

        let answer = self
            .generator
            .generate(&prompt)
            .await
            .map_err(RagError::Generation)?;
        Ok(answer)
    }

    /// Counts currently held by the index.
    pub async fn stats(&self) -> Result<IndexStats> {
        let index = self.index.lock().await;
        Ok(index.stats()?)
    }
}

/// Render the fixed answering prompt.
fn render_prompt(context: &str, question: &str) -> String {
    PROMPT_TEMPLATE
        .replace("{context}", context)
        .replace("{question}", question)
}
