//! Persistent vector index backed by SQLite.
//!
//! Embeddings are stored as little-endian `f32` blobs next to their chunk
//! text. Search is brute-force cosine similarity over all rows, which is
//! adequate at the corpus sizes this service targets. Opening an existing
//! database file reuses its contents; the schema is only created when absent.

use std::path::Path;

use rusqlite::{Connection, params};
use uuid::Uuid;

use crate::error::IndexError;

/// One indexed chunk: text plus its embedding and provenance.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub id: Uuid,
    pub source: String,
    pub chunk_index: usize,
    pub text: String,
    pub embedding: Vec<f32>,
}

impl IndexEntry {
    /// Build an entry with a fresh random id.
    pub fn new(source: String, chunk_index: usize, text: String, embedding: Vec<f32>) -> Self {
        Self {
            id: Uuid::new_v4(),
            source,
            chunk_index,
            text,
            embedding,
        }
    }
}

/// A retrieval hit: chunk text with its provenance and similarity score.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub text: String,
    pub source: String,
    pub chunk_index: usize,
    pub score: f32,
}

/// Aggregate counts over the index.
#[derive(Debug, Clone, serde::Serialize)]
pub struct IndexStats {
    pub entry_count: u64,
    pub source_count: u64,
}

/// SQLite-backed vector index.
pub struct VectorIndex {
    conn: Connection,
}

impl VectorIndex {
    /// Open the index at `path`, creating the file and schema when absent.
    pub fn open(path: &Path) -> Result<Self, IndexError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS entries (
                id TEXT PRIMARY KEY,
                source TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                text TEXT NOT NULL,
                embedding BLOB NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_entries_source ON entries(source);
            "#,
        )?;

        Ok(Self { conn })
    }

    /// Append entries in a single transaction.
    ///
    /// Returns the number of entries written. Nothing is persisted if any
    /// insert fails.
    pub fn add(&mut self, entries: &[IndexEntry]) -> Result<usize, IndexError> {
        let created_at = chrono::Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;

        for entry in entries {
            let embedding_bytes = serialize_embedding(&entry.embedding);
            tx.execute(
                "INSERT INTO entries (id, source, chunk_index, text, embedding, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    entry.id.to_string(),
                    entry.source,
                    entry.chunk_index as i64,
                    entry.text,
                    embedding_bytes,
                    created_at,
                ],
            )?;
        }

        tx.commit()?;
        Ok(entries.len())
    }

    /// Find the `limit` entries most similar to `query_embedding`.
    ///
    /// Hits come back in descending score order. An entry whose stored
    /// embedding has a different dimensionality scores 0.0 rather than
    /// failing the search.
    pub fn search(
        &self,
        query_embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchHit>, IndexError> {
        let mut stmt = self
            .conn
            .prepare("SELECT source, chunk_index, text, embedding FROM entries")?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Vec<u8>>(3)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut hits: Vec<SearchHit> = rows
            .into_iter()
            .map(|(source, chunk_index, text, embedding_bytes)| {
                let embedding = deserialize_embedding(&embedding_bytes);
                let score = cosine_similarity(query_embedding, &embedding);
                SearchHit {
                    text,
                    source,
                    chunk_index: chunk_index as usize,
                    score,
                }
            })
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);
        Ok(hits)
    }

    /// Number of entries in the index.
    pub fn len(&self) -> Result<u64, IndexError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    pub fn is_empty(&self) -> Result<bool, IndexError> {
        Ok(self.len()? == 0)
    }

    /// Aggregate counts over the index.
    pub fn stats(&self) -> Result<IndexStats, IndexError> {
        let entry_count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))?;
        let source_count: i64 = self.conn.query_row(
            "SELECT COUNT(DISTINCT source) FROM entries",
            [],
            |row| row.get(0),
        )?;

        Ok(IndexStats {
            entry_count: entry_count as u64,
            source_count: source_count as u64,
        })
    }
}

/// Serialize an embedding as a little-endian `f32` blob.
fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Deserialize an embedding from a little-endian `f32` blob.
fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity between two vectors.
///
/// Returns 0.0 for mismatched dimensions, empty vectors, or zero vectors.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot_product = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;

    for (x, y) in a.iter().zip(b.iter()) {
        dot_product += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denominator = (norm_a * norm_b).sqrt();
    if denominator == 0.0 {
        return 0.0;
    }

    dot_product / denominator
}
