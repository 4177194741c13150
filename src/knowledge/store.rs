//! On-disk vector store for document passages

use std::path::Path;

use async_trait::async_trait;

use crate::knowledge::Embedder;
use crate::{Error, Result};

/// One embedded passage of a source document
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct StoredChunk {
    /// File the passage was taken from
    pub source: String,
    pub text: String,
    pub embedding: Vec<f32>,
}

/// Similarity-search backend
#[async_trait]
pub trait SimilaritySearch: Send + Sync {
    /// Return the texts of the passages nearest to `query`, best first
    ///
    /// # Errors
    ///
    /// Returns error if the search backend fails
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<String>>;
}

/// In-memory vector index loaded from a JSON snapshot
///
/// Queries are embedded on demand and ranked against the stored
/// passages by cosine similarity.
pub struct VectorStore {
    chunks: Vec<StoredChunk>,
    embedder: Embedder,
}

impl VectorStore {
    /// Load a snapshot from disk
    ///
    /// A missing snapshot yields an empty store, so the assistant can
    /// run before any documents have been ingested. A snapshot that
    /// exists but cannot be parsed is an error.
    ///
    /// # Errors
    ///
    /// Returns error if the snapshot exists but cannot be read or parsed
    pub fn load(path: &Path, embedder: Embedder) -> Result<Self> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "no knowledge snapshot, starting empty");
            return Ok(Self::from_chunks(Vec::new(), embedder));
        }

        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read knowledge snapshot: {e}")))?;
        let chunks: Vec<StoredChunk> = serde_json::from_str(&contents)
            .map_err(|e| Error::Config(format!("failed to parse knowledge snapshot: {e}")))?;

        let store = Self::from_chunks(chunks, embedder);
        tracing::info!(
            chunks = store.len(),
            path = %path.display(),
            "knowledge snapshot loaded"
        );

        Ok(store)
    }

    /// Build a store over already-embedded chunks
    #[must_use]
    pub fn from_chunks(chunks: Vec<StoredChunk>, embedder: Embedder) -> Self {
        Self { chunks, embedder }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

#[async_trait]
impl SimilaritySearch for VectorStore {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<String>> {
        // Skip the query embedding call when there is nothing to rank
        if self.is_empty() {
            return Ok(Vec::new());
        }

        let query_embedding = self.embedder.embed(query).await?;

        let mut scored: Vec<(f32, &StoredChunk)> = self
            .chunks
            .iter()
            .map(|chunk| (cosine_similarity(&query_embedding, &chunk.embedding), chunk))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(score, chunk)| {
                tracing::debug!(score, source = %chunk.source, "context match");
                chunk.text.clone()
            })
            .collect())
    }
}

/// Cosine similarity between two vectors
///
/// Mismatched lengths and zero vectors score 0.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}
