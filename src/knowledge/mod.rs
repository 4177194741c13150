//! Knowledge retrieval for grounded responses
//!
//! Documents are ingested offline into a JSON snapshot of embedded
//! chunks. At run time the store ranks those chunks against each
//! utterance and the best passages are handed to generation as context.

mod embedder;
pub mod ingest;
mod store;

pub use embedder::Embedder;
pub use store::{SimilaritySearch, StoredChunk, VectorStore, cosine_similarity};

use std::sync::Arc;

use crate::Result;

/// Fetches supporting passages for one utterance
pub struct ContextRetriever {
    search: Arc<dyn SimilaritySearch>,
    top_k: usize,
}

impl ContextRetriever {
    #[must_use]
    pub fn new(search: Arc<dyn SimilaritySearch>, top_k: usize) -> Self {
        Self { search, top_k }
    }

    /// Retrieve the best-matching passages, joined by newlines
    ///
    /// Returns an empty string when nothing matches.
    ///
    /// # Errors
    ///
    /// Returns error if the search backend fails
    pub async fn retrieve(&self, query: &str) -> Result<String> {
        let passages = self.search.search(query, self.top_k).await?;
        tracing::debug!(passages = passages.len(), "context retrieved");
        Ok(passages.join("\n"))
    }
}
