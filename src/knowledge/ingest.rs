//! Document ingestion into the knowledge snapshot
//!
//! Reads plain-text documents, splits them into overlapping chunks,
//! embeds each chunk, and writes the result as a JSON snapshot that
//! `VectorStore` loads at startup.

use std::path::Path;

use crate::knowledge::{Embedder, StoredChunk};
use crate::{Error, Result};

/// Target chunk length in characters
pub const CHUNK_SIZE: usize = 800;

/// Characters repeated between consecutive chunks
pub const CHUNK_OVERLAP: usize = 100;

/// Chunks embedded per API request
const EMBED_BATCH: usize = 64;

/// Split text into overlapping chunks, breaking at whitespace when possible
#[must_use]
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let end = (start + chunk_size).min(chars.len());

        // Prefer a whitespace break so words stay intact
        let mut cut = end;
        if end < chars.len()
            && let Some(ws) = (start..end).rev().find(|&i| chars[i].is_whitespace())
            && ws > start
        {
            cut = ws;
        }

        let chunk: String = chars[start..cut].iter().collect();
        let trimmed = chunk.trim();
        if !trimmed.is_empty() {
            chunks.push(trimmed.to_string());
        }

        if cut >= chars.len() {
            break;
        }
        start = cut.saturating_sub(overlap).max(start + 1);
    }

    chunks
}

/// Chunk and embed every document in a directory
///
/// Only plain-text files (`.txt`, `.md`) are picked up.
///
/// # Errors
///
/// Returns error if the directory cannot be read or embedding fails
pub async fn build_chunks(docs_dir: &Path, embedder: &Embedder) -> Result<Vec<StoredChunk>> {
    let mut sources: Vec<(String, String)> = Vec::new();

    let entries = std::fs::read_dir(docs_dir)
        .map_err(|e| Error::Config(format!("failed to read documents directory: {e}")))?;

    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let is_text = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| matches!(e, "txt" | "md"));
        if !is_text {
            continue;
        }

        let name = entry.file_name().to_string_lossy().into_owned();
        let contents = std::fs::read_to_string(&path)
            .map_err(|e| Error::Config(format!("failed to read {name}: {e}")))?;
        sources.push((name, contents));
    }

    let mut pending: Vec<(String, String)> = Vec::new();
    for (name, contents) in &sources {
        let chunks = chunk_text(contents, CHUNK_SIZE, CHUNK_OVERLAP);
        tracing::info!(source = %name, chunks = chunks.len(), "document split");
        for chunk in chunks {
            pending.push((name.clone(), chunk));
        }
    }

    let mut stored = Vec::with_capacity(pending.len());
    for batch in pending.chunks(EMBED_BATCH) {
        let texts: Vec<&str> = batch.iter().map(|(_, text)| text.as_str()).collect();
        let embeddings = embedder.embed_batch(&texts).await?;

        if embeddings.len() != batch.len() {
            return Err(Error::Embedding(format!(
                "embedding count mismatch: sent {}, received {}",
                batch.len(),
                embeddings.len()
            )));
        }

        for ((source, text), embedding) in batch.iter().cloned().zip(embeddings) {
            stored.push(StoredChunk {
                source,
                text,
                embedding,
            });
        }
    }

    Ok(stored)
}

/// Write a snapshot of embedded chunks to disk
///
/// # Errors
///
/// Returns error if serialization or the write fails
pub fn save_snapshot(chunks: &[StoredChunk], path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(chunks)?;
    std::fs::write(path, json)
        .map_err(|e| Error::Config(format!("failed to write knowledge snapshot: {e}")))?;

    tracing::info!(chunks = chunks.len(), path = %path.display(), "knowledge snapshot written");
    Ok(())
}
