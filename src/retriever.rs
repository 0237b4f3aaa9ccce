//! Context retrieval from a pre-built chunk index.
//!
//! An index directory holds `chunk_embeddings.npy` (one f32 row per chunk)
//! and `chunk_metadata.json` (the chunk texts, same order). Queries are
//! embedded locally with fastembed and ranked by cosine similarity.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use ndarray::Array2;
use ndarray_npy::ReadNpyExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{ChatError, Result};

pub const EMBEDDINGS_FILE: &str = "chunk_embeddings.npy";
pub const METADATA_FILE: &str = "chunk_metadata.json";

/// A retrieved passage. Order in a result set is rank order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextChunk {
    pub content: String,
}

impl ContextChunk {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

/// Finds the passages most relevant to a question.
///
/// Callers treat any error as "no context"; it never reaches the user.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<ContextChunk>>;
}

/// Download the query embedding model ahead of the first chat session
pub fn download_embedding_model() -> Result<()> {
    println!("Downloading embedding model for semantic search...");

    let options = InitOptions::new(EmbeddingModel::BGESmallENV15)
        .with_show_download_progress(true);

    TextEmbedding::try_new(options)
        .map_err(|e| ChatError::Embedding(format!("Failed to download model: {}", e)))?;

    println!("✓ Embedding model cached successfully");
    Ok(())
}

/// One entry of `chunk_metadata.json`. Other keys are ignored.
#[derive(Deserialize)]
struct Metadata {
    content: String,
}

/// In-memory copy of a chunk index.
pub struct ChunkIndex {
    embeddings: Array2<f32>,
    chunks: Vec<ContextChunk>,
    model: Option<TextEmbedding>,
}

impl ChunkIndex {
    /// Load embeddings and chunk texts from an index directory.
    pub fn load(index_dir: &Path) -> Result<Self> {
        let embeddings_path = index_dir.join(EMBEDDINGS_FILE);
        let metadata_path = index_dir.join(METADATA_FILE);

        let embeddings_file = File::open(&embeddings_path)
            .map_err(|e| unavailable(&embeddings_path, e.to_string()))?;
        let embeddings: Array2<f32> = Array2::read_npy(embeddings_file)
            .map_err(|e| ChatError::IndexCorrupt(format!("Failed to read .npy file: {}", e)))?;

        let metadata_file = File::open(&metadata_path)
            .map_err(|e| unavailable(&metadata_path, e.to_string()))?;
        let metadata: Vec<Metadata> = serde_json::from_reader(BufReader::new(metadata_file))
            .map_err(|e| ChatError::IndexCorrupt(format!("{:?}: {}", metadata_path, e)))?;

        let chunks = metadata
            .into_iter()
            .map(|m| ContextChunk::new(m.content))
            .collect();

        let index = Self::from_parts(embeddings, chunks)?;
        info!(
            path = %index_dir.display(),
            chunks = index.len(),
            dimensions = index.dimensions(),
            "loaded chunk index"
        );
        Ok(index)
    }

    pub fn from_parts(embeddings: Array2<f32>, chunks: Vec<ContextChunk>) -> Result<Self> {
        if embeddings.nrows() != chunks.len() {
            return Err(ChatError::IndexCorrupt(format!(
                "Embeddings count ({}) doesn't match metadata count ({})",
                embeddings.nrows(),
                chunks.len()
            )));
        }

        Ok(Self {
            embeddings,
            chunks,
            model: None,
        })
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn dimensions(&self) -> usize {
        self.embeddings.ncols()
    }

    /// Initialize the embedding model (lazy-loaded on first query)
    fn ensure_model(&mut self) -> Result<&mut TextEmbedding> {
        if self.model.is_none() {
            // Download progress would corrupt the TUI display
            let options = InitOptions::new(EmbeddingModel::BGESmallENV15)
                .with_show_download_progress(false);
            let model = TextEmbedding::try_new(options)
                .map_err(|e| ChatError::Embedding(format!("Failed to load embedding model: {}", e)))?;
            self.model = Some(model);
        }
        self.model
            .as_mut()
            .ok_or_else(|| ChatError::Embedding("embedding model not initialised".to_string()))
    }

    pub fn embed_query(&mut self, text: &str) -> Result<Vec<f32>> {
        let model = self.ensure_model()?;
        let embeddings = model
            .embed(vec![text], None)
            .map_err(|e| ChatError::Embedding(format!("Failed to embed query: {}", e)))?;

        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| ChatError::Embedding("No embedding returned".to_string()))
    }

    pub fn search(&mut self, query: &str, k: usize) -> Result<Vec<ContextChunk>> {
        if self.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        let query_emb = self.embed_query(query)?;
        self.search_by_embedding(&query_emb, k)
    }

    /// The `k` chunks closest to `query_emb`, most similar first.
    pub fn search_by_embedding(&self, query_emb: &[f32], k: usize) -> Result<Vec<ContextChunk>> {
        if !self.is_empty() && query_emb.len() != self.dimensions() {
            return Err(ChatError::Embedding(format!(
                "query embedding has {} dimensions, index has {}",
                query_emb.len(),
                self.dimensions()
            )));
        }

        let mut scores: Vec<(usize, f32)> = self
            .embeddings
            .rows()
            .into_iter()
            .enumerate()
            .map(|(i, row)| {
                let score = match row.as_slice() {
                    Some(slice) => cosine_similarity(slice, query_emb),
                    None => cosine_similarity(&row.to_vec(), query_emb),
                };
                (i, score)
            })
            .collect();

        // Stable sort keeps index order among equal scores
        scores.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scores.truncate(k);

        Ok(scores
            .into_iter()
            .map(|(i, _)| self.chunks[i].clone())
            .collect())
    }
}

fn unavailable(path: &Path, reason: String) -> ChatError {
    ChatError::IndexUnavailable {
        path: path.to_path_buf(),
        reason,
    }
}

/// Compute cosine similarity between two vectors
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

/// [`Retriever`] over a [`ChunkIndex`]. Embedding is CPU-bound, so each
/// search runs on the blocking pool.
#[derive(Clone)]
pub struct IndexRetriever {
    index: Arc<Mutex<ChunkIndex>>,
    path: PathBuf,
}

impl IndexRetriever {
    pub fn open(index_dir: &Path) -> Result<Self> {
        if !index_dir.is_dir() {
            return Err(unavailable(index_dir, "not a directory".to_string()));
        }
        let index = ChunkIndex::load(index_dir)?;
        Ok(Self::new(index, index_dir.to_path_buf()))
    }

    pub fn new(index: ChunkIndex, path: PathBuf) -> Self {
        Self {
            index: Arc::new(Mutex::new(index)),
            path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, ChunkIndex> {
        lock_index(&self.index)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Lock the index, recovering it if an earlier search panicked while
/// holding it. Embeddings and chunks are read-only after load; only the
/// model may be mid-call, so it is dropped and reloaded on next use.
fn lock_index(index: &Mutex<ChunkIndex>) -> MutexGuard<'_, ChunkIndex> {
    index.lock().unwrap_or_else(|poisoned| {
        warn!("chunk index lock poisoned by a panicked search, reloading embedding model");
        let mut guard = PoisonError::into_inner(poisoned);
        guard.model = None;
        index.clear_poison();
        guard
    })
}

#[async_trait]
impl Retriever for IndexRetriever {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<ContextChunk>> {
        let index = Arc::clone(&self.index);
        let query = query.to_string();

        let chunks = tokio::task::spawn_blocking(move || {
            let mut index = lock_index(&index);
            index.search(&query, k)
        })
        .await
        .map_err(|e| ChatError::Embedding(format!("retrieval task failed: {}", e)))??;

        debug!(k, returned = chunks.len(), "retrieved context chunks");
        Ok(chunks)
    }
}
