// Indexer module
// Keeps the persisted vector index consistent with the current corpus and embedder


pub mod consistency;

use std::cmp::Ordering;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::embeddings::{Chunk, Embedder};
use crate::{RagError, Result};

pub use consistency::{StaleReason, Staleness, check_staleness};

/// A chunk together with the vector the current embedder produced for it
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedChunk {
    /// Position in the chunk sequence the index was built from
    pub ordinal: u32,
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// A search hit; `similarity` keeps full precision for ranking
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub ordinal: u32,
    pub chunk: Chunk,
    pub similarity: f32,
}

/// What a persisted index claims about itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSnapshotState {
    pub chunk_count: usize,
    pub embedder_identity: Option<String>,
}

/// An open, queryable index
#[async_trait]
pub trait IndexHandle: Send + Sync {
    async fn count(&self) -> Result<usize>;

    /// At most `k` results ordered by [`rank`]
    async fn search(&self, query_vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>>;

    /// Identity of the embedder whose vectors the index holds, if recorded
    fn embedder_identity(&self) -> Option<&str>;

    /// Release every resource held by the handle; searching afterwards fails
    async fn close(&mut self) -> Result<()>;
}

/// Persists and reopens indexes in a directory
#[async_trait]
pub trait IndexBackend: Send + Sync {
    async fn build(
        &self,
        directory: &Path,
        chunks: &[IndexedChunk],
        embedder_identity: &str,
    ) -> Result<Box<dyn IndexHandle>>;

    async fn load(&self, directory: &Path) -> Result<Box<dyn IndexHandle>>;
}

/// Sort by similarity descending, break ties by ingestion order, keep the top `k`
///
/// Hits without a finite similarity (a degenerate query vector yields NaN
/// cosine distances) are dropped rather than ranked.
#[inline]
pub fn rank(mut results: Vec<ScoredChunk>, k: usize) -> Vec<ScoredChunk> {
    results.retain(|scored| scored.similarity.is_finite());
    results.sort_by(|a, b| match b.similarity.total_cmp(&a.similarity) {
        Ordering::Equal => a.ordinal.cmp(&b.ordinal),
        other => other,
    });
    results.truncate(k);
    results
}

/// Bounded retries with a fixed delay between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    #[inline]
    pub const fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: if max_attempts == 0 { 1 } else { max_attempts },
            delay,
        }
    }

    /// No waiting between attempts
    #[inline]
    pub const fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO)
    }
}

impl Default for RetryPolicy {
    #[inline]
    fn default() -> Self {
        Self::new(3, Duration::from_millis(500))
    }
}

/// Removes a single directory entry
pub type EntryRemover = fn(&Path) -> io::Result<()>;

fn remove_entry(path: &Path) -> io::Result<()> {
    if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

/// Owns the on-disk index and the handle to it
pub struct IndexStore {
    backend: Arc<dyn IndexBackend>,
    directory: PathBuf,
    retry: RetryPolicy,
    batch_size: usize,
    remover: EntryRemover,
    handle: Option<Box<dyn IndexHandle>>,
}

impl IndexStore {
    #[inline]
    pub fn new(
        backend: Arc<dyn IndexBackend>,
        directory: PathBuf,
        retry: RetryPolicy,
        batch_size: usize,
    ) -> Self {
        Self {
            backend,
            directory,
            retry,
            batch_size: batch_size.max(1),
            remover: remove_entry,
            handle: None,
        }
    }

    /// Replace how directory entries are erased before a rebuild
    #[inline]
    pub fn with_remover(mut self, remover: EntryRemover) -> Self {
        self.remover = remover;
        self
    }

    #[inline]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        self.handle.is_some()
    }

    /// Reuse the persisted index when it is fresh, otherwise rebuild it
    ///
    /// On error the store is left without a handle.
    #[inline]
    pub async fn prepare(&mut self, chunks: &[Chunk], embedder: &dyn Embedder) -> Result<()> {
        if chunks.is_empty() {
            return Err(RagError::Index(
                "No chunks provided for vector store".to_string(),
            ));
        }

        fs::create_dir_all(&self.directory)?;
        self.close().await;

        let identity = embedder.identity();
        match check_staleness(
            self.backend.as_ref(),
            &self.directory,
            chunks.len(),
            &identity,
        )
        .await
        {
            Staleness::Fresh(handle) => {
                info!("Using existing vector index at {:?}", self.directory);
                self.handle = Some(handle);
                Ok(())
            }
            Staleness::Stale(reason) => {
                info!("Vector index is stale ({}), rebuilding", reason);
                self.rebuild(chunks, embedder).await
            }
        }
    }

    /// Drop the old index, erase its directory and build a fresh one from `chunks`
    #[inline]
    pub async fn rebuild(&mut self, chunks: &[Chunk], embedder: &dyn Embedder) -> Result<()> {
        info!("Rebuilding vector index with {} chunks", chunks.len());

        self.close().await;

        if !self.erase_directory().await {
            error!(
                "Could not fully clean {:?}, building over leftovers",
                self.directory
            );
        }

        let indexed = self.embed_chunks(chunks, embedder).await?;
        let identity = embedder.identity();

        let handle = self
            .backend
            .build(&self.directory, &indexed, &identity)
            .await
            .inspect_err(|e| error!("Error rebuilding vector index: {}", e))?;

        info!("Vector index rebuilt with {} chunks", indexed.len());
        self.handle = Some(handle);
        Ok(())
    }

    /// Similarity search against the open index
    #[inline]
    pub async fn search(&self, query_vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        let handle = self
            .handle
            .as_ref()
            .ok_or_else(|| RagError::Index("Vector index not initialized".to_string()))?;
        handle.search(query_vector, k).await
    }

    #[inline]
    pub async fn count(&self) -> Result<usize> {
        match &self.handle {
            Some(handle) => handle.count().await,
            None => Ok(0),
        }
    }

    /// Release the index handle, if any
    #[inline]
    pub async fn close(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            debug!("Closing vector index handle");
            if let Err(e) = handle.close().await {
                warn!("Failed to close vector index cleanly: {}", e);
            }
        }
    }

    /// Remove every entry of the index directory, retrying lock errors
    ///
    /// Returns false when entries may remain.
    async fn erase_directory(&self) -> bool {
        if !self.directory.exists() {
            return true;
        }

        for attempt in 1..=self.retry.max_attempts {
            match self.remove_entries() {
                Ok(()) => {
                    debug!("Cleaned vector index directory on attempt {}", attempt);
                    return true;
                }
                Err(e) if is_transient(&e) => {
                    warn!(
                        "Attempt {} to clean directory failed: {}",
                        attempt, e
                    );
                    if attempt < self.retry.max_attempts {
                        sleep(self.retry.delay).await;
                    }
                }
                Err(e) => {
                    error!("Unexpected error cleaning directory: {}", e);
                    return false;
                }
            }
        }

        error!("Failed to clean vector store directory");
        false
    }

    fn remove_entries(&self) -> io::Result<()> {
        for entry in fs::read_dir(&self.directory)? {
            (self.remover)(&entry?.path())?;
        }
        Ok(())
    }

    async fn embed_chunks(
        &self,
        chunks: &[Chunk],
        embedder: &dyn Embedder,
    ) -> Result<Vec<IndexedChunk>> {
        let bar = if console::user_attended_stderr() {
            ProgressBar::new(chunks.len() as u64).with_style(
                ProgressStyle::with_template("{bar:40} [{pos}/{len}] Embedding chunks")
                    .expect("style template is valid"),
            )
        } else {
            ProgressBar::hidden()
        };

        let mut indexed = Vec::with_capacity(chunks.len());

        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = embedder.embed_documents(&texts).await?;

            if vectors.len() != batch.len() {
                bar.abandon();
                return Err(RagError::Embedding(format!(
                    "Embedder returned {} vectors for {} chunks",
                    vectors.len(),
                    batch.len()
                )));
            }

            for (chunk, vector) in batch.iter().zip(vectors) {
                let ordinal = u32::try_from(indexed.len())
                    .map_err(|_| RagError::Index("Too many chunks to index".to_string()))?;
                indexed.push(IndexedChunk {
                    ordinal,
                    chunk: chunk.clone(),
                    vector,
                });
            }

            bar.inc(batch.len() as u64);
        }

        bar.finish_and_clear();

        if let Some(first) = indexed.first() {
            let dimension = first.vector.len();
            if indexed.iter().any(|c| c.vector.len() != dimension) {
                return Err(RagError::Embedding(
                    "Embedder produced vectors of differing dimensions".to_string(),
                ));
            }
        }

        Ok(indexed)
    }
}

fn is_transient(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::PermissionDenied | io::ErrorKind::ResourceBusy
    )
}
