// Embeddings module
// Text-to-vector models and the chunker that feeds them

pub mod chunking;
pub mod ollama;

use async_trait::async_trait;

use crate::{RagError, Result};

pub use chunking::{Chunk, ChunkingConfig, chunk_pages};
pub use ollama::OllamaClient;

/// Maps text to fixed-length vectors
///
/// Queries and documents must go through the same representation, so
/// [`Embedder::embed_query`] defaults to a one-element [`Embedder::embed_documents`] call.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Identifies the model and dimensionality that produced a vector
    fn identity(&self) -> String;

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_documents(&[text.to_string()]).await?;
        match (vectors.pop(), vectors.is_empty()) {
            (Some(vector), true) => Ok(vector),
            _ => Err(RagError::Embedding(
                "Expected exactly one embedding for query".to_string(),
            )),
        }
    }
}
