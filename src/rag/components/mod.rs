
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::Config;
use crate::database::LanceBackend;
use crate::documents::load_documents;
use crate::embeddings::{Chunk, Embedder, OllamaClient, chunk_pages};
use crate::generation::{CompletionsClient, Generator};
use crate::indexer::IndexStore;
use crate::{RagError, Result};

/// Chunked corpus plus the sources it came from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Corpus {
    pub chunks: Vec<Chunk>,
    /// Ordered, de-duplicated source ids
    pub sources: Vec<String>,
}

/// Supplies initialized components to the service
///
/// Each call produces a fresh component; errors are reported, never panicked.
#[async_trait]
pub trait ComponentProvider: Send + Sync {
    async fn generator(&self) -> Result<Arc<dyn Generator>>;

    async fn corpus(&self) -> Result<Corpus>;

    async fn embedder(&self) -> Result<Arc<dyn Embedder>>;

    /// Unopened store; the service prepares it against the corpus
    async fn index_store(&self) -> Result<IndexStore>;
}

/// Ollama embeddings, chat completions generation, LanceDB index and the
/// documents folder from [`Config`]
#[derive(Debug, Clone)]
pub struct LiveComponents {
    config: Config,
}

impl LiveComponents {
    #[inline]
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }
}

#[async_trait]
impl ComponentProvider for LiveComponents {
    async fn generator(&self) -> Result<Arc<dyn Generator>> {
        info!("Initializing LLM: {}", self.config.generator.model);
        let client = CompletionsClient::new(&self.config.generator)
            .map_err(|e| RagError::Generation(format!("{:#}", e)))?;

        let probe = client.clone();
        tokio::task::spawn_blocking(move || probe.probe())
            .await
            .map_err(|e| RagError::Generation(format!("Generator probe task failed: {}", e)))?
            .map_err(|e| RagError::Generation(format!("{:#}", e)))?;

        Ok(Arc::new(client))
    }

    async fn corpus(&self) -> Result<Corpus> {
        let documents_dir = self.config.documents_path();
        let chunking = self.config.chunking.clone();

        tokio::task::spawn_blocking(move || {
            let documents = load_documents(&documents_dir)?;
            let chunks = chunk_pages(&documents.pages, &chunking);
            debug!(
                "Corpus has {} sources and {} chunks",
                documents.sources.len(),
                chunks.len()
            );
            Ok(Corpus {
                chunks,
                sources: documents.sources,
            })
        })
        .await
        .map_err(|e| RagError::Documents(format!("Document loading task failed: {}", e)))?
    }

    async fn embedder(&self) -> Result<Arc<dyn Embedder>> {
        info!("Initializing embedding model: {}", self.config.ollama.model);
        let mut client = OllamaClient::new(&self.config)
            .map_err(|e| RagError::Embedding(format!("{:#}", e)))?;

        let client = tokio::task::spawn_blocking(move || client.probe().map(|_| client))
            .await
            .map_err(|e| RagError::Embedding(format!("Embedding probe task failed: {}", e)))?
            .map_err(|e| RagError::Embedding(format!("{:#}", e)))?;

        Ok(Arc::new(client))
    }

    async fn index_store(&self) -> Result<IndexStore> {
        Ok(IndexStore::new(
            Arc::new(LanceBackend::new()),
            self.config.vector_database_path(),
            self.config.index.retry_policy(),
            self.config.index.embed_batch_size,
        ))
    }
}
