// Deterministic stand-ins for the embedder, generator and index backend

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::embeddings::{Chunk, Embedder};
use crate::generation::Generator;
use crate::indexer::{
    EntryRemover, IndexBackend, IndexHandle, IndexStore, IndexedChunk, RetryPolicy, ScoredChunk,
    rank,
};
use crate::rag::{ComponentProvider, Corpus};
use crate::{RagError, Result};

pub const FAKE_DIMENSION: usize = 256;
pub const INDEX_FILE: &str = "index.json";

pub fn chunk(source_id: &str, location: &str, text: &str) -> Chunk {
    Chunk {
        source_id: source_id.to_string(),
        location: location.to_string(),
        text: text.to_string(),
    }
}

/// Ten chunks about distinct topics
pub fn sample_chunks() -> Vec<Chunk> {
    [
        "rust ownership borrowing lifetimes memory safety",
        "python interpreter dynamic typing scripting",
        "tokio async runtime tasks futures executor",
        "lancedb vector database columnar storage",
        "ollama local embedding model server",
        "chunking splits documents into overlapping windows",
        "cosine similarity compares vector directions",
        "retrieval augmented generation grounds answers",
        "configuration loaded from toml files",
        "logging with tracing spans and events",
    ]
    .iter()
    .enumerate()
    .map(|(i, text)| chunk(&format!("doc{}.txt", i / 4), &(i % 4 + 1).to_string(), text))
    .collect()
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Hashes lowercase words into a fixed number of buckets
pub struct FakeEmbedder {
    identity: String,
    fail: AtomicBool,
    calls: AtomicUsize,
}

impl FakeEmbedder {
    pub fn new() -> Self {
        Self::with_identity("fake/bag-of-words/256")
    }

    pub fn with_identity(identity: &str) -> Self {
        Self {
            identity: identity.to_string(),
            fail: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn vectorize(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; FAKE_DIMENSION];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let hash = word
                .to_lowercase()
                .bytes()
                .fold(0xcbf2_9ce4_8422_2325_u64, |h, b| {
                    (h ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3)
                });
            vector[(hash % FAKE_DIMENSION as u64) as usize] += 1.0;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    fn identity(&self) -> String {
        self.identity.clone()
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(RagError::Embedding("scripted embedder failure".to_string()));
        }
        Ok(texts.iter().map(|t| Self::vectorize(t)).collect())
    }
}

/// Replies with a fixed padded answer and records every prompt
pub struct FakeGenerator {
    reply: String,
    fail: AtomicBool,
    prompts: Mutex<Vec<String>>,
}

impl FakeGenerator {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            fail: AtomicBool::new(false),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("prompt log poisoned").clone()
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts().pop()
    }
}

#[async_trait]
impl Generator for FakeGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts
            .lock()
            .expect("prompt log poisoned")
            .push(prompt.to_string());
        if self.fail.load(Ordering::SeqCst) {
            return Err(RagError::Generation("scripted generator failure".to_string()));
        }
        Ok(format!("  {}\n", self.reply))
    }
}

#[derive(Serialize, Deserialize)]
struct StoredIndex {
    embedder_identity: String,
    chunks: Vec<StoredChunk>,
}

#[derive(Serialize, Deserialize)]
struct StoredChunk {
    ordinal: u32,
    chunk: Chunk,
    vector: Vec<f32>,
}

/// Persists the whole index as one JSON file; refuses to overwrite an existing one
#[derive(Default)]
pub struct JsonBackend {
    pub builds: AtomicUsize,
    pub loads: AtomicUsize,
}

impl JsonBackend {
    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IndexBackend for JsonBackend {
    async fn build(
        &self,
        directory: &Path,
        chunks: &[IndexedChunk],
        embedder_identity: &str,
    ) -> Result<Box<dyn IndexHandle>> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        let path = directory.join(INDEX_FILE);
        if path.exists() {
            return Err(RagError::Index(format!("{} already exists", path.display())));
        }

        let stored = StoredIndex {
            embedder_identity: embedder_identity.to_string(),
            chunks: chunks
                .iter()
                .map(|c| StoredChunk {
                    ordinal: c.ordinal,
                    chunk: c.chunk.clone(),
                    vector: c.vector.clone(),
                })
                .collect(),
        };
        fs::create_dir_all(directory)?;
        fs::write(
            &path,
            serde_json::to_string(&stored).map_err(|e| RagError::Index(e.to_string()))?,
        )?;

        Ok(Box::new(JsonIndex {
            stored: Some(stored),
        }))
    }

    async fn load(&self, directory: &Path) -> Result<Box<dyn IndexHandle>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let text = fs::read_to_string(directory.join(INDEX_FILE))?;
        let stored: StoredIndex =
            serde_json::from_str(&text).map_err(|e| RagError::Index(e.to_string()))?;
        Ok(Box::new(JsonIndex {
            stored: Some(stored),
        }))
    }
}

struct JsonIndex {
    stored: Option<StoredIndex>,
}

impl JsonIndex {
    fn stored(&self) -> Result<&StoredIndex> {
        self.stored
            .as_ref()
            .ok_or_else(|| RagError::Index("index is closed".to_string()))
    }
}

#[async_trait]
impl IndexHandle for JsonIndex {
    async fn count(&self) -> Result<usize> {
        Ok(self.stored()?.chunks.len())
    }

    async fn search(&self, query_vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        let scored = self
            .stored()?
            .chunks
            .iter()
            .map(|c| ScoredChunk {
                ordinal: c.ordinal,
                chunk: c.chunk.clone(),
                similarity: cosine_similarity(&c.vector, query_vector),
            })
            .collect();
        Ok(rank(scored, k))
    }

    fn embedder_identity(&self) -> Option<&str> {
        self.stored
            .as_ref()
            .map(|s| s.embedder_identity.as_str())
    }

    async fn close(&mut self) -> Result<()> {
        self.stored = None;
        Ok(())
    }
}

/// Hands out fakes; a `None` component fails to initialize
pub struct FakeProvider {
    pub generator: Option<Arc<FakeGenerator>>,
    pub embedder: Option<Arc<FakeEmbedder>>,
    pub backend: Arc<JsonBackend>,
    pub directory: PathBuf,
    pub chunks: Mutex<Vec<Chunk>>,
    pub remover: Option<EntryRemover>,
}

impl FakeProvider {
    pub fn new(directory: &Path, chunks: Vec<Chunk>) -> Self {
        Self {
            generator: Some(Arc::new(FakeGenerator::new("Generated answer"))),
            embedder: Some(Arc::new(FakeEmbedder::new())),
            backend: Arc::new(JsonBackend::default()),
            directory: directory.to_path_buf(),
            chunks: Mutex::new(chunks),
            remover: None,
        }
    }

    pub fn set_chunks(&self, chunks: Vec<Chunk>) {
        *self.chunks.lock().expect("chunk list poisoned") = chunks;
    }

    pub fn fake_generator(&self) -> &FakeGenerator {
        self.generator.as_deref().expect("provider has a generator")
    }
}

#[async_trait]
impl ComponentProvider for FakeProvider {
    async fn generator(&self) -> Result<Arc<dyn Generator>> {
        match &self.generator {
            Some(generator) => Ok(Arc::clone(generator) as Arc<dyn Generator>),
            None => Err(RagError::Generation("GROQ_API_KEY not configured".to_string())),
        }
    }

    async fn corpus(&self) -> Result<Corpus> {
        let chunks = self.chunks.lock().expect("chunk list poisoned").clone();
        let mut sources: Vec<String> = chunks.iter().map(|c| c.source_id.clone()).collect();
        sources.dedup();
        Ok(Corpus { chunks, sources })
    }

    async fn embedder(&self) -> Result<Arc<dyn Embedder>> {
        match &self.embedder {
            Some(embedder) => Ok(Arc::clone(embedder) as Arc<dyn Embedder>),
            None => Err(RagError::Embedding("model download failed".to_string())),
        }
    }

    async fn index_store(&self) -> Result<IndexStore> {
        let store = IndexStore::new(
            Arc::clone(&self.backend) as Arc<dyn IndexBackend>,
            self.directory.clone(),
            RetryPolicy::immediate(3),
            4,
        );
        Ok(match self.remover {
            Some(remover) => store.with_remover(remover),
            None => store,
        })
    }
}
