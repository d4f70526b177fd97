// Retrieval-augmented generation service
// Owns the generator, embedder and index, and answers questions with whatever subset is healthy


pub mod components;
pub mod mode;
pub mod models;
pub mod prompt;
pub mod validation;

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::config::RetrievalConfig;
use crate::embeddings::Embedder;
use crate::generation::Generator;
use crate::indexer::{IndexStore, ScoredChunk};

pub use components::{ComponentProvider, Corpus, LiveComponents};
pub use mode::{CapabilityMode, Readiness};
pub use models::{ChatExchange, ChatRequest, SourceRef, SystemStatus};
pub use validation::{ValidationError, validate_query};

pub const LLM_UNAVAILABLE: &str = "LLM not available";
pub const GENERATION_FAILED: &str = "Sorry, an error occurred while generating the response";

const SUMMARY_NO_GENERATOR: &str = "No generator available";
const SUMMARY_NO_MATCHES: &str = "No relevant documents found, using LLM-only mode";
const SUMMARY_NO_DOCUMENTS: &str = "LLM-only mode (no documents available)";
const SUMMARY_RETRIEVAL_FAILED: &str = "Document retrieval failed, using LLM-only mode";

/// Component handles and the diagnostics of the last initialization
#[derive(Default)]
pub struct ServiceState {
    generator: Option<Arc<dyn Generator>>,
    embedder: Option<Arc<dyn Embedder>>,
    index: Option<IndexStore>,
    sources: Vec<String>,
    usable: bool,
    diagnostic: Option<String>,
}

impl ServiceState {
    #[inline]
    pub fn readiness(&self) -> Readiness {
        Readiness {
            generator: self.generator.is_some(),
            embedder: self.embedder.is_some(),
            index: self.index.as_ref().is_some_and(IndexStore::is_ready),
        }
    }

    #[inline]
    pub fn mode(&self) -> CapabilityMode {
        self.readiness().mode()
    }

    /// Release every component handle and forget the last diagnostic
    async fn teardown(&mut self) {
        if let Some(mut index) = self.index.take() {
            index.close().await;
        }
        self.embedder = None;
        self.generator = None;
        self.sources.clear();
        self.usable = false;
        self.diagnostic = None;
    }

    fn status(&self) -> SystemStatus {
        if !self.usable {
            return SystemStatus {
                rag_pipeline_ready: false,
                llm_ready: false,
                db_ready: false,
                mode: CapabilityMode::Unavailable,
                loaded_documents: Vec::new(),
                initialization_error: Some(
                    self.diagnostic
                        .clone()
                        .unwrap_or_else(|| "System not initialized".to_string()),
                ),
                message: "System not ready".to_string(),
            };
        }

        let readiness = self.readiness();
        let mode = readiness.mode();
        let message = match mode {
            CapabilityMode::Full => "System ready (RAG mode with documents)",
            CapabilityMode::GeneratorOnly => "System ready (LLM-only mode)",
            CapabilityMode::Unavailable => "System has issues",
        };

        SystemStatus {
            rag_pipeline_ready: mode == CapabilityMode::Full,
            llm_ready: readiness.generator,
            db_ready: readiness.retrieval(),
            mode,
            loaded_documents: self.sources.clone(),
            initialization_error: self.diagnostic.clone(),
            message: message.to_string(),
        }
    }
}

/// Outcome of an initialization run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitReport {
    /// True once the generator is up, whatever happened afterwards
    pub usable: bool,
    pub mode: CapabilityMode,
    pub diagnostic: Option<String>,
}

/// Question answering over the corpus with graceful degradation
///
/// Queries share the read side of the state lock; initialization and
/// reinitialization take the write side, so no query sees a half-built index.
pub struct RagService {
    provider: Arc<dyn ComponentProvider>,
    retrieval: RetrievalConfig,
    state: RwLock<ServiceState>,
}

impl RagService {
    #[inline]
    pub fn new(provider: Arc<dyn ComponentProvider>, retrieval: RetrievalConfig) -> Self {
        Self {
            provider,
            retrieval,
            state: RwLock::new(ServiceState::default()),
        }
    }

    /// Release held components, then bring up generator, corpus, embedder and
    /// index in that order; only a generator failure makes the service unusable
    #[inline]
    pub async fn initialize(&self) -> InitReport {
        let mut state = self.state.write().await;
        state.teardown().await;

        info!("=== Starting system initialization ===");
        self.run_initialization(&mut state).await;

        let report = InitReport {
            usable: state.usable,
            mode: state.mode(),
            diagnostic: state.diagnostic.clone(),
        };

        match report.mode {
            CapabilityMode::Full => info!("=== System fully initialized (RAG mode) ==="),
            CapabilityMode::GeneratorOnly => info!("=== System initialized (LLM-only mode) ==="),
            CapabilityMode::Unavailable => error!("=== System initialization failed ==="),
        }

        report
    }

    /// Rerun initialization and report the resulting status
    #[inline]
    pub async fn reinitialize(&self) -> SystemStatus {
        info!("Reinitializing system...");
        let report = self.initialize().await;
        if report.usable {
            info!("Reinitialization completed successfully");
        } else {
            error!("Reinitialization failed");
        }
        self.status().await
    }

    /// Release every component; the service reports not ready afterwards
    #[inline]
    pub async fn shutdown(&self) {
        self.state.write().await.teardown().await;
    }

    #[inline]
    pub async fn status(&self) -> SystemStatus {
        self.state.read().await.status()
    }

    #[inline]
    pub async fn mode(&self) -> CapabilityMode {
        self.state.read().await.mode()
    }

    async fn run_initialization(&self, state: &mut ServiceState) {
        match self.provider.generator().await {
            Ok(generator) => {
                state.generator = Some(generator);
                state.usable = true;
            }
            Err(e) => {
                let message = format!("LLM initialization failed: {}", e);
                error!("{}", message);
                state.diagnostic = Some(message);
                return;
            }
        }

        let corpus = match self.provider.corpus().await {
            Ok(corpus) if !corpus.chunks.is_empty() => corpus,
            Ok(corpus) => {
                warn!("Document loading failed: no documents found");
                state.sources = corpus.sources;
                state.diagnostic = Some("No documents found".to_string());
                return;
            }
            Err(e) => {
                warn!("Document loading failed: {}", e);
                state.diagnostic = Some(format!("Document loading failed: {}", e));
                return;
            }
        };
        state.sources = corpus.sources;

        let embedder = match self.provider.embedder().await {
            Ok(embedder) => embedder,
            Err(e) => {
                warn!("Embedding model failed: {}", e);
                state.diagnostic = Some(format!("Embedding model initialization failed: {}", e));
                return;
            }
        };
        state.embedder = Some(Arc::clone(&embedder));

        let mut index = match self.provider.index_store().await {
            Ok(index) => index,
            Err(e) => {
                warn!("Vector store failed: {}", e);
                state.diagnostic = Some(format!("Vector store initialization failed: {}", e));
                return;
            }
        };

        if let Err(e) = index.prepare(&corpus.chunks, embedder.as_ref()).await {
            warn!("Vector store failed: {}", e);
            state.diagnostic = Some(format!("Vector store initialization failed: {}", e));
        }
        state.index = Some(index);
    }

    /// Answer one request
    ///
    /// Only validation failures are errors; component failures degrade the
    /// exchange for this request alone.
    #[inline]
    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatExchange, ValidationError> {
        let query = validate_query(&request.message, self.retrieval.max_query_length)?;
        let k = request.k.unwrap_or(self.retrieval.default_k);
        if k == 0 {
            return Err(ValidationError::InvalidK(0));
        }

        let state = self.state.read().await;
        let readiness = state.readiness();

        let Some(generator) = state.generator.as_deref() else {
            return Ok(ChatExchange {
                question: query.to_string(),
                answer: LLM_UNAVAILABLE.to_string(),
                mode: CapabilityMode::Unavailable,
                sources: Vec::new(),
                context_summary: SUMMARY_NO_GENERATOR.to_string(),
            });
        };

        debug!("Processing chat request: {:.50}", query);

        let exchange = if readiness.retrieval() {
            match self.retrieve(&state, query, k).await {
                Ok(hits) if !hits.is_empty() => {
                    let context = prompt::join_context(hits.iter().map(|h| h.chunk.text.as_str()));
                    let (answer, mode) = generate(
                        generator,
                        &prompt::grounded_prompt(query, &context),
                        CapabilityMode::Full,
                    )
                    .await;
                    ChatExchange {
                        question: query.to_string(),
                        answer,
                        mode,
                        sources: hits.iter().map(SourceRef::from).collect(),
                        context_summary: format!("Used {} document sources", hits.len()),
                    }
                }
                Ok(_) => {
                    info!("No similar documents found");
                    generator_only(generator, query, SUMMARY_NO_MATCHES).await
                }
                Err(e) => {
                    warn!("Error searching similar documents: {}", e);
                    generator_only(generator, query, SUMMARY_RETRIEVAL_FAILED).await
                }
            }
        } else {
            generator_only(generator, query, SUMMARY_NO_DOCUMENTS).await
        };

        info!("Response generated in {} mode", exchange.mode);
        Ok(exchange)
    }

    async fn retrieve(
        &self,
        state: &ServiceState,
        query: &str,
        k: usize,
    ) -> crate::Result<Vec<ScoredChunk>> {
        let (Some(embedder), Some(index)) = (state.embedder.as_ref(), state.index.as_ref()) else {
            return Ok(Vec::new());
        };

        let query_vector = embedder.embed_query(query).await?;
        let mut hits = index.search(&query_vector, k).await?;

        if let Some(min_score) = self.retrieval.min_score {
            hits.retain(|hit| hit.similarity >= min_score);
        }

        debug!("Found {} similar documents", hits.len());
        Ok(hits)
    }
}

async fn generator_only(generator: &dyn Generator, query: &str, summary: &str) -> ChatExchange {
    let (answer, mode) = generate(generator, query, CapabilityMode::GeneratorOnly).await;
    ChatExchange {
        question: query.to_string(),
        answer,
        mode,
        sources: Vec::new(),
        context_summary: summary.to_string(),
    }
}

/// Single generation call; failure becomes the apology and UNAVAILABLE
async fn generate(
    generator: &dyn Generator,
    prompt: &str,
    mode: CapabilityMode,
) -> (String, CapabilityMode) {
    debug!("Generating response with {} mode", mode);
    match generator.generate(prompt).await {
        Ok(answer) => (answer.trim().to_string(), mode),
        Err(e) => {
            error!("Error generating response: {}", e);
            (GENERATION_FAILED.to_string(), CapabilityMode::Unavailable)
        }
    }
}
