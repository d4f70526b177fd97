
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;

use super::Embedder;
use crate::RagError;
use crate::config::Config;

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_millis(1000);
const EXPONENTIAL_BACKOFF_BASE: u32 = 2;
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);
const PROBE_TEXT: &str = "Test embedding";

#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: Url,
    model: String,
    batch_size: u32,
    agent: ureq::Agent,
    retry_attempts: u32,
    retry_base_delay: Duration,
    dimension: Option<usize>,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub size: Option<u64>,
    pub digest: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    models: Vec<ModelInfo>,
}

impl OllamaClient {
    #[inline]
    pub fn new(config: &Config) -> Result<Self> {
        let base_url = config
            .ollama_url()
            .context("Failed to generate Ollama URL from config")?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)))
            .build()
            .into();

        Ok(Self {
            base_url,
            model: config.ollama.model.clone(),
            batch_size: config.ollama.batch_size,
            agent,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_base_delay: DEFAULT_RETRY_BASE_DELAY,
            dimension: None,
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        self
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    /// Base delay of the exponential backoff between retries
    #[inline]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Dimension fixed by [`OllamaClient::probe`], if it has run
    #[inline]
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    /// Embed a fixed test string to prove the model works and pin its dimension
    #[inline]
    pub fn probe(&mut self) -> Result<usize> {
        debug!("Probing embedding model {} at {}", self.model, self.base_url);

        let vectors = self
            .request_embeddings(&[PROBE_TEXT.to_string()])
            .context("Embedding model probe failed")?;
        let dimension = vectors.first().map_or(0, Vec::len);

        if dimension == 0 {
            return Err(anyhow::anyhow!(
                "Embedding model '{}' returned an empty vector",
                self.model
            ));
        }

        self.dimension = Some(dimension);
        info!(
            "Embedding model {} ready ({} dimensions)",
            self.model, dimension
        );
        Ok(dimension)
    }

    /// Check that the server answers and serves the configured model
    #[inline]
    pub fn health_check(&self) -> Result<()> {
        let models = self.list_models().context("Ollama server is not reachable")?;

        if models.iter().any(|m| m.name == self.model) {
            debug!("Model {} is available at {}", self.model, self.base_url);
            return Ok(());
        }

        let available = models.iter().map(|m| m.name.as_str()).collect::<Vec<_>>();
        warn!("Model {} not found, server has {:?}", self.model, available);
        Err(anyhow::anyhow!(
            "Model '{}' is not available. Available models: {:?}",
            self.model,
            available
        ))
    }

    /// Models installed on the server, from `/api/tags`
    #[inline]
    pub fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = self
            .base_url
            .join("/api/tags")
            .context("Failed to build models URL")?;

        let body = self
            .make_request_with_retry(|| {
                self.agent
                    .get(url.as_str())
                    .call()
                    .and_then(|mut resp| resp.body_mut().read_to_string())
            })
            .context("Failed to fetch models")?;

        let tags: ModelsResponse =
            serde_json::from_str(&body).context("Failed to parse models response")?;
        Ok(tags.models)
    }

    /// Generate embeddings for multiple text inputs using batch processing
    #[inline]
    pub fn generate_embeddings_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Generating embeddings for {} texts", texts.len());

        let mut results = Vec::with_capacity(texts.len());

        // Process in batches to avoid overwhelming the server
        for chunk in texts.chunks(self.batch_size.max(1) as usize) {
            let batch_results = self
                .request_embeddings(chunk)
                .with_context(|| format!("Failed to process batch of {} texts", chunk.len()))?;

            results.extend(batch_results);
        }

        debug!("Generated {} embeddings total", results.len());
        Ok(results)
    }

    /// Single `/api/embed` round trip; queries and documents both go through here
    fn request_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbedRequest {
            model: &self.model,
            input: texts,
        };

        let url = self
            .base_url
            .join("/api/embed")
            .context("Failed to build embedding URL")?;

        let request_json =
            serde_json::to_string(&request).context("Failed to serialize embedding request")?;

        let response_text = self
            .make_request_with_retry(|| {
                self.agent
                    .post(url.as_str())
                    .header("Content-Type", "application/json")
                    .send(&request_json)
                    .and_then(|mut resp| resp.body_mut().read_to_string())
            })
            .context("Failed to generate embeddings")?;

        let embed_response: EmbedResponse =
            serde_json::from_str(&response_text).context("Failed to parse embedding response")?;

        if embed_response.embeddings.len() != texts.len() {
            return Err(anyhow::anyhow!(
                "Mismatch between request and response counts: {} vs {}",
                texts.len(),
                embed_response.embeddings.len()
            ));
        }

        if let Some(expected) = self.dimension {
            if let Some(bad) = embed_response
                .embeddings
                .iter()
                .find(|vector| vector.len() != expected)
            {
                return Err(anyhow::anyhow!(
                    "Embedding dimension changed from {} to {}",
                    expected,
                    bad.len()
                ));
            }
        }

        Ok(embed_response.embeddings)
    }

    /// Run `request_fn` until it succeeds, backing off exponentially on
    /// transport failures and 5xx responses
    fn make_request_with_retry<F>(&self, mut request_fn: F) -> Result<String>
    where
        F: FnMut() -> Result<String, ureq::Error>,
    {
        let mut attempt = 1;
        loop {
            let error = match request_fn() {
                Ok(body) => return Ok(body),
                Err(error) => error,
            };

            if !is_transient(&error) {
                warn!("Request to {} failed permanently: {}", self.base_url, error);
                return Err(match error {
                    ureq::Error::StatusCode(status) => {
                        anyhow::anyhow!("Client error: HTTP {}", status)
                    }
                    other => anyhow::anyhow!("Non-retryable error: {}", other),
                });
            }

            if attempt >= self.retry_attempts {
                error!(
                    "Request to {} failed after {} attempts: {}",
                    self.base_url, attempt, error
                );
                return Err(anyhow::anyhow!("Request error: {}", error));
            }

            let delay = backoff_delay(self.retry_base_delay, attempt);
            warn!(
                "Request attempt {}/{} failed ({}), retrying in {:?}",
                attempt, self.retry_attempts, error, delay
            );
            std::thread::sleep(delay);
            attempt += 1;
        }
    }
}

/// Delay before retrying after the given 1-based attempt, capped at [`MAX_RETRY_DELAY`]
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let factor = EXPONENTIAL_BACKOFF_BASE
        .checked_pow(attempt.saturating_sub(1))
        .unwrap_or(u32::MAX);
    base.saturating_mul(factor).min(MAX_RETRY_DELAY)
}

fn is_transient(error: &ureq::Error) -> bool {
    match error {
        ureq::Error::StatusCode(status) => *status >= 500,
        ureq::Error::ConnectionFailed
        | ureq::Error::HostNotFound
        | ureq::Error::Timeout(_)
        | ureq::Error::Io(_) => true,
        _ => false,
    }
}

#[async_trait]
impl Embedder for OllamaClient {
    fn identity(&self) -> String {
        format!("ollama/{}/{}", self.model, self.dimension.unwrap_or(0))
    }

    async fn embed_documents(&self, texts: &[String]) -> crate::Result<Vec<Vec<f32>>> {
        let client = self.clone();
        let texts = texts.to_vec();

        tokio::task::spawn_blocking(move || client.generate_embeddings_batch(&texts))
            .await
            .map_err(|e| RagError::Embedding(format!("Embedding task failed: {}", e)))?
            .map_err(|e| RagError::Embedding(format!("{:#}", e)))
    }
}
