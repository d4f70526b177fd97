
use serde::{Deserialize, Serialize};

use super::mode::CapabilityMode;
use super::validation::ValidationError;
use crate::indexer::ScoredChunk;

/// A question with an optional number of chunks to retrieve
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub k: Option<usize>,
}

impl ChatRequest {
    /// Trims `message`; rejects an empty message or a non-positive `k`
    #[inline]
    pub fn new(message: &str, k: Option<i64>) -> Result<Self, ValidationError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(ValidationError::EmptyQuery);
        }

        let k = match k {
            Some(k) if k <= 0 => return Err(ValidationError::InvalidK(k)),
            Some(k) => Some(usize::try_from(k).map_err(|_| ValidationError::InvalidK(k))?),
            None => None,
        };

        Ok(Self {
            message: message.to_string(),
            k,
        })
    }
}

/// Where a piece of retrieved context came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub source_file: String,
    pub page: String,
    /// Similarity rounded to 4 decimal places
    pub score: f64,
}

impl From<&ScoredChunk> for SourceRef {
    #[inline]
    fn from(scored: &ScoredChunk) -> Self {
        Self {
            source_file: scored.chunk.source_id.clone(),
            page: scored.chunk.location.clone(),
            score: round_score(scored.similarity),
        }
    }
}

/// Round for presentation only; ranking uses the raw value
#[inline]
pub fn round_score(similarity: f32) -> f64 {
    (f64::from(similarity) * 10_000.0).round() / 10_000.0
}

/// One answered request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatExchange {
    pub question: String,
    pub answer: String,
    pub mode: CapabilityMode,
    pub sources: Vec<SourceRef>,
    /// Human-readable note on what context reached the generator
    pub context_summary: String,
}

/// Readiness report for callers and operators
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemStatus {
    pub rag_pipeline_ready: bool,
    pub llm_ready: bool,
    pub db_ready: bool,
    pub mode: CapabilityMode,
    pub loaded_documents: Vec<String>,
    pub initialization_error: Option<String>,
    pub message: String,
}
