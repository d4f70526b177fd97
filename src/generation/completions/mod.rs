
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::Generator;
use crate::RagError;
use crate::config::{API_KEY_ENV, GeneratorConfig};

const PROBE_PROMPT: &str = "Hello";

/// Client for an OpenAI-compatible `/chat/completions` endpoint
#[derive(Debug, Clone)]
pub struct CompletionsClient {
    endpoint: String,
    model: String,
    temperature: f32,
    api_key: String,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: [Message<'a>; 1],
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl CompletionsClient {
    /// Build a client; fails when no API key is configured or set in the environment
    #[inline]
    pub fn new(config: &GeneratorConfig) -> Result<Self> {
        let api_key = config
            .resolved_api_key()
            .with_context(|| format!("{} not configured", API_KEY_ENV))?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(config.timeout()))
            .build()
            .into();

        Ok(Self {
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            temperature: config.temperature,
            api_key,
            agent,
        })
    }

    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send a throwaway prompt to prove the endpoint and credentials work
    #[inline]
    pub fn probe(&self) -> Result<()> {
        debug!("Probing generator {} at {}", self.model, self.endpoint);
        self.complete(PROBE_PROMPT)
            .context("Generator probe failed")?;
        info!("Generator {} ready", self.model);
        Ok(())
    }

    /// Single chat completion for `prompt`, returned trimmed
    #[inline]
    pub fn complete(&self, prompt: &str) -> Result<String> {
        let request = CompletionRequest {
            model: &self.model,
            messages: [Message {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
            stream: false,
        };

        let request_json =
            serde_json::to_string(&request).context("Failed to serialize completion request")?;

        let response_text = self
            .agent
            .post(self.endpoint.as_str())
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send(&request_json)
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(|error| match error {
                ureq::Error::StatusCode(status) => {
                    warn!("Generator returned HTTP {}", status);
                    anyhow::anyhow!("Generator returned HTTP {}", status)
                }
                other => anyhow::anyhow!("Generator request failed: {}", other),
            })?;

        let response: CompletionResponse = serde_json::from_str(&response_text)
            .context("Failed to parse completion response")?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .context("Completion response contained no message")?;

        Ok(content.trim().to_string())
    }
}

#[async_trait]
impl Generator for CompletionsClient {
    async fn generate(&self, prompt: &str) -> crate::Result<String> {
        let client = self.clone();
        let prompt = prompt.to_string();

        tokio::task::spawn_blocking(move || client.complete(&prompt))
            .await
            .map_err(|e| RagError::Generation(format!("Generation task failed: {}", e)))?
            .map_err(|e| RagError::Generation(format!("{:#}", e)))
    }
}
