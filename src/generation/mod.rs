// Generation module
// Text generators that turn a prompt into an answer

pub mod completions;

use async_trait::async_trait;

use crate::Result;

pub use completions::CompletionsClient;

/// Produces free text for a prompt in a single, non-streaming call
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}
