//! Chat provider trait for streaming conversational replies

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

use crate::error::Result;
use crate::types::ChatMessage;

/// Ordered reply fragments; an `Err` item ends the reply early
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Trait for chat models that stream their replies
///
/// Implementations:
/// - `OllamaChat`: Local Ollama server (gemma3n, llama3.2, etc.)
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Start a reply for the given messages
    async fn chat_stream(&self, messages: &[ChatMessage], temperature: f32)
        -> Result<FragmentStream>;

    /// Names of the models the provider can serve
    async fn list_models(&self) -> Result<Vec<String>>;

    /// Whether the configured model is among the installed ones
    async fn is_model_available(&self) -> Result<bool> {
        let model = self.model();
        let installed = self.list_models().await?;
        Ok(installed
            .iter()
            .any(|name| crate::generation::ollama::model_matches(name, model)))
    }

    /// Get provider name for logging
    fn name(&self) -> &str;

    /// Get the model being used
    fn model(&self) -> &str;
}
