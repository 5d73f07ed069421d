//! Answer generation: Ollama client, prompts and conversation state

pub mod conversation;
pub mod ollama;
pub mod prompt;

pub use conversation::{Conversation, TurnOutcome};
pub use ollama::OllamaClient;
pub use prompt::{AssistantMode, PromptBuilder};
