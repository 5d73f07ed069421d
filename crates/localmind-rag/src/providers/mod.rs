//! Provider abstractions for embeddings and chat
//!
//! Trait-based seams keep the knowledge base and conversation logic
//! independent of the Ollama HTTP client.

pub mod chat;
pub mod embedding;
pub mod ollama;

#[cfg(test)]
pub(crate) mod testing;

pub use chat::{ChatProvider, FragmentStream};
pub use embedding::EmbeddingProvider;
pub use ollama::{OllamaChat, OllamaEmbedder, OllamaProvider};
