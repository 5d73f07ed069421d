//! localmind-rag: local knowledge-base chat assistant over Ollama
//!
//! Plain text, markdown and PDF uploads are split into overlapping chunks,
//! embedded through Ollama and kept in a persistent SQLite vector index.
//! Each chat turn retrieves the closest passages, injects them as context
//! and streams the model's reply.

pub mod config;
pub mod error;
pub mod generation;
pub mod ingestion;
pub mod knowledge;
pub mod providers;
pub mod retrieval;
pub mod storage;
pub mod types;

pub use config::RagConfig;
pub use error::{Error, Result};
pub use generation::{AssistantMode, Conversation, TurnOutcome};
pub use ingestion::IngestionPipeline;
pub use knowledge::{KnowledgeBase, KnowledgeBaseState};
pub use retrieval::{ContextAssembler, RetrievedContext};
pub use types::{Chunk, Document, IngestProgress, IngestionSummary, Upload};
