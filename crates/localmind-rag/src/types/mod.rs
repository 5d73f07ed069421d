//! Core types for the knowledge base

pub mod chat;
pub mod document;
pub mod ingest;

pub use chat::{ChatMessage, Role};
pub use document::{chunk_set_digest, meta, Chunk, Document, FileKind, Metadata, Upload};
pub use ingest::{
    FailedBatch, IngestProgress, IngestionSummary, LoadWarning, SkipReason, SkippedFile,
};
