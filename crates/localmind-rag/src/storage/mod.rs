//! Storage module for the persistent vector index
//!
//! Provides a SQLite-backed chunk index with embedding search.

mod vector_store;

pub use vector_store::{ScoredChunk, VectorStore, INDEX_FILE};
