//! Ingestion outcome types: per-file skips, warnings, failed batches, progress

use serde::{Deserialize, Serialize};

/// Reason a file was skipped
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    /// Declared type outside the allow-list
    UnsupportedFileType(String),
    /// File could not be read or parsed
    FileLoadFailed(String),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::UnsupportedFileType(tag) => write!(f, "unsupported file type '{}'", tag),
            SkipReason::FileLoadFailed(message) => write!(f, "load failed: {}", message),
        }
    }
}

/// A file that contributed no documents
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SkippedFile {
    /// Original filename
    pub filename: String,
    /// Why it was skipped
    pub reason: SkipReason,
}

/// Advisory raised while loading (not an error)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LoadWarning {
    /// The file loaded but holds no non-whitespace text (e.g. a scanned PDF)
    EmptyContent { filename: String },
}

impl std::fmt::Display for LoadWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadWarning::EmptyContent { filename } => write!(
                f,
                "no text content detected in '{}' (scanned PDFs need a text layer)",
                filename
            ),
        }
    }
}

/// A batch that was reported and skipped
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FailedBatch {
    /// 0-indexed batch number
    pub index: usize,
    /// Chunks in the batch
    pub chunk_count: usize,
    /// Failure message
    pub message: String,
}

/// Overall result of one ingestion call
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestionSummary {
    /// Files that produced at least one document
    pub files_loaded: Vec<String>,
    /// Files skipped with reason
    pub skipped: Vec<SkippedFile>,
    /// Advisory warnings
    pub warnings: Vec<LoadWarning>,
    /// Chunks produced by splitting
    pub chunks_total: usize,
    /// Chunks committed to the index
    pub chunks_inserted: usize,
    /// Batches attempted
    pub batches_total: usize,
    /// Batches reported and skipped
    pub failed_batches: Vec<FailedBatch>,
    /// Set when a configuration error stopped the remaining batches
    pub aborted: Option<String>,
}

impl IngestionSummary {
    /// Whether every file loaded and every batch landed
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty() && self.failed_batches.is_empty() && self.aborted.is_none()
    }
}

/// Progress events emitted during ingestion
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IngestProgress {
    /// After each file is loaded (or skipped)
    Loading { done: usize, total: usize },
    /// After each batch is attempted
    Embedding {
        batch: usize,
        total_batches: usize,
        fraction: f32,
    },
}
