//! Error types for the knowledge base and chat pipeline

use thiserror::Error;

/// Result type alias for localmind operations
pub type Result<T> = std::result::Result<T, Error>;

/// Knowledge base and chat errors
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Declared upload type is outside the allow-list
    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    /// File could not be read or parsed
    #[error("Failed to load file '{filename}': {message}")]
    FileLoadFailed { filename: String, message: String },

    /// Embedding model missing or provider unreachable at initialization
    #[error("Embedding provider unavailable: {0}")]
    EmbeddingProviderUnavailable(String),

    /// Embedding generation failed
    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    /// Embedding length differs from the index dimensionality
    #[error("Embedding dimensionality mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A batch could not be embedded or committed; nothing from it was kept
    #[error("Batch insert failed: {0}")]
    BatchInsertFailed(String),

    /// Nearest-neighbor search failed
    #[error("Similarity search failed: {0}")]
    SimilaritySearchFailed(String),

    /// Knowledge base clear failed, prior state kept
    #[error("Failed to clear knowledge base: {0}")]
    ClearFailed(String),

    /// Vector database error
    #[error("Vector database error: {0}")]
    VectorDb(String),

    /// Ollama/LLM error
    #[error("LLM error: {0}")]
    Llm(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request error
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a file load error
    pub fn file_load(filename: impl Into<String>, message: impl Into<String>) -> Self {
        Self::FileLoadFailed {
            filename: filename.into(),
            message: message.into(),
        }
    }

    /// Create an embedding error
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding(message.into())
    }

    /// Create a vector db error
    pub fn vector_db(message: impl Into<String>) -> Self {
        Self::VectorDb(message.into())
    }

    /// Create an LLM error
    pub fn llm(message: impl Into<String>) -> Self {
        Self::Llm(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether this error invalidates the index configuration rather than a single item
    pub fn is_fatal_config(&self) -> bool {
        matches!(
            self,
            Error::DimensionMismatch { .. } | Error::EmbeddingProviderUnavailable(_)
        )
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::VectorDb(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}
