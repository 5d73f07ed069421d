//! Configuration for the knowledge base and chat session

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::generation::AssistantMode;

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RagConfig {
    /// Ollama/LLM configuration
    pub llm: LlmConfig,
    /// Embedding configuration
    pub embeddings: EmbeddingConfig,
    /// Chunking configuration
    pub chunking: ChunkingConfig,
    /// Ingestion configuration
    pub ingestion: IngestionConfig,
    /// Vector database configuration
    pub vector_db: VectorDbConfig,
    /// Retrieval configuration
    pub retrieval: RetrievalConfig,
    /// Assistant persona
    pub assistant: AssistantConfig,
}

impl RagConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing sections
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Cannot read config {}: {}", path.display(), e))
        })?;
        let config: RagConfig = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            return Err(Error::Config("chunking.chunk_size must be greater than 0".into()));
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(Error::Config(format!(
                "chunking.chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunking.chunk_overlap, self.chunking.chunk_size
            )));
        }
        if self.ingestion.batch_size == 0 {
            return Err(Error::Config("ingestion.batch_size must be greater than 0".into()));
        }
        if self.retrieval.top_k == 0 {
            return Err(Error::Config("retrieval.top_k must be greater than 0".into()));
        }
        if self.embeddings.dimensions == 0 {
            return Err(Error::Config("embeddings.dimensions must be greater than 0".into()));
        }
        Ok(())
    }
}

/// LLM (Ollama) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Ollama base URL
    pub base_url: String,
    /// Chat model name
    pub chat_model: String,
    /// Sampling temperature, clamped into [0, 1] when sent
    pub temperature: f32,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Retries for model listing before a failure is final
    pub max_retries: u32,
    /// Base delay for exponential backoff between retries
    pub retry_base_delay_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            chat_model: "gemma3n".to_string(),
            temperature: 0.7,
            timeout_secs: 300, // CPU inference can be slow
            max_retries: 2,
            retry_base_delay_ms: 500,
        }
    }
}

impl LlmConfig {
    /// Temperature limited to the range the chat provider accepts
    pub fn effective_temperature(&self) -> f32 {
        if self.temperature.is_nan() {
            return LlmConfig::default().temperature;
        }
        self.temperature.clamp(0.0, 1.0)
    }
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Ollama embedding model
    pub model: String,
    /// Embedding dimensions (768 for nomic-embed-text)
    pub dimensions: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "nomic-embed-text".to_string(),
            dimensions: 768,
        }
    }
}

/// Text chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk size in characters
    pub chunk_size: usize,
    /// Overlap between consecutive chunks in characters
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

/// Ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    /// Chunks embedded and committed per batch
    pub batch_size: usize,
    /// Scratch directory for loader temp files (system temp dir when unset)
    pub temp_dir: Option<PathBuf>,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            batch_size: 20,
            temp_dir: None,
        }
    }
}

/// Distance metric used by the vector index
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// Cosine similarity
    #[default]
    Cosine,
    /// Euclidean (L2) distance
    Euclidean,
}

impl DistanceMetric {
    /// Stable name stored in the index metadata
    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::Euclidean => "euclidean",
        }
    }

    /// Parse a stored metric name
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "cosine" => Some(DistanceMetric::Cosine),
            "euclidean" | "l2" => Some(DistanceMetric::Euclidean),
            _ => None,
        }
    }
}

/// Vector database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorDbConfig {
    /// Directory holding the persisted index
    pub persist_dir: PathBuf,
    /// Metric for newly created indexes
    pub distance_metric: DistanceMetric,
}

impl Default for VectorDbConfig {
    fn default() -> Self {
        let persist_dir = dirs::data_local_dir()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
            .join("localmind")
            .join("knowledge_base");

        Self {
            persist_dir,
            distance_metric: DistanceMetric::Cosine,
        }
    }
}

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of passages retrieved per question
    pub top_k: usize,
    /// Separator placed between retrieved passages
    pub delimiter: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 4,
            delimiter: "\n".to_string(),
        }
    }
}

/// Assistant persona configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AssistantConfig {
    /// Preset persona
    pub mode: AssistantMode,
    /// Custom system instruction, replaces the preset when set
    pub system_instruction: Option<String>,
}

impl AssistantConfig {
    /// The system instruction sent at the start of every turn
    pub fn system_instruction(&self) -> &str {
        self.system_instruction
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| self.mode.system_instruction())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = RagConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.chunking.chunk_size, 1000);
        assert_eq!(config.chunking.chunk_overlap, 200);
        assert_eq!(config.ingestion.batch_size, 20);
        assert_eq!(config.retrieval.top_k, 4);
    }

    #[test]
    fn test_overlap_must_be_smaller_than_size() {
        let mut config = RagConfig::default();
        config.chunking.chunk_overlap = 1000;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: RagConfig = toml::from_str(
            r#"
            [llm]
            chat_model = "llama3.2"

            [vector_db]
            persist_dir = "/tmp/kb"
            distance_metric = "euclidean"
            "#,
        )
        .unwrap();

        assert_eq!(config.llm.chat_model, "llama3.2");
        assert_eq!(config.llm.base_url, "http://localhost:11434");
        assert_eq!(config.vector_db.distance_metric, DistanceMetric::Euclidean);
        assert_eq!(config.chunking.chunk_size, 1000);
    }

    #[test]
    fn test_temperature_is_clamped() {
        let mut llm = LlmConfig::default();
        llm.temperature = 1.6;
        assert_eq!(llm.effective_temperature(), 1.0);
        llm.temperature = -0.2;
        assert_eq!(llm.effective_temperature(), 0.0);
    }

    #[test]
    fn test_custom_instruction_overrides_mode() {
        let mut assistant = AssistantConfig::default();
        assert_eq!(
            assistant.system_instruction(),
            AssistantMode::General.system_instruction()
        );
        assistant.system_instruction = Some("Answer in haiku.".into());
        assert_eq!(assistant.system_instruction(), "Answer in haiku.");
    }
}
