//! Knowledge base lifecycle: connect once at startup, degrade to plain chat on failure

use std::sync::Arc;

use crate::config::RagConfig;
use crate::error::Result;
use crate::providers::EmbeddingProvider;
use crate::storage::VectorStore;

/// An initialized vector index and the embedder it was built with
pub struct KnowledgeBase {
    store: VectorStore,
}

impl KnowledgeBase {
    /// Open the index described by `config`
    pub async fn open(config: &RagConfig, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        let store = VectorStore::initialize(
            &config.vector_db.persist_dir,
            config.embeddings.dimensions,
            config.vector_db.distance_metric,
            embedder,
        )
        .await?;
        Ok(Self { store })
    }

    pub fn from_store(store: VectorStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    /// Remove every chunk; the prior state is kept if this fails
    pub fn clear(&self) -> Result<()> {
        self.store.clear()
    }
}

/// Whether retrieval is available for this session
pub enum KnowledgeBaseState {
    Ready(KnowledgeBase),
    /// Initialization failed; chat continues without retrieval
    Disabled { reason: String },
}

impl KnowledgeBaseState {
    /// Connect to the knowledge base, never failing the session
    pub async fn connect(config: &RagConfig, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        match KnowledgeBase::open(config, embedder).await {
            Ok(kb) => Self::Ready(kb),
            Err(e) => {
                tracing::error!("Knowledge base disabled: {}", e);
                Self::Disabled {
                    reason: e.to_string(),
                }
            }
        }
    }

    pub fn knowledge_base(&self) -> Option<&KnowledgeBase> {
        match self {
            Self::Ready(kb) => Some(kb),
            Self::Disabled { .. } => None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    pub fn disabled_reason(&self) -> Option<&str> {
        match self {
            Self::Ready(_) => None,
            Self::Disabled { reason } => Some(reason),
        }
    }
}
