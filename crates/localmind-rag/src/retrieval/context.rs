//! Context assembly from the vector index

use crate::config::RetrievalConfig;
use crate::knowledge::KnowledgeBaseState;
use crate::storage::ScoredChunk;

/// Passages retrieved for one query
#[derive(Debug, Clone, Default)]
pub struct RetrievedContext {
    /// Passage texts joined by the delimiter, best first
    pub text: String,
    /// The hits behind `text`
    pub passages: Vec<ScoredChunk>,
}

impl RetrievedContext {
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// Distinct sources in rank order
    pub fn sources(&self) -> Vec<String> {
        let mut sources: Vec<String> = Vec::new();
        for passage in &self.passages {
            let citation = passage.chunk.format_citation();
            if !sources.contains(&citation) {
                sources.push(citation);
            }
        }
        sources
    }
}

/// Retrieves the top-k passages for a query and joins them
#[derive(Debug, Clone)]
pub struct ContextAssembler {
    top_k: usize,
    delimiter: String,
}

impl ContextAssembler {
    pub fn new(top_k: usize, delimiter: impl Into<String>) -> Self {
        Self {
            top_k,
            delimiter: delimiter.into(),
        }
    }

    /// Create from config
    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self::new(config.top_k, config.delimiter.clone())
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Retrieve context for `query`
    ///
    /// Returns an empty context when retrieval is disabled, the index is
    /// empty, or the search fails. Failures are logged, never raised.
    pub async fn retrieve(&self, state: &KnowledgeBaseState, query: &str) -> RetrievedContext {
        let Some(kb) = state.knowledge_base() else {
            return RetrievedContext::default();
        };

        match kb.store().similarity_search(query, self.top_k).await {
            Ok(hits) => {
                tracing::debug!("Retrieved {} passage(s)", hits.len());
                self.assemble(hits)
            }
            Err(e) => {
                tracing::error!("Retrieval failed, answering without context: {}", e);
                RetrievedContext::default()
            }
        }
    }

    /// Join passage texts in rank order
    pub fn assemble(&self, passages: Vec<ScoredChunk>) -> RetrievedContext {
        let text = passages
            .iter()
            .map(|p| p.chunk.text.as_str())
            .collect::<Vec<_>>()
            .join(&self.delimiter);
        RetrievedContext { text, passages }
    }
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self::from_config(&RetrievalConfig::default())
    }
}
