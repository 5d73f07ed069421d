//! Deterministic in-process providers for tests

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::types::ChatMessage;

use super::chat::{ChatProvider, FragmentStream};
use super::embedding::EmbeddingProvider;

/// Bag-of-characters embedder: similar texts get similar vectors
pub struct HashEmbedder {
    reported: usize,
    produced: usize,
    fail_marker: Option<String>,
    available: bool,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            reported: dimensions,
            produced: dimensions,
            fail_marker: None,
            available: true,
        }
    }

    /// Fail any text containing `marker`
    pub fn failing_on(mut self, marker: &str) -> Self {
        self.fail_marker = Some(marker.to_string());
        self
    }

    /// Report one dimensionality but produce vectors of another length
    pub fn producing(mut self, produced: usize) -> Self {
        self.produced = produced;
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.produced];
        if self.produced == 0 {
            return v;
        }
        for c in text.to_lowercase().chars().filter(|c| c.is_alphanumeric()) {
            v[(c as usize).wrapping_mul(31) % self.produced] += 1.0;
        }
        v
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(marker) = &self.fail_marker {
            if text.contains(marker.as_str()) {
                return Err(Error::embedding("injected failure"));
            }
        }
        Ok(self.vector_for(text))
    }

    fn dimensions(&self) -> usize {
        self.reported
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(self.available)
    }

    fn name(&self) -> &str {
        "hash"
    }

    fn model(&self) -> &str {
        "hash-embed"
    }
}

/// Chat provider replaying a fixed list of fragments
pub struct ScriptedChat {
    fragments: Vec<String>,
    fail_after: Option<usize>,
    fail_to_start: bool,
    models: Vec<String>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedChat {
    pub fn new(fragments: &[&str]) -> Self {
        Self {
            fragments: fragments.iter().map(|s| s.to_string()).collect(),
            fail_after: None,
            fail_to_start: false,
            models: vec!["gemma3n:latest".into()],
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Emit `n` fragments, then an error item
    pub fn failing_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    /// Reject the request before any fragment
    pub fn refusing(mut self) -> Self {
        self.fail_to_start = true;
        self
    }

    /// Every message list sent so far
    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl ChatProvider for ScriptedChat {
    async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        _temperature: f32,
    ) -> Result<FragmentStream> {
        self.requests.lock().push(messages.to_vec());
        if self.fail_to_start {
            return Err(Error::llm("connection refused"));
        }

        let mut items: Vec<Result<String>> = Vec::new();
        for (i, fragment) in self.fragments.iter().enumerate() {
            if self.fail_after == Some(i) {
                break;
            }
            items.push(Ok(fragment.clone()));
        }
        if self.fail_after.is_some() {
            items.push(Err(Error::llm("stream interrupted")));
        }

        Ok(Box::pin(futures::stream::iter(items)))
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        Ok(self.models.clone())
    }

    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "gemma3n"
    }
}
