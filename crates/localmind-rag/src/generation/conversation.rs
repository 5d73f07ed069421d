//! Conversation orchestration: retrieve, prompt, stream, record

use futures::StreamExt;

use crate::config::RagConfig;
use crate::error::Error;
use crate::knowledge::KnowledgeBaseState;
use crate::providers::ChatProvider;
use crate::retrieval::ContextAssembler;
use crate::types::ChatMessage;

use super::prompt::PromptBuilder;

/// Result of one user turn
#[derive(Debug)]
pub struct TurnOutcome {
    /// Concatenated fragments, possibly partial when `error` is set
    pub response: String,
    /// Whether retrieved context was sent with the prompt
    pub context_used: bool,
    /// Sources of the retrieved passages in rank order
    pub sources: Vec<String>,
    /// Provider failure, before or during streaming
    pub error: Option<Error>,
}

impl TurnOutcome {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

/// Chat session state
pub struct Conversation {
    system_instruction: String,
    temperature: f32,
    history: Vec<ChatMessage>,
}

impl Conversation {
    pub fn new(system_instruction: impl Into<String>, temperature: f32) -> Self {
        Self {
            system_instruction: system_instruction.into(),
            temperature: temperature.clamp(0.0, 1.0),
            history: Vec::new(),
        }
    }

    /// Create from config
    pub fn from_config(config: &RagConfig) -> Self {
        Self::new(
            config.assistant.system_instruction(),
            config.llm.effective_temperature(),
        )
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    pub fn system_instruction(&self) -> &str {
        &self.system_instruction
    }

    pub fn set_system_instruction(&mut self, instruction: impl Into<String>) {
        self.system_instruction = instruction.into();
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    pub fn set_temperature(&mut self, temperature: f32) {
        self.temperature = temperature.clamp(0.0, 1.0);
    }

    /// Run one turn
    ///
    /// The user message always enters the history. The assistant reply is
    /// recorded when at least one fragment arrived, even if the stream then
    /// failed. `on_fragment` sees each fragment as it arrives.
    pub async fn respond<F>(
        &mut self,
        state: &KnowledgeBaseState,
        retriever: &ContextAssembler,
        chat: &dyn ChatProvider,
        user_text: &str,
        mut on_fragment: F,
    ) -> TurnOutcome
    where
        F: FnMut(&str) + Send,
    {
        self.history.push(ChatMessage::user(user_text));

        let context = retriever.retrieve(state, user_text).await;
        let context_used = !context.is_empty();
        let messages =
            PromptBuilder::build_messages(&self.system_instruction, &context.text, &self.history);

        let mut outcome = TurnOutcome {
            response: String::new(),
            context_used,
            sources: context.sources(),
            error: None,
        };

        let mut stream = match chat.chat_stream(&messages, self.temperature).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!("Chat request failed: {}", e);
                outcome.error = Some(e);
                return outcome;
            }
        };

        while let Some(item) = stream.next().await {
            match item {
                Ok(fragment) => {
                    on_fragment(&fragment);
                    outcome.response.push_str(&fragment);
                }
                Err(e) => {
                    tracing::error!(
                        "Chat stream failed after {} characters: {}",
                        outcome.response.len(),
                        e
                    );
                    outcome.error = Some(e);
                    break;
                }
            }
        }

        if !outcome.response.is_empty() {
            self.history
                .push(ChatMessage::assistant(outcome.response.clone()));
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DistanceMetric;
    use crate::knowledge::KnowledgeBase;
    use crate::providers::testing::{HashEmbedder, ScriptedChat};
    use crate::storage::VectorStore;
    use crate::types::{meta, Chunk, Metadata, Role};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn disabled() -> KnowledgeBaseState {
        KnowledgeBaseState::Disabled {
            reason: "not configured".into(),
        }
    }

    #[tokio::test]
    async fn test_streams_and_records_turn() {
        let chat = ScriptedChat::new(&["Hel", "lo", "!"]);
        let mut conversation = Conversation::new("Be kind.", 0.7);
        let mut seen = Vec::new();

        let outcome = conversation
            .respond(&disabled(), &ContextAssembler::default(), &chat, "hi", |f| {
                seen.push(f.to_string())
            })
            .await;

        assert!(outcome.is_complete());
        assert_eq!(outcome.response, "Hello!");
        assert!(!outcome.context_used);
        assert_eq!(seen, vec!["Hel", "lo", "!"]);
        assert_eq!(
            conversation.history(),
            &[ChatMessage::user("hi"), ChatMessage::assistant("Hello!")]
        );

        let requests = chat.requests();
        let sent = &requests[0];
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0], ChatMessage::system("Be kind."));
    }

    #[tokio::test]
    async fn test_context_is_injected() {
        let dir = TempDir::new().unwrap();
        let store = VectorStore::initialize(
            dir.path().join("kb"),
            16,
            DistanceMetric::Cosine,
            Arc::new(HashEmbedder::new(16)),
        )
        .await
        .unwrap();
        let mut metadata = Metadata::new();
        metadata.insert(meta::SOURCE.to_string(), "crops.md".to_string());
        store
            .insert_batch(&[Chunk::new("Rotate maize with beans.".into(), metadata)])
            .await
            .unwrap();
        let state = KnowledgeBaseState::Ready(KnowledgeBase::from_store(store));

        let chat = ScriptedChat::new(&["Rotate crops."]);
        let mut conversation = Conversation::new("Be kind.", 0.7);
        let outcome = conversation
            .respond(&state, &ContextAssembler::default(), &chat, "How should I rotate maize?", |_| {})
            .await;

        assert!(outcome.context_used);
        assert_eq!(outcome.sources, vec!["crops.md"]);
        let requests = chat.requests();
        let sent = &requests[0];
        assert_eq!(sent[1].role, Role::System);
        assert_eq!(sent[1].content, "Relevant context:\nRotate maize with beans.");
        assert_eq!(sent[2], ChatMessage::user("How should I rotate maize?"));
    }

    #[tokio::test]
    async fn test_partial_reply_is_kept() {
        let chat = ScriptedChat::new(&["Part", "ial", "never"]).failing_after(2);
        let mut conversation = Conversation::new("Be kind.", 0.7);

        let outcome = conversation
            .respond(&disabled(), &ContextAssembler::default(), &chat, "q", |_| {})
            .await;

        assert_eq!(outcome.response, "Partial");
        assert!(matches!(outcome.error, Some(Error::Llm(_))));
        assert_eq!(conversation.history().len(), 2);
        assert_eq!(conversation.history()[1], ChatMessage::assistant("Partial"));
    }

    #[tokio::test]
    async fn test_refused_request_records_only_user() {
        let chat = ScriptedChat::new(&["unused"]).refusing();
        let mut conversation = Conversation::new("Be kind.", 0.7);

        let outcome = conversation
            .respond(&disabled(), &ContextAssembler::default(), &chat, "q", |_| {})
            .await;

        assert!(outcome.response.is_empty());
        assert!(outcome.error.is_some());
        assert_eq!(conversation.history(), &[ChatMessage::user("q")]);
    }

    #[tokio::test]
    async fn test_history_is_replayed_and_clearable() {
        let chat = ScriptedChat::new(&["ok"]);
        let mut conversation = Conversation::new("Be kind.", 0.7);
        let retriever = ContextAssembler::default();

        conversation.respond(&disabled(), &retriever, &chat, "one", |_| {}).await;
        conversation.respond(&disabled(), &retriever, &chat, "two", |_| {}).await;

        let requests = chat.requests();
        let second = &requests[1];
        assert_eq!(
            &second[1..],
            &[
                ChatMessage::user("one"),
                ChatMessage::assistant("ok"),
                ChatMessage::user("two"),
            ]
        );

        conversation.clear_history();
        assert!(conversation.history().is_empty());
    }

    #[test]
    fn test_temperature_is_clamped() {
        let mut conversation = Conversation::new("x", 3.0);
        assert_eq!(conversation.temperature(), 1.0);
        conversation.set_temperature(-1.0);
        assert_eq!(conversation.temperature(), 0.0);
    }
}
