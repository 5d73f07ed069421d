//! Prompt assembly for chat turns

use serde::{Deserialize, Serialize};

use crate::types::{ChatMessage, Role};

/// Preset assistant personas
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "snake_case")]
pub enum AssistantMode {
    #[default]
    General,
    Agriculture,
    Medical,
    WeatherAlert,
    Education,
}

impl AssistantMode {
    pub const ALL: [AssistantMode; 5] = [
        AssistantMode::General,
        AssistantMode::Agriculture,
        AssistantMode::Medical,
        AssistantMode::WeatherAlert,
        AssistantMode::Education,
    ];

    /// Human-readable name
    pub fn label(&self) -> &'static str {
        match self {
            AssistantMode::General => "General assistant",
            AssistantMode::Agriculture => "Agriculture expert",
            AssistantMode::Medical => "Basic medical information",
            AssistantMode::WeatherAlert => "Weather and disaster alerts",
            AssistantMode::Education => "Basic education",
        }
    }

    /// System instruction for this persona
    pub fn system_instruction(&self) -> &'static str {
        match self {
            AssistantMode::General => {
                "You are a helpful assistant. Answer questions using the provided context \
                 (when given) and the conversation history."
            }
            AssistantMode::Agriculture => {
                "You are an experienced agriculture expert. Using the provided crop knowledge and \
                 current farming techniques, give practical advice on planting, pest and disease \
                 control, and yield improvement. Keep answers practical and easy to follow."
            }
            AssistantMode::Medical => {
                "You are a basic medical information assistant. Using the provided medical \
                 knowledge, share information on common health problems, disease prevention and \
                 basic first aid. Always stress that you are not a substitute for a doctor's \
                 diagnosis or treatment, that all information is for reference only, and that \
                 anyone with a health concern should see a doctor promptly."
            }
            AssistantMode::WeatherAlert => {
                "You are a weather and disaster alert assistant. Using the provided weather data \
                 and emergency knowledge, give forecasts, warnings about natural hazards such as \
                 floods, earthquakes and landslides, and emergency response advice. Stress the \
                 importance of following official warnings and evacuation notices."
            }
            AssistantMode::Education => {
                "You are a basic education guide. Explain science, history, geography and other \
                 fundamentals in simple, clear language to help the user learn core concepts."
            }
        }
    }
}

/// Prompt builder for chat turns
pub struct PromptBuilder;

impl PromptBuilder {
    /// Prefix of the system message carrying retrieved passages
    pub const CONTEXT_HEADER: &'static str = "Relevant context:";

    /// Build the ordered message list for one turn
    ///
    /// The system instruction comes first, then the retrieved context as a
    /// second system message when non-empty, then the history without any
    /// earlier system messages.
    pub fn build_messages(
        system_instruction: &str,
        context: &str,
        history: &[ChatMessage],
    ) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(system_instruction));

        if let Some(context) = Self::context_message(context) {
            messages.push(context);
        }

        messages.extend(
            history
                .iter()
                .filter(|m| m.role != Role::System)
                .cloned(),
        );
        messages
    }

    /// System message carrying retrieved context, `None` when there is none
    pub fn context_message(context: &str) -> Option<ChatMessage> {
        if context.trim().is_empty() {
            return None;
        }
        Some(ChatMessage::system(format!(
            "{}\n{}",
            Self::CONTEXT_HEADER,
            context
        )))
    }
}
