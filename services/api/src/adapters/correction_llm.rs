//! services/api/src/adapters/correction_llm.rs
//!
//! This module contains the adapter for the correcting LLM.
//! It implements the `TextCorrectionService` port from the `core` crate.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use lingo_core::domain::Language;
use lingo_core::ports::{PortError, PortResult, TextCorrectionService};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `TextCorrectionService` using an OpenAI chat model.
/// The model is chosen per request by the caller.
#[derive(Clone)]
pub struct OpenAiCorrectionAdapter {
    client: Client<OpenAIConfig>,
}

impl OpenAiCorrectionAdapter {
    /// Creates a new `OpenAiCorrectionAdapter`.
    pub fn new(client: Client<OpenAIConfig>) -> Self {
        Self { client }
    }
}

fn system_instructions(language: Language) -> String {
    format!(
        "You are a meticulous {label} language tutor. The user writes in {label} and may mix in \
words from other languages or make spelling, grammar and word-choice mistakes. \
Rewrite the text as a fluent native {label} speaker would write it, keeping the meaning, tone and formatting. \
Translate stray foreign words into {label}. Reply with the corrected text only: no quotes, no comments, no explanation.",
        label = language.label()
    )
}

//=========================================================================================
// `TextCorrectionService` Trait Implementation
//=========================================================================================

#[async_trait]
impl TextCorrectionService for OpenAiCorrectionAdapter {
    async fn correct(&self, text: &str, model: &str, language: Language) -> PortResult<String> {
        let messages = vec![
            ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(system_instructions(language))
                    .build()
                    .map_err(|e| PortError::Unexpected(e.to_string()))?,
            ),
            ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessageArgs::default()
                    .content(text)
                    .build()
                    .map_err(|e| PortError::Unexpected(e.to_string()))?,
            ),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(model)
            .messages(messages)
            .temperature(0.2)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unexpected(e.to_string()))?;

        let corrected = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| PortError::Unexpected("No correction generated".to_string()))?;

        Ok(corrected.trim().to_string())
    }
}
