//! services/api/src/adapters/detect_llm.rs
//!
//! This module contains the adapter for the language classifier.
//! It implements the `LanguageDetectionService` port from the `core` crate.

const SYSTEM_INSTRUCTIONS: &str = "You identify the language a text is written in. \
Answer with exactly one lowercase word from this list: english, spanish, french, german, italian, portuguese. \
If the text is written in another language, mixes languages without a clear majority, or is too short to tell, answer: unknown. \
Do not add punctuation or any explanation.";

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
use lingo_core::ports::{LanguageDetectionService, PortError, PortResult};
use regex::Regex;
use tracing::debug;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `LanguageDetectionService` using an OpenAI chat model.
#[derive(Clone)]
pub struct OpenAiDetectAdapter {
    client: Client<OpenAIConfig>,
    model: String,
    answer_pattern: Regex,
}

impl OpenAiDetectAdapter {
    /// Creates a new `OpenAiDetectAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> PortResult<Self> {
        Ok(Self {
            client,
            model,
            answer_pattern: answer_pattern()?,
        })
    }
}

fn answer_pattern() -> PortResult<Regex> {
    Regex::new(r"(?i)\b(english|spanish|french|german|italian|portuguese|unknown)\b")
        .map_err(|e| PortError::Unexpected(e.to_string()))
}

/// Reads the classifier's answer. The first recognised word wins; "unknown"
/// and replies without any recognised word both mean no language.
fn parse_answer(pattern: &Regex, reply: &str) -> Option<Language> {
    pattern
        .find(reply)
        .and_then(|m| m.as_str().parse::<Language>().ok())
}

//=========================================================================================
// `LanguageDetectionService` Trait Implementation
//=========================================================================================

#[async_trait]
impl LanguageDetectionService for OpenAiDetectAdapter {
    async fn detect(&self, text: &str) -> PortResult<Option<Language>> {
        let messages = vec![
            ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(SYSTEM_INSTRUCTIONS)
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
            .model(&self.model)
            .messages(messages)
            .temperature(0.0)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unexpected(e.to_string()))?;

        let reply = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .unwrap_or_default();
        let language = parse_answer(&self.answer_pattern, &reply);
        debug!(reply = %reply.trim(), ?language, "Language classifier answered.");
        Ok(language)
    }
}
