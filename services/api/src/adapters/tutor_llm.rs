//! services/api/src/adapters/tutor_llm.rs
//!
//! This module contains the adapter for the tutor chat LLM.
//! It implements the `ExplanationService` port from the `core` crate.

pub const EXPLANATION_SYSTEM_PROMPT: &str = "You are a friendly, encouraging language tutor. \
The user has just had a text corrected and wants to understand the corrections. \
Explain each change briefly: what was wrong, the rule behind it, and one short example. \
Answer follow-up questions about grammar, vocabulary and usage in plain language. \
Keep answers short enough to read in a chat window.";

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use lingo_core::ports::{ChatRole, ChatTurn, ExplanationService, PortError, PortResult};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `ExplanationService` using an OpenAI chat model.
#[derive(Clone)]
pub struct OpenAiTutorAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiTutorAdapter {
    /// Creates a new `OpenAiTutorAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }
}

fn to_request_message(turn: &ChatTurn) -> PortResult<ChatCompletionRequestMessage> {
    let message = match turn.role {
        ChatRole::User => ChatCompletionRequestMessage::User(
            ChatCompletionRequestUserMessageArgs::default()
                .content(turn.content.as_str())
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?,
        ),
        ChatRole::Assistant => ChatCompletionRequestMessage::Assistant(
            ChatCompletionRequestAssistantMessageArgs::default()
                .content(turn.content.as_str())
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?,
        ),
    };
    Ok(message)
}

//=========================================================================================
// `ExplanationService` Trait Implementation
//=========================================================================================

#[async_trait]
impl ExplanationService for OpenAiTutorAdapter {
    async fn reply(
        &self,
        messages: &[ChatTurn],
        system_prompt: Option<&str>,
        model: Option<&str>,
    ) -> PortResult<String> {
        let mut request_messages = Vec::with_capacity(messages.len() + 1);
        request_messages.push(ChatCompletionRequestMessage::System(
            ChatCompletionRequestSystemMessageArgs::default()
                .content(system_prompt.unwrap_or(EXPLANATION_SYSTEM_PROMPT))
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?,
        ));
        for turn in messages {
            request_messages.push(to_request_message(turn)?);
        }

        let request = CreateChatCompletionRequestArgs::default()
            .model(model.unwrap_or(&self.model))
            .messages(request_messages)
            .temperature(0.7)
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
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| PortError::Unexpected("No reply generated".to_string()))?;

        Ok(reply)
    }
}
