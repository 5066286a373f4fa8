//! crates/lingo_core/src/tutor.rs
//!
//! The explanation chat about a corrected text, and lessons distilled from it.

use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::OrchestratorConfig;
use crate::domain::{ChatMessage, ChatSession, Lesson, Sender, UserProgress};
use crate::error::{bounded, OrchestratorError, OrchestratorResult};
use crate::ports::{ChatRole, ChatTurn, ExplanationService, StorageAdapter};
use crate::progress::{persist_progress, Persisted, SharedProgress};

/// Shown in place of the first explanation when the tutor cannot be reached.
pub const EXPLANATION_FALLBACK: &str = "Sorry, I couldn't fetch the explanation.";

pub const LESSON_SYSTEM_PROMPT: &str = "You are a helpful language tutor. Turn the conversation you are given into a short learning summary with three sections: 1) Key Vocabulary (5-8 words from the conversation with translations), 2) Useful Phrases (3-5 practical expressions), 3) Grammar Tips (1-2 grammar points with simple examples). Stay concise and practical.";

#[derive(Debug, Clone)]
pub struct LessonOutcome {
    pub lesson: Lesson,
    pub progress: UserProgress,
    /// False when the points award could not be written.
    pub persisted: bool,
}

pub struct TutorOrchestrator {
    explainer: Arc<dyn ExplanationService>,
    storage: Arc<dyn StorageAdapter>,
    progress: SharedProgress,
    config: OrchestratorConfig,
}

impl TutorOrchestrator {
    pub fn new(
        explainer: Arc<dyn ExplanationService>,
        storage: Arc<dyn StorageAdapter>,
        progress: SharedProgress,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            explainer,
            storage,
            progress,
            config,
        }
    }

    /// Loads the session for `corrected_text`, asking the tutor for the first
    /// explanation when the conversation has not started yet.
    pub async fn open_explanation(
        &self,
        corrected_text: &str,
    ) -> OrchestratorResult<Persisted<ChatSession>> {
        if corrected_text.trim().is_empty() {
            return Err(OrchestratorError::Validation(
                "There is no corrected text to explain.".to_string(),
            ));
        }

        let existing = match self.storage.find_session_by_corrected_text(corrected_text).await {
            Ok(found) => found,
            Err(e) => {
                warn!("Session lookup failed, starting a fresh one: {}", e);
                None
            }
        };
        let mut session = existing.unwrap_or_else(|| ChatSession::new(corrected_text));
        if !session.messages.is_empty() {
            return Ok(Persisted {
                value: session,
                persisted: true,
            });
        }

        let prompt = ChatTurn {
            role: ChatRole::User,
            content: format!(
                "Please explain the corrections you made to the following text.\n\nCorrected text:\n{}",
                corrected_text
            ),
        };
        let explanation = match bounded(
            self.config.upstream_timeout,
            self.explainer.reply(&[prompt], None, None),
        )
        .await
        {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Initial explanation failed: {}", e);
                EXPLANATION_FALLBACK.to_string()
            }
        };
        session.messages.push(ChatMessage::tutor(explanation));

        Ok(self.store(session).await)
    }

    /// Appends the user's message and the tutor's reply to `session`.
    ///
    /// The user message is stored before the tutor is asked, so it survives
    /// an upstream failure.
    pub async fn send_message(
        &self,
        session: &mut ChatSession,
        text: &str,
    ) -> OrchestratorResult<Persisted<ChatMessage>> {
        let text = text.trim();
        if text.is_empty() {
            return Err(OrchestratorError::Validation("Type a message first.".to_string()));
        }

        session.messages.push(ChatMessage::user(text));
        let stored = self.store(session.clone()).await;
        *session = stored.value;

        let turns: Vec<ChatTurn> = session.messages.iter().map(to_turn).collect();
        let reply = bounded(self.config.upstream_timeout, self.explainer.reply(&turns, None, None))
            .await
            .map_err(|e| {
                warn!(session_id = %session.id, "Tutor reply failed: {}", e);
                OrchestratorError::Upstream(e)
            })?;

        let message = ChatMessage::tutor(reply);
        session.messages.push(message.clone());
        let stored_reply = self.store(session.clone()).await;
        *session = stored_reply.value;

        Ok(Persisted {
            value: message,
            persisted: stored.persisted && stored_reply.persisted,
        })
    }

    /// Summarises the conversation into a saved lesson and awards the lesson
    /// points. The lesson is saved before any points are given.
    pub async fn create_lesson(&self, session: &ChatSession) -> OrchestratorResult<LessonOutcome> {
        if session.messages.is_empty() {
            return Err(OrchestratorError::Validation(
                "There is no conversation to build a lesson from.".to_string(),
            ));
        }

        let conversation = session
            .messages
            .iter()
            .map(|m| match m.sender {
                Sender::User => format!("User: {}", m.text),
                Sender::Tutor => format!("Tutor: {}", m.text),
            })
            .collect::<Vec<_>>()
            .join("\n\n");
        let prompt = ChatTurn {
            role: ChatRole::User,
            content: format!(
                "Based on this conversation about language learning and corrections, create a concise learning summary with key vocabulary, useful phrases, and grammar tips:\n\n{}",
                conversation
            ),
        };

        let content = bounded(
            self.config.upstream_timeout,
            self.explainer.reply(&[prompt], Some(LESSON_SYSTEM_PROMPT), None),
        )
        .await
        .map_err(|e| {
            warn!(session_id = %session.id, "Lesson generation failed: {}", e);
            OrchestratorError::Upstream(e)
        })?;

        let title = format!("Lesson from conversation: {}", Utc::now().format("%Y-%m-%d"));
        let lesson = self
            .storage
            .save_lesson(Lesson::new(title, content))
            .await
            .map_err(|e| {
                error!(backend = ?self.storage.kind(), "Failed to save lesson: {}", e);
                OrchestratorError::Persistence(e)
            })?;
        info!(lesson_id = %lesson.id, "Lesson saved.");

        let reward = self.config.lesson_reward;
        let progress = self.progress.update(|p| p.award(reward)).await;
        let persisted = persist_progress(self.storage.as_ref(), &progress).await;

        Ok(LessonOutcome {
            lesson,
            progress,
            persisted,
        })
    }

    pub async fn list_lessons(&self) -> OrchestratorResult<Vec<Lesson>> {
        self.storage
            .list_lessons()
            .await
            .map_err(OrchestratorError::Persistence)
    }

    pub async fn delete_lesson(&self, lesson_id: Uuid) -> OrchestratorResult<()> {
        self.storage
            .delete_lesson(lesson_id)
            .await
            .map_err(OrchestratorError::Persistence)
    }

    /// Past sessions for the history page, newest first.
    pub async fn list_sessions(&self) -> OrchestratorResult<Vec<ChatSession>> {
        self.storage
            .list_sessions()
            .await
            .map_err(OrchestratorError::Persistence)
    }

    /// Upserts, falling back to the in-memory copy when the write fails.
    async fn store(&self, session: ChatSession) -> Persisted<ChatSession> {
        match self.storage.upsert_session(session.clone()).await {
            Ok(stored) => Persisted {
                value: stored,
                persisted: true,
            },
            Err(e) => {
                error!(
                    backend = ?self.storage.kind(),
                    session_id = %session.id,
                    "Failed to store chat session: {}", e
                );
                Persisted {
                    value: session,
                    persisted: false,
                }
            }
        }
    }
}

fn to_turn(message: &ChatMessage) -> ChatTurn {
    ChatTurn {
        role: match message.sender {
            Sender::User => ChatRole::User,
            Sender::Tutor => ChatRole::Assistant,
        },
        content: message.text.clone(),
    }
}
