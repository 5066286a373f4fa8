//! crates/lingo_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or APIs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{ChatSession, Language, Lesson, User, UserCredentials, UserProgress};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, Clone, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// AI Service Ports
//=========================================================================================

#[async_trait]
pub trait LanguageDetectionService: Send + Sync {
    /// Classifies `text`. `Ok(None)` means the detector answered "unknown".
    async fn detect(&self, text: &str) -> PortResult<Option<Language>>;
}

#[async_trait]
pub trait TextCorrectionService: Send + Sync {
    /// Returns the corrected version of `text`.
    async fn correct(&self, text: &str, model: &str, language: Language) -> PortResult<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// One message of a conversation as sent to the explanation service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

#[async_trait]
pub trait ExplanationService: Send + Sync {
    /// Continues a conversation. `system_prompt` replaces the default tutor
    /// prompt and `model` the configured tutor model.
    async fn reply(
        &self,
        messages: &[ChatTurn],
        system_prompt: Option<&str>,
        model: Option<&str>,
    ) -> PortResult<String>;
}

//=========================================================================================
// Storage Port
//=========================================================================================

/// Which persistence backend a [`StorageAdapter`] writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// Per-device blobs, used when nobody is signed in.
    Local,
    /// Account-scoped rows in the hosted database.
    Remote,
}

/// Persistence capability used by the orchestrator. Each instance is already
/// scoped to one device or one account.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    fn kind(&self) -> StorageKind;

    async fn get_progress(&self) -> PortResult<UserProgress>;

    async fn save_progress(&self, progress: &UserProgress) -> PortResult<()>;

    /// Exact-equality lookup on the corrected text.
    async fn find_session_by_corrected_text(
        &self,
        corrected_text: &str,
    ) -> PortResult<Option<ChatSession>>;

    /// Inserts `session`, or merges it into the stored session with the same
    /// corrected text. Returns the stored record. Calling it twice with the same
    /// corrected text never creates a second session.
    async fn upsert_session(&self, session: ChatSession) -> PortResult<ChatSession>;

    /// Newest first.
    async fn list_sessions(&self) -> PortResult<Vec<ChatSession>>;

    /// Newest first.
    async fn list_lessons(&self) -> PortResult<Vec<Lesson>>;

    async fn save_lesson(&self, lesson: Lesson) -> PortResult<Lesson>;

    async fn delete_lesson(&self, lesson_id: Uuid) -> PortResult<()>;
}

//=========================================================================================
// Account Port
//=========================================================================================

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Creates the user and its default profile.
    async fn create_user_with_email(&self, email: &str, hashed_password: &str) -> PortResult<User>;

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials>;

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()>;

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid>;

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()>;
}
