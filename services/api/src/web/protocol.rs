//! services/api/src/web/protocol.rs
//!
//! Defines the WebSocket message protocol between the browser client and the API server
//! for the correction session.

use lingo_core::domain::{
    ChatMessage, ChatSession, CorrectionResult, Detection, Language, Lesson, UserProgress,
};
use lingo_core::ports::StorageKind;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

//=========================================================================================
// Messages Sent FROM the Client (Browser) TO the Server
//=========================================================================================

/// Represents the structured text messages a client can send to the server.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Initializes a session. This must be the first message sent on the connection.
    /// Guests send the device id they were given earlier, or none to get a new one.
    Init {
        #[serde(default)]
        device_id: Option<String>,
    },

    /// The draft changed. Sent on every keystroke; the server debounces.
    TextChanged { text: String },

    SetAutoDetect { enabled: bool },

    /// A language picked from the dropdown. Turns auto-detect off.
    SelectLanguage { language: Language },

    SelectModel { model: String },

    /// Corrects the current draft.
    Correct,

    /// Opens the tutor chat for a corrected text. Without one, the last
    /// correction of this connection is used.
    OpenExplanation {
        #[serde(default)]
        corrected_text: Option<String>,
    },

    SendChatMessage { text: String },

    /// Turns the open conversation into a saved lesson.
    CreateLesson,

    ListLessons,

    DeleteLesson { lesson_id: Uuid },

    /// Past chat sessions for the history page.
    ListSessions,
}

//=========================================================================================
// Messages Sent FROM the Server TO the Client (Browser)
//=========================================================================================

/// Represents the structured text messages the server can send to the client.
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Confirms successful session initialization.
    SessionInitialized {
        backend: StorageKind,
        /// Present for guests; the client keeps it for the next connection.
        #[serde(skip_serializing_if = "Option::is_none")]
        device_id: Option<String>,
        progress: UserProgress,
        auto_detect: bool,
        language: Language,
        model: String,
    },

    /// The visible detection or the effective language changed.
    DetectionChanged {
        detection: Detection,
        in_flight: bool,
        generation: u64,
        resolved_language: Language,
    },

    /// A correction finished and was counted.
    CorrectionReady {
        result: CorrectionResult,
        reward: u32,
        progress: UserProgress,
        #[serde(skip_serializing_if = "Option::is_none")]
        session_id: Option<Uuid>,
    },

    ExplanationOpened { session: ChatSession },

    TutorReply { message: ChatMessage },

    LessonCreated { lesson: Lesson, progress: UserProgress },

    Lessons { lessons: Vec<Lesson> },

    LessonDeleted { lesson_id: Uuid },

    Sessions { sessions: Vec<ChatSession> },

    /// Something the user should know about that did not stop the action,
    /// e.g. a save that failed after the screen was updated.
    Notice { message: String },

    /// Reports a failed action to the client, which should display an error message.
    Error { message: String },
}
