pub mod config;
pub mod correction;
pub mod detection;
pub mod domain;
pub mod error;
pub mod language;
pub mod ports;
pub mod progress;
pub mod session;
pub mod tutor;

#[cfg(test)]
pub(crate) mod testing;

pub use config::OrchestratorConfig;
pub use correction::{CorrectionOrchestrator, CorrectionOutcome};
pub use detection::DetectionDebouncer;
pub use domain::{
    ChatMessage, ChatSession, CorrectionResult, Detection, DetectionState, InputDraft, Language,
    Lesson, Sender, User, UserCredentials, UserProgress,
};
pub use error::{OrchestratorError, OrchestratorResult};
pub use language::{resolve, LanguageSelection};
pub use ports::{
    AccountStore, ChatRole, ChatTurn, ExplanationService, LanguageDetectionService, PortError,
    PortResult, StorageAdapter, StorageKind, TextCorrectionService,
};
pub use progress::{Persisted, SharedProgress};
pub use session::{CorrectionSession, SessionServices, DEFAULT_MODEL};
pub use tutor::{LessonOutcome, TutorOrchestrator};
