//! crates/lingo_core/src/session.rs
//!
//! One user's correction session: the draft, the language controls, the
//! selected model, and the flows that act on them. The web layer owns one of
//! these per connection and only forwards events into it.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::OrchestratorConfig;
use crate::correction::{CorrectionOrchestrator, CorrectionOutcome};
use crate::detection::DetectionDebouncer;
use crate::domain::{ChatMessage, ChatSession, DetectionState, Language, Lesson, UserProgress};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::language::LanguageSelection;
use crate::ports::{
    ExplanationService, LanguageDetectionService, StorageAdapter, StorageKind,
    TextCorrectionService,
};
use crate::progress::{Persisted, SharedProgress};
use crate::tutor::{LessonOutcome, TutorOrchestrator};

pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// The collaborators a session talks to. `storage` is already scoped to the
/// device or account the session belongs to.
#[derive(Clone)]
pub struct SessionServices {
    pub detector: Arc<dyn LanguageDetectionService>,
    pub corrector: Arc<dyn TextCorrectionService>,
    pub explainer: Arc<dyn ExplanationService>,
    pub storage: Arc<dyn StorageAdapter>,
}

pub struct CorrectionSession {
    debouncer: DetectionDebouncer,
    selection: LanguageSelection,
    model: String,
    corrections: CorrectionOrchestrator,
    tutor: TutorOrchestrator,
    progress: SharedProgress,
    storage_kind: StorageKind,
    explanation: Option<ChatSession>,
}

impl CorrectionSession {
    /// Builds a session and loads the stored progress. An unreadable profile
    /// starts from defaults rather than failing the session.
    pub async fn start(
        services: SessionServices,
        config: OrchestratorConfig,
        default_model: impl Into<String>,
    ) -> Self {
        let storage_kind = services.storage.kind();
        let stored = match services.storage.get_progress().await {
            Ok(progress) => progress,
            Err(e) => {
                warn!(backend = ?storage_kind, "Could not load progress, using defaults: {}", e);
                UserProgress::default()
            }
        };
        let progress = SharedProgress::new(stored);

        info!(backend = ?storage_kind, "Correction session started.");
        Self {
            debouncer: DetectionDebouncer::new(services.detector, &config),
            selection: LanguageSelection::default(),
            model: default_model.into(),
            corrections: CorrectionOrchestrator::new(
                services.corrector,
                services.storage.clone(),
                progress.clone(),
                config.clone(),
            ),
            tutor: TutorOrchestrator::new(
                services.explainer,
                services.storage,
                progress.clone(),
                config,
            ),
            progress,
            storage_kind,
            explanation: None,
        }
    }

    pub fn storage_kind(&self) -> StorageKind {
        self.storage_kind
    }

    pub async fn progress(&self) -> UserProgress {
        self.progress.snapshot().await
    }

    //-------------------------------------------------------------------------------------
    // Draft and language controls
    //-------------------------------------------------------------------------------------

    pub fn on_text_changed(&mut self, text: impl Into<String>) {
        self.debouncer.on_text_changed(text);
    }

    pub fn set_auto_detect(&mut self, enabled: bool) {
        // Freeze the resolved language before the detection is cleared.
        self.selection
            .set_auto_detect(enabled, self.debouncer.state().detection);
        self.debouncer.set_auto_detect(enabled);
    }

    pub fn choose_language(&mut self, language: Language) {
        self.selection.choose_manual(language);
        self.debouncer.set_auto_detect(false);
    }

    pub fn select_model(&mut self, model: impl Into<String>) {
        self.model = model.into();
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn auto_detect(&self) -> bool {
        self.selection.auto_detect()
    }

    pub fn detection(&self) -> DetectionState {
        self.debouncer.state()
    }

    pub fn subscribe_detection(&self) -> watch::Receiver<DetectionState> {
        self.debouncer.subscribe()
    }

    pub fn resolved_language(&self) -> Language {
        self.selection.resolved(self.debouncer.state().detection)
    }

    /// Resolution for an arbitrary detection snapshot, e.g. one received
    /// from [`Self::subscribe_detection`].
    pub fn resolve_with(&self, state: &DetectionState) -> Language {
        self.selection.resolved(state.detection)
    }

    //-------------------------------------------------------------------------------------
    // Flows
    //-------------------------------------------------------------------------------------

    /// Corrects the current draft in the resolved language with the selected model.
    pub async fn correct(&self) -> OrchestratorResult<CorrectionOutcome> {
        let language = self.resolved_language();
        self.corrections
            .correct(&self.debouncer.draft().text, language, &self.model)
            .await
    }

    /// Opens the explanation chat for `corrected_text`, or for the last
    /// correction when none is given.
    pub async fn open_explanation(
        &mut self,
        corrected_text: Option<&str>,
    ) -> OrchestratorResult<Persisted<ChatSession>> {
        let corrected_text = match corrected_text {
            Some(text) => text.to_string(),
            None => self
                .corrections
                .last_result()
                .await
                .map(|r| r.corrected_text)
                .ok_or_else(|| {
                    OrchestratorError::Validation("Correct a text first.".to_string())
                })?,
        };
        let opened = self.tutor.open_explanation(&corrected_text).await?;
        self.explanation = Some(opened.value.clone());
        Ok(opened)
    }

    pub async fn send_chat_message(
        &mut self,
        text: &str,
    ) -> OrchestratorResult<Persisted<ChatMessage>> {
        let session = self.explanation.as_mut().ok_or_else(|| {
            OrchestratorError::Validation("Open an explanation first.".to_string())
        })?;
        self.tutor.send_message(session, text).await
    }

    pub async fn create_lesson(&self) -> OrchestratorResult<LessonOutcome> {
        let session = self.explanation.as_ref().ok_or_else(|| {
            OrchestratorError::Validation("Open an explanation first.".to_string())
        })?;
        self.tutor.create_lesson(session).await
    }

    pub async fn list_lessons(&self) -> OrchestratorResult<Vec<Lesson>> {
        self.tutor.list_lessons().await
    }

    pub async fn delete_lesson(&self, lesson_id: Uuid) -> OrchestratorResult<()> {
        self.tutor.delete_lesson(lesson_id).await
    }

    pub async fn list_sessions(&self) -> OrchestratorResult<Vec<ChatSession>> {
        self.tutor.list_sessions().await
    }

    /// Stops pending detection work. Called when the connection goes away.
    pub fn close(&mut self) {
        self.debouncer.close();
        info!("Correction session closed.");
    }
}
