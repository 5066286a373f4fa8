//! crates/lingo_core/src/correction.rs
//!
//! Drives a correction request and folds its result into progress and
//! session state.

use rand::Rng;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::config::OrchestratorConfig;
use crate::domain::{ChatSession, CorrectionResult, InputDraft, Language, UserProgress};
use crate::error::{bounded, OrchestratorError, OrchestratorResult};
use crate::ports::{PortError, StorageAdapter, TextCorrectionService};
use crate::progress::{persist_progress, SharedProgress};

/// Everything a caller needs after a successful correction.
#[derive(Debug, Clone)]
pub struct CorrectionOutcome {
    pub result: CorrectionResult,
    pub reward: u32,
    /// Progress after this correction was counted.
    pub progress: UserProgress,
    /// The stored session for the corrected text, if the upsert succeeded.
    pub session: Option<ChatSession>,
    /// False when a write failed after the in-memory update. The update is
    /// kept; it may be lost on the next reload.
    pub persisted: bool,
}

pub struct CorrectionOrchestrator {
    corrector: Arc<dyn TextCorrectionService>,
    storage: Arc<dyn StorageAdapter>,
    progress: SharedProgress,
    config: OrchestratorConfig,
    last_result: Mutex<Option<CorrectionResult>>,
}

impl CorrectionOrchestrator {
    pub fn new(
        corrector: Arc<dyn TextCorrectionService>,
        storage: Arc<dyn StorageAdapter>,
        progress: SharedProgress,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            corrector,
            storage,
            progress,
            config,
            last_result: Mutex::new(None),
        }
    }

    /// The most recent successful correction.
    pub async fn last_result(&self) -> Option<CorrectionResult> {
        self.last_result.lock().await.clone()
    }

    pub async fn correct(
        &self,
        text: &str,
        language: Language,
        model: &str,
    ) -> OrchestratorResult<CorrectionOutcome> {
        if InputDraft::new(text).is_blank() {
            return Err(OrchestratorError::Validation(
                "Enter some text to correct.".to_string(),
            ));
        }
        if model.trim().is_empty() {
            return Err(OrchestratorError::Validation("No model selected.".to_string()));
        }

        let started = Instant::now();
        let corrected = bounded(
            self.config.upstream_timeout,
            self.corrector.correct(text, model, language),
        )
        .await
        .map_err(|e| {
            warn!(%language, model, "Correction request failed: {}", e);
            OrchestratorError::Upstream(e)
        })?;

        let corrected = corrected.trim();
        if corrected.is_empty() {
            warn!(%language, model, "Corrector returned an empty correction.");
            return Err(OrchestratorError::Upstream(PortError::Unexpected(
                "The corrector returned no text.".to_string(),
            )));
        }
        info!(%language, model, "⏱️ Correction took: {:?}", started.elapsed());

        let result = CorrectionResult {
            corrected_text: corrected.to_string(),
            input_text: text.to_string(),
            language,
            model: model.to_string(),
            created_at: chrono::Utc::now(),
        };
        *self.last_result.lock().await = Some(result.clone());

        let reward = draw_reward(&self.config.correction_reward);
        let progress = self
            .progress
            .update(|p| p.record_correction(language, reward))
            .await;
        info!(
            reward,
            points = progress.points,
            total_corrections = progress.total_corrections,
            "Correction rewarded."
        );

        let mut persisted = persist_progress(self.storage.as_ref(), &progress).await;
        let session = match self
            .storage
            .upsert_session(ChatSession::from_correction(&result))
            .await
        {
            Ok(session) => Some(session),
            Err(e) => {
                error!(backend = ?self.storage.kind(), "Failed to store chat session: {}", e);
                persisted = false;
                None
            }
        };

        Ok(CorrectionOutcome {
            result,
            reward,
            progress,
            session,
            persisted,
        })
    }
}

/// Uniform draw, independent of any earlier reward.
fn draw_reward(range: &RangeInclusive<u32>) -> u32 {
    rand::thread_rng().gen_range(range.clone())
}
