//! crates/lingo_core/src/detection.rs
//!
//! Debounced language detection with last-request-wins semantics.
//!
//! Every text change cancels the pending job and schedules a new one. A job
//! sleeps for the debounce period, takes a fresh generation number, and calls
//! the detector. Its answer is applied only if the job was not cancelled and
//! its generation is still the current one; anything else is dropped without
//! surfacing an error.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::OrchestratorConfig;
use crate::domain::{Detection, DetectionState, InputDraft};
use crate::error::bounded;
use crate::ports::LanguageDetectionService;

pub struct DetectionDebouncer {
    detector: Arc<dyn LanguageDetectionService>,
    debounce: Duration,
    timeout: Duration,
    state: Arc<watch::Sender<DetectionState>>,
    draft: InputDraft,
    auto_detect: bool,
    /// Token of the job scheduled by the latest text change, if any.
    pending: Option<CancellationToken>,
}

impl DetectionDebouncer {
    /// Creates a debouncer with auto-detect enabled.
    pub fn new(detector: Arc<dyn LanguageDetectionService>, config: &OrchestratorConfig) -> Self {
        let (state, _) = watch::channel(DetectionState::default());
        Self {
            detector,
            debounce: config.debounce,
            timeout: config.upstream_timeout,
            state: Arc::new(state),
            draft: InputDraft::default(),
            auto_detect: true,
            pending: None,
        }
    }

    pub fn state(&self) -> DetectionState {
        *self.state.borrow()
    }

    /// A receiver that observes every visible change of the detection state.
    pub fn subscribe(&self) -> watch::Receiver<DetectionState> {
        self.state.subscribe()
    }

    pub fn draft(&self) -> &InputDraft {
        &self.draft
    }

    pub fn auto_detect(&self) -> bool {
        self.auto_detect
    }

    /// Records a new draft and restarts the debounce timer.
    pub fn on_text_changed(&mut self, text: impl Into<String>) {
        self.draft = InputDraft::new(text);
        self.schedule();
    }

    /// Turning auto-detect off clears the visible detection immediately and
    /// cancels whatever is pending or in flight. Turning it back on
    /// re-evaluates the current draft.
    pub fn set_auto_detect(&mut self, enabled: bool) {
        if enabled == self.auto_detect {
            return;
        }
        self.auto_detect = enabled;
        if enabled {
            info!("Auto-detect enabled.");
            self.schedule();
        } else {
            info!("Auto-detect disabled; clearing detection.");
            self.cancel_pending();
            self.state.send_modify(DetectionState::clear);
        }
    }

    /// Cancels the pending timer and any in-flight request. Nothing spawned by
    /// this debouncer touches the state afterwards.
    pub fn close(&mut self) {
        self.cancel_pending();
    }

    fn cancel_pending(&mut self) {
        if let Some(token) = self.pending.take() {
            token.cancel();
            self.state.send_if_modified(|s| {
                let was_in_flight = s.in_flight;
                s.in_flight = false;
                was_in_flight
            });
        }
    }

    fn schedule(&mut self) {
        self.cancel_pending();
        if !self.auto_detect {
            return;
        }

        if !self.draft.has_signal() {
            self.state.send_if_modified(|s| {
                if s.detection == Detection::None && !s.in_flight {
                    return false;
                }
                s.clear();
                true
            });
            return;
        }

        let token = CancellationToken::new();
        self.pending = Some(token.clone());
        tokio::spawn(run_detection(
            self.detector.clone(),
            self.state.clone(),
            token,
            self.draft.text.clone(),
            self.debounce,
            self.timeout,
        ));
    }
}

impl Drop for DetectionDebouncer {
    fn drop(&mut self) {
        if let Some(token) = self.pending.take() {
            token.cancel();
        }
    }
}

/// One debounced detection job.
async fn run_detection(
    detector: Arc<dyn LanguageDetectionService>,
    state: Arc<watch::Sender<DetectionState>>,
    token: CancellationToken,
    text: String,
    debounce: Duration,
    timeout: Duration,
) {
    tokio::select! {
        _ = token.cancelled() => return,
        _ = tokio::time::sleep(debounce) => {}
    }

    // Checked under the state lock so a concurrent cancel-then-clear cannot
    // interleave with taking the generation.
    let mut generation = None;
    state.send_if_modified(|s| {
        if token.is_cancelled() {
            return false;
        }
        generation = Some(s.begin_request());
        true
    });
    let Some(generation) = generation else {
        return;
    };
    debug!(generation, "Firing language detection.");

    let response = tokio::select! {
        _ = token.cancelled() => {
            debug!(generation, "Detection request cancelled.");
            return;
        }
        response = bounded(timeout, detector.detect(&text)) => response,
    };

    let detection = match response {
        Ok(Some(language)) => Detection::Detected(language),
        Ok(None) => Detection::Unknown,
        Err(e) => {
            warn!(generation, "Language detection failed: {}", e);
            Detection::Unknown
        }
    };

    let applied = state.send_if_modified(|s| !token.is_cancelled() && s.apply(generation, detection));
    if applied {
        debug!(generation, ?detection, "Detection applied.");
    } else {
        debug!(generation, "Discarding superseded detection response.");
    }
}
