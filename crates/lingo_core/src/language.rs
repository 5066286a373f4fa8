//! Resolution of the language a correction is requested in.

use serde::Serialize;

use crate::domain::{Detection, Language};

/// The effective language: the detected one when auto-detect is on and a
/// known language was detected, otherwise the manual choice.
pub fn resolve(auto_detect_enabled: bool, last_detected: Detection, manual: Language) -> Language {
    match (auto_detect_enabled, last_detected.language()) {
        (true, Some(detected)) => detected,
        _ => manual,
    }
}

/// The user's language controls: the auto-detect toggle and the dropdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LanguageSelection {
    auto_detect: bool,
    manual: Language,
}

impl Default for LanguageSelection {
    fn default() -> Self {
        Self::new(Language::English)
    }
}

impl LanguageSelection {
    /// Auto-detect starts enabled.
    pub fn new(manual: Language) -> Self {
        Self {
            auto_detect: true,
            manual,
        }
    }

    pub fn auto_detect(&self) -> bool {
        self.auto_detect
    }

    pub fn manual(&self) -> Language {
        self.manual
    }

    pub fn resolved(&self, last_detected: Detection) -> Language {
        resolve(self.auto_detect, last_detected, self.manual)
    }

    /// Switching auto-detect off keeps the language the user was looking at:
    /// the value resolved from `last_detected` becomes the manual choice.
    /// Call this before the detection state is cleared.
    pub fn set_auto_detect(&mut self, enabled: bool, last_detected: Detection) {
        if self.auto_detect && !enabled {
            self.manual = self.resolved(last_detected);
        }
        self.auto_detect = enabled;
    }

    /// Picking a language by hand overrides auto-detect.
    pub fn choose_manual(&mut self, language: Language) {
        self.manual = language;
        self.auto_detect = false;
    }
}
