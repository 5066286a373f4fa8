//! Timing and reward knobs for the orchestrator.

use std::ops::RangeInclusive;
use std::time::Duration;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(600);
pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(12);
pub const DEFAULT_CORRECTION_REWARD: RangeInclusive<u32> = 5..=14;
pub const DEFAULT_LESSON_REWARD: u32 = 15;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Quiet period after the last keystroke before detection fires.
    pub debounce: Duration,
    /// Upper bound for any single call to an AI service.
    pub upstream_timeout: Duration,
    /// Points awarded per successful correction, drawn uniformly.
    pub correction_reward: RangeInclusive<u32>,
    /// Points awarded per saved lesson.
    pub lesson_reward: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            upstream_timeout: DEFAULT_UPSTREAM_TIMEOUT,
            correction_reward: DEFAULT_CORRECTION_REWARD,
            lesson_reward: DEFAULT_LESSON_REWARD,
        }
    }
}
