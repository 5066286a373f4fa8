//! crates/lingo_core/src/error.rs
//!
//! Error taxonomy for the orchestrator. A superseded detection request is not
//! an error and has no variant here: it is dropped silently.

use std::future::Future;
use std::time::Duration;

use crate::ports::{PortError, PortResult};

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// Empty or insufficient input. No network call was made.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An AI service failed, timed out, or answered with nothing usable.
    #[error("Upstream service error: {0}")]
    Upstream(PortError),

    /// A storage read or write failed.
    #[error("Persistence error: {0}")]
    Persistence(PortError),
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

/// Runs an upstream call under `limit`, turning an elapsed timer into a `PortError`.
pub async fn bounded<T, F>(limit: Duration, call: F) -> PortResult<T>
where
    F: Future<Output = PortResult<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(PortError::Unexpected(format!(
            "request timed out after {}s",
            limit.as_secs_f32()
        ))),
    }
}
