//! crates/lingo_core/src/progress.rs
//!
//! The in-memory `UserProgress` shared by the correction and lesson flows.
//!
//! Every delta is applied to the latest in-memory value inside a single lock
//! scope, so interleaved flows never lose an update. Persistence happens after
//! the update and a failure there does not roll the update back.

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::error;

use crate::domain::UserProgress;
use crate::ports::StorageAdapter;

#[derive(Clone, Default)]
pub struct SharedProgress {
    inner: Arc<Mutex<UserProgress>>,
}

impl SharedProgress {
    pub fn new(progress: UserProgress) -> Self {
        Self {
            inner: Arc::new(Mutex::new(progress)),
        }
    }

    pub async fn snapshot(&self) -> UserProgress {
        self.inner.lock().await.clone()
    }

    /// Applies `change` to the current value and returns the new snapshot.
    pub async fn update<F>(&self, change: F) -> UserProgress
    where
        F: FnOnce(&mut UserProgress),
    {
        let mut progress = self.inner.lock().await;
        change(&mut progress);
        progress.clone()
    }

    /// Replaces the value wholesale, e.g. after loading it from storage.
    pub async fn replace(&self, progress: UserProgress) {
        *self.inner.lock().await = progress;
    }
}

/// A value produced by a flow, plus whether every write behind it landed.
#[derive(Debug, Clone, PartialEq)]
pub struct Persisted<T> {
    pub value: T,
    pub persisted: bool,
}

/// Writes a progress snapshot. Failures are logged and reported as `false`.
pub async fn persist_progress(storage: &dyn StorageAdapter, progress: &UserProgress) -> bool {
    match storage.save_progress(progress).await {
        Ok(()) => true,
        Err(e) => {
            error!(
                backend = ?storage.kind(),
                "Failed to persist progress; keeping the in-memory update: {}", e
            );
            false
        }
    }
}
