//! services/api/src/web/state.rs
//!
//! Defines the application's shared state and the identity attached to each request.

use crate::adapters::{DbAdapter, LocalStores};
use crate::config::Config;
use lingo_core::ports::{
    ExplanationService, LanguageDetectionService, PortResult, StorageAdapter,
    TextCorrectionService,
};
use lingo_core::SessionServices;
use std::sync::Arc;
use uuid::Uuid;

//=========================================================================================
// AppState (Shared Across All Connections)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DbAdapter>,
    pub local_stores: Arc<LocalStores>,
    pub config: Arc<Config>,
    pub detector: Arc<dyn LanguageDetectionService>,
    pub corrector: Arc<dyn TextCorrectionService>,
    pub tutor: Arc<dyn ExplanationService>,
}

//=========================================================================================
// Request Identity
//=========================================================================================

/// Who is behind a request. Set by the `identify` middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    /// A valid auth cookie was presented.
    Account(Uuid),
    /// No cookie, or one that no longer validates.
    Guest,
}

/// Where a correction session keeps its data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageScope {
    Account(Uuid),
    Device(String),
}

impl StorageScope {
    /// Accounts always use remote storage. Guests use the device they name,
    /// or a freshly minted one.
    pub fn resolve(identity: &Identity, device_id: Option<String>) -> Self {
        match identity {
            Identity::Account(user_id) => StorageScope::Account(*user_id),
            Identity::Guest => StorageScope::Device(
                device_id
                    .filter(|id| !id.trim().is_empty())
                    .unwrap_or_else(|| Uuid::new_v4().to_string()),
            ),
        }
    }

    pub fn device_id(&self) -> Option<&str> {
        match self {
            StorageScope::Account(_) => None,
            StorageScope::Device(id) => Some(id),
        }
    }
}

impl AppState {
    pub fn storage_for(&self, scope: &StorageScope) -> PortResult<Arc<dyn StorageAdapter>> {
        let storage: Arc<dyn StorageAdapter> = match scope {
            StorageScope::Account(user_id) => Arc::new(self.db.remote_storage(*user_id)),
            StorageScope::Device(device_id) => Arc::new(self.local_stores.open(device_id)?),
        };
        Ok(storage)
    }

    /// The collaborators for one correction session.
    pub fn session_services(&self, storage: Arc<dyn StorageAdapter>) -> SessionServices {
        SessionServices {
            detector: self.detector.clone(),
            corrector: self.corrector.clone(),
            explainer: self.tutor.clone(),
            storage,
        }
    }
}
