//! Fakes for the AI ports and an `AppState` wired to them.

use async_trait::async_trait;
use lingo_core::domain::Language;
use lingo_core::ports::{
    ChatTurn, ExplanationService, LanguageDetectionService, PortError, PortResult,
    TextCorrectionService,
};
use sqlx::postgres::PgPoolOptions;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::adapters::{DbAdapter, LocalStores};
use crate::config::Config;
use crate::web::state::AppState;

/// Answers "spanish" for anything it is asked.
#[derive(Default)]
pub struct FakeDetector {
    pub calls: AtomicUsize,
}

#[async_trait]
impl LanguageDetectionService for FakeDetector {
    async fn detect(&self, _text: &str) -> PortResult<Option<Language>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Some(Language::Spanish))
    }
}

#[derive(Default)]
pub struct FakeCorrector {
    pub failing: AtomicBool,
    pub calls: Mutex<Vec<(String, String, Language)>>,
}

#[async_trait]
impl TextCorrectionService for FakeCorrector {
    async fn correct(&self, text: &str, model: &str, language: Language) -> PortResult<String> {
        self.calls
            .lock()
            .unwrap()
            .push((text.to_string(), model.to_string(), language));
        if self.failing.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("status 500".into()));
        }
        Ok(Fakes::CORRECTED.to_string())
    }
}

type TutorRequest = (Vec<ChatTurn>, Option<String>, Option<String>);

#[derive(Default)]
pub struct FakeTutor {
    pub requests: Mutex<Vec<TutorRequest>>,
}

#[async_trait]
impl ExplanationService for FakeTutor {
    async fn reply(
        &self,
        messages: &[ChatTurn],
        system_prompt: Option<&str>,
        model: Option<&str>,
    ) -> PortResult<String> {
        let mut requests = self.requests.lock().unwrap();
        requests.push((
            messages.to_vec(),
            system_prompt.map(str::to_string),
            model.map(str::to_string),
        ));
        Ok(format!("reply #{}", requests.len()))
    }
}

pub struct Fakes {
    pub detector: Arc<FakeDetector>,
    pub corrector: Arc<FakeCorrector>,
    pub tutor: Arc<FakeTutor>,
}

impl Fakes {
    pub const CORRECTED: &'static str = "Me gusta mucho el cine y la pizza, es mi favorita.";
}

pub fn test_config(local_data_dir: &Path) -> Config {
    let local_data_dir = local_data_dir.display().to_string();
    Config::from_lookup(|key| match key {
        "DATABASE_URL" => Some("postgres://localhost/lingo_test".to_string()),
        "LOCAL_DATA_DIR" => Some(local_data_dir.clone()),
        _ => None,
    })
    .unwrap()
}

/// An `AppState` whose database pool never connects; only the guest paths
/// and the AI endpoints can be exercised with it.
pub fn test_state_in(local_data_dir: &Path) -> (Arc<AppState>, Fakes) {
    let config = test_config(local_data_dir);
    let pool = PgPoolOptions::new()
        .connect_lazy(&config.database_url)
        .unwrap();
    let fakes = Fakes {
        detector: Arc::new(FakeDetector::default()),
        corrector: Arc::new(FakeCorrector::default()),
        tutor: Arc::new(FakeTutor::default()),
    };
    let state = Arc::new(AppState {
        db: Arc::new(DbAdapter::new(pool)),
        local_stores: Arc::new(LocalStores::new(config.local_data_dir.clone())),
        config: Arc::new(config),
        detector: fakes.detector.clone(),
        corrector: fakes.corrector.clone(),
        tutor: fakes.tutor.clone(),
    });
    (state, fakes)
}

pub fn test_state() -> (Arc<AppState>, Fakes) {
    test_state_in(&std::env::temp_dir().join("lingo-api-tests"))
}
