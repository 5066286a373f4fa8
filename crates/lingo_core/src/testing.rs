//! Test doubles for the ports, shared by the unit tests in this crate.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::{upsert_into, ChatSession, Language, Lesson, UserProgress};
use crate::ports::{
    ChatTurn, ExplanationService, LanguageDetectionService, PortError, PortResult, StorageAdapter,
    StorageKind, TextCorrectionService,
};

//-----------------------------------------------------------------------------------------
// Detector
//-----------------------------------------------------------------------------------------

/// Answers per text, optionally after a delay. Unlisted texts are "unknown".
#[derive(Default)]
pub struct ScriptedDetector {
    answers: HashMap<String, (Duration, PortResult<Option<Language>>)>,
    pub calls: AtomicUsize,
    pub seen: Mutex<Vec<String>>,
}

impl ScriptedDetector {
    pub fn answer(mut self, text: &str, delay: Duration, language: Option<Language>) -> Self {
        self.answers.insert(text.to_string(), (delay, Ok(language)));
        self
    }

    pub fn fail(mut self, text: &str, delay: Duration) -> Self {
        self.answers.insert(
            text.to_string(),
            (delay, Err(PortError::Unexpected("detector down".into()))),
        );
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LanguageDetectionService for ScriptedDetector {
    async fn detect(&self, text: &str) -> PortResult<Option<Language>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(text.to_string());
        match self.answers.get(text) {
            Some((delay, answer)) => {
                tokio::time::sleep(*delay).await;
                answer.clone()
            }
            None => Ok(None),
        }
    }
}

//-----------------------------------------------------------------------------------------
// Corrector
//-----------------------------------------------------------------------------------------

/// Returns a fixed correction, or fails when `failing` is set.
pub struct StaticCorrector {
    corrected: String,
    pub failing: AtomicBool,
    pub calls: Mutex<Vec<(String, String, Language)>>,
}

impl StaticCorrector {
    pub fn new(corrected: &str) -> Self {
        Self {
            corrected: corrected.to_string(),
            failing: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl TextCorrectionService for StaticCorrector {
    async fn correct(&self, text: &str, model: &str, language: Language) -> PortResult<String> {
        self.calls
            .lock()
            .unwrap()
            .push((text.to_string(), model.to_string(), language));
        if self.failing.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("status 500".into()));
        }
        Ok(self.corrected.clone())
    }
}

//-----------------------------------------------------------------------------------------
// Explainer
//-----------------------------------------------------------------------------------------

/// Replies with a numbered canned answer and records every request.
#[derive(Default)]
pub struct ScriptedExplainer {
    pub failing: AtomicBool,
    pub requests: Mutex<Vec<(Vec<ChatTurn>, Option<String>)>>,
}

impl ScriptedExplainer {
    pub fn failing() -> Self {
        let explainer = Self::default();
        explainer.failing.store(true, Ordering::SeqCst);
        explainer
    }
}

#[async_trait]
impl ExplanationService for ScriptedExplainer {
    async fn reply(
        &self,
        messages: &[ChatTurn],
        system_prompt: Option<&str>,
        _model: Option<&str>,
    ) -> PortResult<String> {
        let mut requests = self.requests.lock().unwrap();
        requests.push((messages.to_vec(), system_prompt.map(str::to_string)));
        if self.failing.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("tutor unavailable".into()));
        }
        Ok(format!("reply #{}", requests.len()))
    }
}

//-----------------------------------------------------------------------------------------
// Storage
//-----------------------------------------------------------------------------------------

/// In-memory storage with switchable write failures.
#[derive(Default)]
pub struct MemoryStorage {
    pub progress: Mutex<UserProgress>,
    pub sessions: Mutex<Vec<ChatSession>>,
    pub lessons: Mutex<Vec<Lesson>>,
    pub fail_writes: AtomicBool,
    pub progress_writes: AtomicUsize,
}

impl MemoryStorage {
    pub fn with_progress(progress: UserProgress) -> Self {
        Self {
            progress: Mutex::new(progress),
            ..Self::default()
        }
    }

    pub fn failing_writes() -> Self {
        let storage = Self::default();
        storage.fail_writes.store(true, Ordering::SeqCst);
        storage
    }

    fn check_write(&self) -> PortResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(PortError::Unexpected("storage offline".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl StorageAdapter for MemoryStorage {
    fn kind(&self) -> StorageKind {
        StorageKind::Local
    }

    async fn get_progress(&self) -> PortResult<UserProgress> {
        Ok(self.progress.lock().unwrap().clone())
    }

    async fn save_progress(&self, progress: &UserProgress) -> PortResult<()> {
        self.check_write()?;
        self.progress_writes.fetch_add(1, Ordering::SeqCst);
        *self.progress.lock().unwrap() = progress.clone();
        Ok(())
    }

    async fn find_session_by_corrected_text(
        &self,
        corrected_text: &str,
    ) -> PortResult<Option<ChatSession>> {
        let sessions = self.sessions.lock().unwrap();
        Ok(sessions
            .iter()
            .find(|s| s.corrected_text == corrected_text)
            .cloned())
    }

    async fn upsert_session(&self, session: ChatSession) -> PortResult<ChatSession> {
        self.check_write()?;
        let mut sessions = self.sessions.lock().unwrap();
        Ok(upsert_into(&mut sessions, session))
    }

    async fn list_sessions(&self) -> PortResult<Vec<ChatSession>> {
        let mut sessions = self.sessions.lock().unwrap().clone();
        sessions.reverse();
        Ok(sessions)
    }

    async fn list_lessons(&self) -> PortResult<Vec<Lesson>> {
        let mut lessons = self.lessons.lock().unwrap().clone();
        lessons.reverse();
        Ok(lessons)
    }

    async fn save_lesson(&self, lesson: Lesson) -> PortResult<Lesson> {
        self.check_write()?;
        self.lessons.lock().unwrap().push(lesson.clone());
        Ok(lesson)
    }

    async fn delete_lesson(&self, lesson_id: Uuid) -> PortResult<()> {
        self.check_write()?;
        let mut lessons = self.lessons.lock().unwrap();
        let before = lessons.len();
        lessons.retain(|l| l.id != lesson_id);
        if lessons.len() == before {
            return Err(PortError::NotFound(format!("Lesson {} not found", lesson_id)));
        }
        Ok(())
    }
}
