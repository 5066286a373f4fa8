//! services/api/src/adapters/local_store.rs
//!
//! Guest storage: one JSON blob per collection in a per-device directory.
//! It implements the `StorageAdapter` port from the `core` crate.

use async_trait::async_trait;
use lingo_core::domain::{find_by_corrected_text, upsert_into, ChatSession, Lesson, UserProgress};
use lingo_core::ports::{PortError, PortResult, StorageAdapter, StorageKind};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

const PROGRESS_FILE: &str = "progress.json";
const SESSIONS_FILE: &str = "sessions.json";
const LESSONS_FILE: &str = "lessons.json";

//=========================================================================================
// Store Registry
//=========================================================================================

/// Hands out per-device stores under one base directory. Stores opened for
/// the same device share a write lock, so concurrent connections from one
/// device never interleave a read-merge-write.
///
/// The registry only holds weak handles: a device's lock lives as long as
/// some open store uses it.
pub struct LocalStores {
    base_dir: PathBuf,
    locks: std::sync::Mutex<HashMap<String, Weak<Mutex<()>>>>,
}

impl LocalStores {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            locks: std::sync::Mutex::new(HashMap::new()),
        }
    }

    pub fn open(&self, device_id: &str) -> PortResult<LocalStore> {
        if !is_valid_device_id(device_id) {
            return Err(PortError::Unexpected(format!(
                "Invalid device id '{}'",
                device_id
            )));
        }
        let write_lock = {
            let mut locks = self
                .locks
                .lock()
                .map_err(|_| PortError::Unexpected("Local store registry poisoned".to_string()))?;
            locks.retain(|_, lock| lock.strong_count() > 0);
            match locks.get(device_id).and_then(Weak::upgrade) {
                Some(lock) => lock,
                None => {
                    let lock = Arc::new(Mutex::new(()));
                    locks.insert(device_id.to_string(), Arc::downgrade(&lock));
                    lock
                }
            }
        };
        Ok(LocalStore {
            dir: self.base_dir.join(device_id),
            write_lock,
        })
    }
}

fn is_valid_device_id(device_id: &str) -> bool {
    !device_id.is_empty()
        && device_id.len() <= 64
        && device_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// Storage for one device.
#[derive(Clone)]
pub struct LocalStore {
    dir: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl LocalStore {
    /// Missing or unreadable blobs read as the default value.
    async fn read_blob<T>(&self, name: &str) -> T
    where
        T: DeserializeOwned + Default,
    {
        let path = self.dir.join(name);
        match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                warn!(path = %path.display(), "Ignoring corrupt local blob: {}", e);
                T::default()
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => T::default(),
            Err(e) => {
                warn!(path = %path.display(), "Could not read local blob: {}", e);
                T::default()
            }
        }
    }

    /// Writes through a temporary file and a rename, so readers never see a
    /// half-written blob.
    async fn write_blob<T>(&self, name: &str, value: &T) -> PortResult<()>
    where
        T: Serialize + ?Sized,
    {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        let bytes =
            serde_json::to_vec_pretty(value).map_err(|e| PortError::Unexpected(e.to_string()))?;

        let target = self.dir.join(name);
        let temp = temp_path(&target);
        tokio::fs::write(&temp, bytes)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        if let Err(e) = tokio::fs::rename(&temp, &target).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(PortError::Unexpected(e.to_string()));
        }
        Ok(())
    }
}

fn temp_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{}.tmp", Uuid::new_v4()));
    target.with_file_name(name)
}

//=========================================================================================
// `StorageAdapter` Trait Implementation
//=========================================================================================

#[async_trait]
impl StorageAdapter for LocalStore {
    fn kind(&self) -> StorageKind {
        StorageKind::Local
    }

    async fn get_progress(&self) -> PortResult<UserProgress> {
        Ok(self.read_blob(PROGRESS_FILE).await)
    }

    async fn save_progress(&self, progress: &UserProgress) -> PortResult<()> {
        let _guard = self.write_lock.lock().await;
        self.write_blob(PROGRESS_FILE, progress).await
    }

    async fn find_session_by_corrected_text(
        &self,
        corrected_text: &str,
    ) -> PortResult<Option<ChatSession>> {
        let sessions: Vec<ChatSession> = self.read_blob(SESSIONS_FILE).await;
        Ok(find_by_corrected_text(&sessions, corrected_text).cloned())
    }

    async fn upsert_session(&self, session: ChatSession) -> PortResult<ChatSession> {
        let _guard = self.write_lock.lock().await;
        let mut sessions: Vec<ChatSession> = self.read_blob(SESSIONS_FILE).await;
        let stored = upsert_into(&mut sessions, session);
        self.write_blob(SESSIONS_FILE, &sessions).await?;
        Ok(stored)
    }

    async fn list_sessions(&self) -> PortResult<Vec<ChatSession>> {
        let mut sessions: Vec<ChatSession> = self.read_blob(SESSIONS_FILE).await;
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }

    async fn list_lessons(&self) -> PortResult<Vec<Lesson>> {
        let mut lessons: Vec<Lesson> = self.read_blob(LESSONS_FILE).await;
        lessons.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(lessons)
    }

    async fn save_lesson(&self, lesson: Lesson) -> PortResult<Lesson> {
        let _guard = self.write_lock.lock().await;
        let mut lessons: Vec<Lesson> = self.read_blob(LESSONS_FILE).await;
        lessons.push(lesson.clone());
        self.write_blob(LESSONS_FILE, &lessons).await?;
        Ok(lesson)
    }

    async fn delete_lesson(&self, lesson_id: Uuid) -> PortResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut lessons: Vec<Lesson> = self.read_blob(LESSONS_FILE).await;
        let before = lessons.len();
        lessons.retain(|l| l.id != lesson_id);
        if lessons.len() == before {
            return Err(PortError::NotFound(format!("Lesson {} not found", lesson_id)));
        }
        self.write_blob(LESSONS_FILE, &lessons).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lingo_core::domain::{ChatMessage, Language};
    use std::collections::BTreeSet;

    const CORRECTED: &str = "Me gusta mucho el cine y la pizza, es mi favorita.";

    #[tokio::test]
    async fn fresh_device_reads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStores::new(dir.path()).open("device-1").unwrap();

        assert_eq!(store.get_progress().await.unwrap(), UserProgress::default());
        assert!(store.list_sessions().await.unwrap().is_empty());
        assert!(store.list_lessons().await.unwrap().is_empty());
        assert_eq!(store.kind(), StorageKind::Local);
    }

    #[tokio::test]
    async fn progress_survives_reopening() {
        let dir = tempfile::tempdir().unwrap();
        let stores = LocalStores::new(dir.path());
        let progress = UserProgress {
            points: 42,
            total_corrections: 3,
            languages_learned: BTreeSet::from([Language::Italian]),
            ..UserProgress::default()
        };

        stores.open("device-1").unwrap().save_progress(&progress).await.unwrap();
        let reopened = LocalStores::new(dir.path()).open("device-1").unwrap();

        assert_eq!(reopened.get_progress().await.unwrap(), progress);
        assert!(dir.path().join("device-1").join(PROGRESS_FILE).exists());
    }

    #[tokio::test]
    async fn devices_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let stores = LocalStores::new(dir.path());
        let a = stores.open("device-a").unwrap();
        let b = stores.open("device-b").unwrap();

        a.upsert_session(ChatSession::new(CORRECTED)).await.unwrap();

        assert_eq!(a.list_sessions().await.unwrap().len(), 1);
        assert!(b.list_sessions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn corrupt_blob_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let device_dir = dir.path().join("device-1");
        std::fs::create_dir_all(&device_dir).unwrap();
        std::fs::write(device_dir.join(SESSIONS_FILE), b"{not json").unwrap();
        std::fs::write(device_dir.join(PROGRESS_FILE), b"").unwrap();
        let store = LocalStores::new(dir.path()).open("device-1").unwrap();

        assert!(store.list_sessions().await.unwrap().is_empty());
        assert_eq!(store.get_progress().await.unwrap(), UserProgress::default());

        let stored = store.upsert_session(ChatSession::new(CORRECTED)).await.unwrap();
        assert_eq!(store.list_sessions().await.unwrap(), vec![stored]);
    }

    #[tokio::test]
    async fn upsert_twice_keeps_one_merged_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStores::new(dir.path()).open("device-1").unwrap();

        let mut first = ChatSession::new(CORRECTED);
        first.messages.push(ChatMessage::tutor("Explanation"));
        let stored = store.upsert_session(first.clone()).await.unwrap();

        let mut second = ChatSession::new(CORRECTED);
        second.messages = vec![ChatMessage::tutor("Explanation"), ChatMessage::user("Why?")];
        let merged = store.upsert_session(second).await.unwrap();

        let sessions = store.list_sessions().await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(merged.id, stored.id);
        assert_eq!(
            sessions[0].messages,
            vec![ChatMessage::tutor("Explanation"), ChatMessage::user("Why?")]
        );
        assert_eq!(
            store.find_session_by_corrected_text(CORRECTED).await.unwrap(),
            Some(merged)
        );
    }

    #[tokio::test]
    async fn concurrent_upserts_from_two_handles_stay_single() {
        let dir = tempfile::tempdir().unwrap();
        let stores = LocalStores::new(dir.path());
        let a = stores.open("device-1").unwrap();
        let b = stores.open("device-1").unwrap();

        let (ra, rb) = tokio::join!(
            a.upsert_session(ChatSession::new(CORRECTED)),
            b.upsert_session(ChatSession::new(CORRECTED)),
        );

        assert_eq!(ra.unwrap().id, rb.unwrap().id);
        assert_eq!(a.list_sessions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn lessons_list_newest_first_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStores::new(dir.path()).open("device-1").unwrap();

        let mut older = Lesson::new("Lesson one", "Vocabulary");
        older.created_at -= chrono::Duration::minutes(5);
        let older = store.save_lesson(older).await.unwrap();
        let newer = store.save_lesson(Lesson::new("Lesson two", "Grammar")).await.unwrap();

        let listed = store.list_lessons().await.unwrap();
        assert_eq!(listed, vec![newer.clone(), older.clone()]);

        store.delete_lesson(older.id).await.unwrap();
        assert_eq!(store.list_lessons().await.unwrap(), vec![newer]);

        let err = store.delete_lesson(older.id).await.unwrap_err();
        assert!(matches!(err, PortError::NotFound(_)));
    }

    impl LocalStores {
        fn registered_devices(&self) -> usize {
            self.locks.lock().unwrap().len()
        }
    }

    #[test]
    fn closed_devices_leave_the_lock_registry() {
        let dir = tempfile::tempdir().unwrap();
        let stores = LocalStores::new(dir.path());

        for _ in 0..1_000 {
            let store = stores.open(&Uuid::new_v4().to_string()).unwrap();
            drop(store);
        }
        let kept = stores.open("device-1").unwrap();

        assert_eq!(stores.registered_devices(), 1);
        drop(kept);
    }

    #[test]
    fn open_handles_of_one_device_share_a_lock() {
        let dir = tempfile::tempdir().unwrap();
        let stores = LocalStores::new(dir.path());

        let first = stores.open("device-1").unwrap();
        let second = stores.open("device-1").unwrap();
        assert!(Arc::ptr_eq(&first.write_lock, &second.write_lock));

        drop(first);
        drop(second);
        let reopened = stores.open("device-1").unwrap();
        assert_eq!(Arc::strong_count(&reopened.write_lock), 1);
    }

    #[test]
    fn device_ids_cannot_escape_the_base_dir() {
        let stores = LocalStores::new("/tmp/lingo");
        for bad in ["", "../etc", "a/b", "dev ice", "x".repeat(65).as_str()] {
            assert!(stores.open(bad).is_err(), "{bad:?} was accepted");
        }
        assert!(stores.open("3f1c2a9e-0b7d-4e0a-9f57-2d7a1e0c9b11").is_ok());
    }
}
