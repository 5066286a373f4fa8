//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter. `DbAdapter` implements the
//! `AccountStore` port, and hands out `RemoteStorage` values that implement the
//! `StorageAdapter` port for one signed-in account. All interactions with the
//! PostgreSQL database go through `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lingo_core::domain::{
    ChatMessage, ChatSession, Language, Lesson, User, UserCredentials, UserProgress,
};
use lingo_core::ports::{AccountStore, PortError, PortResult, StorageAdapter, StorageKind};
use sqlx::types::Json;
use sqlx::{FromRow, PgConnection, PgPool};
use tracing::{debug, warn};
use uuid::Uuid;

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `AccountStore` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Storage scoped to one account.
    pub fn remote_storage(&self, user_id: Uuid) -> RemoteStorage {
        RemoteStorage {
            pool: self.pool.clone(),
            user_id,
        }
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct UserRecord {
    user_id: Uuid,
    email: Option<String>,
}
impl UserRecord {
    fn to_domain(self) -> User {
        User {
            user_id: self.user_id,
            email: self.email,
        }
    }
}

#[derive(FromRow)]
struct CredentialsRecord {
    user_id: Uuid,
    email: String,
    hashed_password: String,
}
impl CredentialsRecord {
    fn to_domain(self) -> UserCredentials {
        UserCredentials {
            user_id: self.user_id,
            email: self.email,
            hashed_password: self.hashed_password,
        }
    }
}

#[derive(FromRow)]
struct ProfileRecord {
    points: i64,
    total_corrections: i64,
    languages_learned: Vec<String>,
    streak_days: i32,
    level: i32,
    daily_challenge: bool,
}
impl ProfileRecord {
    fn to_domain(self) -> UserProgress {
        UserProgress {
            points: u64::try_from(self.points).unwrap_or(0),
            total_corrections: u64::try_from(self.total_corrections).unwrap_or(0),
            languages_learned: self
                .languages_learned
                .iter()
                .filter_map(|raw| match raw.parse::<Language>() {
                    Ok(language) => Some(language),
                    Err(e) => {
                        warn!("Skipping stored language: {}", e);
                        None
                    }
                })
                .collect(),
            streak_days: u32::try_from(self.streak_days).unwrap_or(0),
            level: u32::try_from(self.level).unwrap_or(1).max(1),
            daily_challenge: self.daily_challenge,
        }
    }

    fn from_domain(progress: &UserProgress) -> Self {
        Self {
            points: i64::try_from(progress.points).unwrap_or(i64::MAX),
            total_corrections: i64::try_from(progress.total_corrections).unwrap_or(i64::MAX),
            languages_learned: progress
                .languages_learned
                .iter()
                .map(|l| l.as_str().to_string())
                .collect(),
            streak_days: i32::try_from(progress.streak_days).unwrap_or(i32::MAX),
            level: i32::try_from(progress.level).unwrap_or(i32::MAX),
            daily_challenge: progress.daily_challenge,
        }
    }
}

#[derive(FromRow)]
struct ChatSessionRecord {
    id: Uuid,
    corrected_text: String,
    input_text: String,
    language: Option<String>,
    model: Option<String>,
    messages: Json<Vec<ChatMessage>>,
    created_at: DateTime<Utc>,
}
impl ChatSessionRecord {
    fn to_domain(self) -> ChatSession {
        ChatSession {
            id: self.id,
            corrected_text: self.corrected_text,
            input_text: self.input_text,
            language: self.language.and_then(|raw| raw.parse().ok()),
            model: self.model,
            messages: self.messages.0,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct LessonRecord {
    id: Uuid,
    title: String,
    content: String,
    created_at: DateTime<Utc>,
}
impl LessonRecord {
    fn to_domain(self) -> Lesson {
        Lesson {
            id: self.id,
            title: self.title,
            content: self.content,
            created_at: self.created_at,
        }
    }
}

const SESSION_COLUMNS: &str =
    "id, corrected_text, input_text, language, model, messages, created_at";

/// Matches one account's session for a corrected text. The digest lets the
/// unique index serve the lookup; the text comparison rules out collisions.
const SESSION_MATCH: &str =
    "user_id = $1 AND md5(corrected_text) = md5($2) AND corrected_text = $2";

//=========================================================================================
// `AccountStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl AccountStore for DbAdapter {
    async fn create_user_with_email(&self, email: &str, hashed_password: &str) -> PortResult<User> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        let record = sqlx::query_as::<_, UserRecord>(
            "INSERT INTO users (user_id, email, hashed_password) VALUES ($1, $2, $3) RETURNING user_id, email",
        )
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(hashed_password)
        .fetch_one(&mut *tx)
        .await
        .map_err(unexpected)?;

        // Every account starts with a default profile.
        sqlx::query("INSERT INTO profiles (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
            .bind(record.user_id)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;

        tx.commit().await.map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let record = sqlx::query_as::<_, CredentialsRecord>(
            "SELECT user_id, email, hashed_password FROM users WHERE email = $1 AND hashed_password IS NOT NULL",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("User {} not found", email)),
            _ => PortError::Unexpected(e.to_string()),
        })?;
        Ok(record.to_domain())
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query("INSERT INTO auth_sessions (id, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(session_id)
            .bind(user_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid> {
        sqlx::query_scalar::<_, Uuid>(
            "SELECT user_id FROM auth_sessions WHERE id = $1 AND expires_at > NOW()",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or(PortError::Unauthorized)
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }
}

//=========================================================================================
// Remote Storage (one account)
//=========================================================================================

/// Account-scoped storage that implements the `StorageAdapter` port.
#[derive(Clone)]
pub struct RemoteStorage {
    pool: PgPool,
    user_id: Uuid,
}

impl RemoteStorage {
    async fn lock_session(
        &self,
        conn: &mut PgConnection,
        corrected_text: &str,
    ) -> PortResult<Option<ChatSessionRecord>> {
        sqlx::query_as::<_, ChatSessionRecord>(&format!(
            "SELECT {} FROM chat_sessions WHERE {} FOR UPDATE",
            SESSION_COLUMNS, SESSION_MATCH
        ))
        .bind(self.user_id)
        .bind(corrected_text)
        .fetch_optional(conn)
        .await
        .map_err(unexpected)
    }

    async fn merge_into_row(
        &self,
        conn: &mut PgConnection,
        stored: ChatSessionRecord,
        incoming: ChatSession,
    ) -> PortResult<ChatSession> {
        let mut session = stored.to_domain();
        session.merge_from(incoming);
        sqlx::query(
            "UPDATE chat_sessions SET input_text = $1, language = $2, model = $3, messages = $4, updated_at = NOW() WHERE id = $5",
        )
        .bind(&session.input_text)
        .bind(session.language.map(|l| l.as_str()))
        .bind(session.model.as_deref())
        .bind(Json(&session.messages))
        .bind(session.id)
        .execute(conn)
        .await
        .map_err(unexpected)?;
        Ok(session)
    }
}

#[async_trait]
impl StorageAdapter for RemoteStorage {
    fn kind(&self) -> StorageKind {
        StorageKind::Remote
    }

    async fn get_progress(&self) -> PortResult<UserProgress> {
        let record = sqlx::query_as::<_, ProfileRecord>(
            "SELECT points, total_corrections, languages_learned, streak_days, level, daily_challenge FROM profiles WHERE user_id = $1",
        )
        .bind(self.user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.map(ProfileRecord::to_domain).unwrap_or_default())
    }

    async fn save_progress(&self, progress: &UserProgress) -> PortResult<()> {
        let record = ProfileRecord::from_domain(progress);
        sqlx::query(
            "INSERT INTO profiles (user_id, points, total_corrections, languages_learned, streak_days, level, daily_challenge, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
             ON CONFLICT (user_id) DO UPDATE SET
                points = EXCLUDED.points,
                total_corrections = EXCLUDED.total_corrections,
                languages_learned = EXCLUDED.languages_learned,
                streak_days = EXCLUDED.streak_days,
                level = EXCLUDED.level,
                daily_challenge = EXCLUDED.daily_challenge,
                updated_at = NOW()",
        )
        .bind(self.user_id)
        .bind(record.points)
        .bind(record.total_corrections)
        .bind(&record.languages_learned)
        .bind(record.streak_days)
        .bind(record.level)
        .bind(record.daily_challenge)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn find_session_by_corrected_text(
        &self,
        corrected_text: &str,
    ) -> PortResult<Option<ChatSession>> {
        let record = sqlx::query_as::<_, ChatSessionRecord>(&format!(
            "SELECT {} FROM chat_sessions WHERE {}",
            SESSION_COLUMNS, SESSION_MATCH
        ))
        .bind(self.user_id)
        .bind(corrected_text)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.map(ChatSessionRecord::to_domain))
    }

    async fn upsert_session(&self, session: ChatSession) -> PortResult<ChatSession> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        let stored = match self.lock_session(&mut tx, &session.corrected_text).await? {
            Some(existing) => self.merge_into_row(&mut tx, existing, session).await?,
            None => {
                let inserted = sqlx::query_as::<_, ChatSessionRecord>(&format!(
                    "INSERT INTO chat_sessions (id, user_id, corrected_text, input_text, language, model, messages, created_at)
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                     ON CONFLICT (user_id, md5(corrected_text)) DO NOTHING
                     RETURNING {}",
                    SESSION_COLUMNS
                ))
                .bind(session.id)
                .bind(self.user_id)
                .bind(&session.corrected_text)
                .bind(&session.input_text)
                .bind(session.language.map(|l| l.as_str()))
                .bind(session.model.as_deref())
                .bind(Json(&session.messages))
                .bind(session.created_at)
                .fetch_optional(&mut *tx)
                .await
                .map_err(unexpected)?;

                match inserted {
                    Some(record) => record.to_domain(),
                    None => {
                        // A concurrent upsert inserted the row first.
                        debug!(corrected_text = %session.corrected_text, "Lost insert race; merging.");
                        let existing = self
                            .lock_session(&mut tx, &session.corrected_text)
                            .await?
                            .ok_or_else(|| {
                                PortError::Unexpected("Chat session vanished during upsert".to_string())
                            })?;
                        self.merge_into_row(&mut tx, existing, session).await?
                    }
                }
            }
        };

        tx.commit().await.map_err(unexpected)?;
        Ok(stored)
    }

    async fn list_sessions(&self) -> PortResult<Vec<ChatSession>> {
        let records = sqlx::query_as::<_, ChatSessionRecord>(&format!(
            "SELECT {} FROM chat_sessions WHERE user_id = $1 ORDER BY created_at DESC",
            SESSION_COLUMNS
        ))
        .bind(self.user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn list_lessons(&self) -> PortResult<Vec<Lesson>> {
        let records = sqlx::query_as::<_, LessonRecord>(
            "SELECT id, title, content, created_at FROM saved_lessons WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(self.user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn save_lesson(&self, lesson: Lesson) -> PortResult<Lesson> {
        let record = sqlx::query_as::<_, LessonRecord>(
            "INSERT INTO saved_lessons (id, user_id, title, content, created_at) VALUES ($1, $2, $3, $4, $5) RETURNING id, title, content, created_at",
        )
        .bind(lesson.id)
        .bind(self.user_id)
        .bind(&lesson.title)
        .bind(&lesson.content)
        .bind(lesson.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn delete_lesson(&self, lesson_id: Uuid) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM saved_lessons WHERE id = $1 AND user_id = $2")
            .bind(lesson_id)
            .bind(self.user_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Lesson {} not found", lesson_id)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::postgres::PgPoolOptions;
    use std::collections::BTreeSet;

    /// A migrated database from `DATABASE_URL`, or `None` when it is unset.
    async fn test_db() -> Option<DbAdapter> {
        let url = std::env::var("DATABASE_URL").ok()?;
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .connect(&url)
            .await
            .expect("DATABASE_URL is set but the database is unreachable");
        let db = DbAdapter::new(pool);
        db.run_migrations().await.unwrap();
        Some(db)
    }

    async fn fresh_account(db: &DbAdapter) -> RemoteStorage {
        let email = format!("{}@example.com", Uuid::new_v4());
        let user = db.create_user_with_email(&email, "hash").await.unwrap();
        db.remote_storage(user.user_id)
    }

    fn session_with(corrected_text: &str, messages: &[ChatMessage]) -> ChatSession {
        ChatSession {
            messages: messages.to_vec(),
            ..ChatSession::new(corrected_text)
        }
    }

    #[tokio::test]
    async fn remote_upsert_merges_into_one_row() {
        let Some(db) = test_db().await else { return };
        let storage = fresh_account(&db).await;
        let text = "Me gusta mucho el cine y la pizza, es mi favorita.";

        let first = storage
            .upsert_session(session_with(text, &[ChatMessage::tutor("Explanation")]))
            .await
            .unwrap();
        let second = storage
            .upsert_session(session_with(
                text,
                &[ChatMessage::tutor("Explanation"), ChatMessage::user("Why?")],
            ))
            .await
            .unwrap();

        assert_eq!(second.id, first.id);
        assert_eq!(second.messages.len(), 2);
        let sessions = storage.list_sessions().await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].messages, second.messages);
    }

    #[tokio::test]
    async fn concurrent_remote_upserts_keep_both_messages() {
        let Some(db) = test_db().await else { return };
        let storage = fresh_account(&db).await;
        let text = "Ich habe einen Hund.";

        let (a, b) = tokio::join!(
            storage.upsert_session(session_with(text, &[ChatMessage::user("first")])),
            storage.upsert_session(session_with(text, &[ChatMessage::user("second")])),
        );
        a.unwrap();
        b.unwrap();

        let sessions = storage.list_sessions().await.unwrap();
        assert_eq!(sessions.len(), 1);
        let texts: BTreeSet<_> = sessions[0].messages.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, BTreeSet::from(["first", "second"]));
    }

    #[tokio::test]
    async fn long_corrected_texts_are_stored_and_found() {
        let Some(db) = test_db().await else { return };
        let storage = fresh_account(&db).await;
        // Random hex barely compresses, so this is far past a btree entry.
        let text: String = (0..300).map(|_| Uuid::new_v4().simple().to_string()).collect();

        storage
            .upsert_session(session_with(&text, &[ChatMessage::tutor("Explanation")]))
            .await
            .unwrap();
        storage
            .upsert_session(session_with(&text, &[ChatMessage::tutor("Explanation")]))
            .await
            .unwrap();

        let found = storage.find_session_by_corrected_text(&text).await.unwrap();
        assert_eq!(found.map(|s| s.corrected_text), Some(text));
        assert_eq!(storage.list_sessions().await.unwrap().len(), 1);
    }

    #[test]
    fn profile_rows_round_out_bad_values() {
        let record = ProfileRecord {
            points: -5,
            total_corrections: 47,
            languages_learned: vec!["spanish".into(), "klingon".into(), "French".into()],
            streak_days: 3,
            level: 0,
            daily_challenge: true,
        };

        let progress = record.to_domain();

        assert_eq!(progress.points, 0);
        assert_eq!(progress.total_corrections, 47);
        assert_eq!(
            progress.languages_learned,
            BTreeSet::from([Language::Spanish, Language::French])
        );
        assert_eq!(progress.level, 1);
        assert!(progress.daily_challenge);
    }

    #[test]
    fn profile_rows_store_language_codes() {
        let progress = UserProgress {
            points: 1250,
            languages_learned: BTreeSet::from([Language::German, Language::English]),
            ..UserProgress::default()
        };

        let record = ProfileRecord::from_domain(&progress);

        assert_eq!(record.points, 1250);
        assert_eq!(record.languages_learned, vec!["english", "german"]);
        assert_eq!(record.to_domain(), progress);
    }
}
