//! crates/lingo_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or transport, but they are
//! `serde`-friendly so both storage backends persist them in the same shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Minimum trimmed length (in characters) before a draft is worth detecting.
pub const MIN_SIGNAL_CHARS: usize = 15;
/// Minimum number of whitespace-separated tokens before a draft is worth detecting.
pub const MIN_SIGNAL_TOKENS: usize = 3;

//=========================================================================================
// Languages
//=========================================================================================

/// The fixed set of languages the tutor can detect and correct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    English,
    Spanish,
    French,
    German,
    Italian,
    Portuguese,
}

impl Language {
    pub const ALL: [Language; 6] = [
        Language::English,
        Language::Spanish,
        Language::French,
        Language::German,
        Language::Italian,
        Language::Portuguese,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::English => "english",
            Language::Spanish => "spanish",
            Language::French => "french",
            Language::German => "german",
            Language::Italian => "italian",
            Language::Portuguese => "portuguese",
        }
    }

    /// Human-readable label, e.g. "Spanish".
    pub fn label(&self) -> &'static str {
        match self {
            Language::English => "English",
            Language::Spanish => "Spanish",
            Language::French => "French",
            Language::German => "German",
            Language::Italian => "Italian",
            Language::Portuguese => "Portuguese",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown language: {0}")]
pub struct UnknownLanguage(pub String);

impl FromStr for Language {
    type Err = UnknownLanguage;

    /// Case-insensitive; surrounding whitespace and punctuation are ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let cleaned = s
            .trim()
            .trim_matches(|c: char| !c.is_alphabetic())
            .to_lowercase();
        Language::ALL
            .iter()
            .copied()
            .find(|lang| lang.as_str() == cleaned)
            .ok_or_else(|| UnknownLanguage(s.to_string()))
    }
}

//=========================================================================================
// Detection
//=========================================================================================

/// The visible result of language detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "status", content = "language", rename_all = "snake_case")]
pub enum Detection {
    /// Nothing detected: the draft has no signal or auto-detect is off.
    #[default]
    None,
    /// The detector failed or could not name a supported language.
    Unknown,
    Detected(Language),
}

impl Detection {
    /// The detected language, if it is a known one.
    pub fn language(&self) -> Option<Language> {
        match self {
            Detection::Detected(lang) => Some(*lang),
            Detection::None | Detection::Unknown => None,
        }
    }
}

/// The text currently being edited.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputDraft {
    pub text: String,
}

impl InputDraft {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// True when the trimmed text is long enough and has enough words to be
    /// worth sending to the detector.
    pub fn has_signal(&self) -> bool {
        let trimmed = self.text.trim();
        trimmed.chars().count() >= MIN_SIGNAL_CHARS
            && trimmed.split_whitespace().count() >= MIN_SIGNAL_TOKENS
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// The detection state owned by the debouncer.
///
/// `generation` only ever grows. A response tagged with an older generation
/// than the current one belongs to a superseded request and must be dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DetectionState {
    pub detection: Detection,
    pub in_flight: bool,
    pub generation: u64,
}

impl DetectionState {
    /// Starts a new request, invalidating every earlier one.
    pub fn begin_request(&mut self) -> u64 {
        self.generation += 1;
        self.in_flight = true;
        self.generation
    }

    /// Applies a response. Returns `false` (and changes nothing) when the
    /// response belongs to a superseded request.
    pub fn apply(&mut self, generation: u64, detection: Detection) -> bool {
        if generation != self.generation {
            return false;
        }
        self.detection = detection;
        self.in_flight = false;
        true
    }

    /// Clears the visible detection and invalidates any outstanding request.
    pub fn clear(&mut self) {
        self.generation += 1;
        self.detection = Detection::None;
        self.in_flight = false;
    }
}

//=========================================================================================
// Corrections
//=========================================================================================

/// The output of one successful correction call. Never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectionResult {
    pub corrected_text: String,
    pub input_text: String,
    pub language: Language,
    pub model: String,
    pub created_at: DateTime<Utc>,
}

//=========================================================================================
// Chat sessions
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Tutor,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub sender: Sender,
    pub text: String,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self { sender: Sender::User, text: text.into() }
    }

    pub fn tutor(text: impl Into<String>) -> Self {
        Self { sender: Sender::Tutor, text: text.into() }
    }
}

/// A corrected text and the conversation about it.
///
/// Within one storage backend there is at most one session per exact
/// `corrected_text` value; see [`ChatSession::merge_from`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: Uuid,
    pub corrected_text: String,
    #[serde(default)]
    pub input_text: String,
    #[serde(default)]
    pub language: Option<Language>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    pub created_at: DateTime<Utc>,
}

impl ChatSession {
    pub fn new(corrected_text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            corrected_text: corrected_text.into(),
            input_text: String::new(),
            language: None,
            model: None,
            messages: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// A session seeded from a correction result.
    pub fn from_correction(result: &CorrectionResult) -> Self {
        Self {
            input_text: result.input_text.clone(),
            language: Some(result.language),
            model: Some(result.model.clone()),
            ..Self::new(result.corrected_text.clone())
        }
    }

    /// Folds `incoming` (a record for the same corrected text) into `self`.
    ///
    /// The stored identity is kept. Descriptive fields are only filled when
    /// empty. Messages become: the stored messages, followed by the incoming
    /// messages past the prefix both lists share.
    pub fn merge_from(&mut self, incoming: ChatSession) {
        if self.input_text.is_empty() {
            self.input_text = incoming.input_text;
        }
        if self.language.is_none() {
            self.language = incoming.language;
        }
        if self.model.is_none() {
            self.model = incoming.model;
        }

        let shared = self
            .messages
            .iter()
            .zip(incoming.messages.iter())
            .take_while(|(stored, new)| stored == new)
            .count();
        self.messages
            .extend(incoming.messages.into_iter().skip(shared));
    }
}

/// Finds the session for `corrected_text` in a loaded collection.
pub fn find_by_corrected_text<'a>(
    sessions: &'a [ChatSession],
    corrected_text: &str,
) -> Option<&'a ChatSession> {
    sessions.iter().find(|s| s.corrected_text == corrected_text)
}

/// Inserts or merges `incoming` into a loaded collection and returns the
/// stored record. Used by backends that persist a whole collection at once.
pub fn upsert_into(sessions: &mut Vec<ChatSession>, incoming: ChatSession) -> ChatSession {
    match sessions
        .iter_mut()
        .find(|s| s.corrected_text == incoming.corrected_text)
    {
        Some(existing) => {
            existing.merge_from(incoming);
            existing.clone()
        }
        None => {
            sessions.push(incoming.clone());
            incoming
        }
    }
}

//=========================================================================================
// Progress and lessons
//=========================================================================================

/// Gamified counters shown on the profile page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserProgress {
    pub points: u64,
    pub total_corrections: u64,
    pub languages_learned: BTreeSet<Language>,
    pub streak_days: u32,
    pub level: u32,
    pub daily_challenge: bool,
}

impl Default for UserProgress {
    fn default() -> Self {
        Self {
            points: 0,
            total_corrections: 0,
            languages_learned: BTreeSet::new(),
            streak_days: 0,
            level: 1,
            daily_challenge: false,
        }
    }
}

impl UserProgress {
    /// Adds the reward for one successful correction.
    pub fn record_correction(&mut self, language: Language, reward: u32) {
        self.points += u64::from(reward);
        self.total_corrections += 1;
        self.languages_learned.insert(language);
    }

    pub fn award(&mut self, points: u32) {
        self.points += u64::from(points);
    }
}

/// A saved lesson generated from a tutor conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lesson {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Lesson {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

/// Registered account. The password hash never leaves the account store.
#[derive(Debug, Clone)]
pub struct User {
    pub user_id: Uuid,
    pub email: Option<String>,
}

// Only used internally for login/signup - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user_id: Uuid,
    pub email: String,
    pub hashed_password: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_requires_length_and_tokens() {
        assert!(!InputDraft::new("hola").has_signal());
        assert!(!InputDraft::new("   supercalifragilistic   ").has_signal());
        assert!(!InputDraft::new("two wordsssssssssss").has_signal());
        assert!(!InputDraft::new("a b c").has_signal());
        assert!(InputDraft::new("Me gusta mucho el cine").has_signal());
        assert!(InputDraft::new("   one two three four   ").has_signal());
    }

    #[test]
    fn language_parsing_is_lenient() {
        assert_eq!("Spanish".parse::<Language>(), Ok(Language::Spanish));
        assert_eq!(" french.\n".parse::<Language>(), Ok(Language::French));
        assert!("klingon".parse::<Language>().is_err());
        assert!("unknown".parse::<Language>().is_err());
    }

    #[test]
    fn stale_generation_is_ignored() {
        let mut state = DetectionState::default();
        let first = state.begin_request();
        let second = state.begin_request();

        assert!(state.apply(second, Detection::Detected(Language::German)));
        assert!(!state.apply(first, Detection::Detected(Language::Italian)));
        assert_eq!(state.detection, Detection::Detected(Language::German));
        assert!(!state.in_flight);
    }

    #[test]
    fn clear_invalidates_outstanding_request() {
        let mut state = DetectionState::default();
        let generation = state.begin_request();
        state.clear();

        assert!(!state.apply(generation, Detection::Detected(Language::French)));
        assert_eq!(state.detection, Detection::None);
        assert!(!state.in_flight);
    }

    #[test]
    fn merge_extends_and_keeps_identity() {
        let mut stored = ChatSession::new("Hola mundo");
        stored.messages = vec![ChatMessage::tutor("explanation")];
        let id = stored.id;

        let mut longer = ChatSession::new("Hola mundo");
        longer.input_text = "Hola mundo!!".into();
        longer.messages = vec![
            ChatMessage::tutor("explanation"),
            ChatMessage::user("why?"),
            ChatMessage::tutor("because"),
        ];
        stored.merge_from(longer);

        assert_eq!(stored.id, id);
        assert_eq!(stored.input_text, "Hola mundo!!");
        assert_eq!(stored.messages.len(), 3);

        let mut stale = ChatSession::new("Hola mundo");
        stale.messages = vec![ChatMessage::tutor("explanation")];
        stored.merge_from(stale);
        assert_eq!(stored.messages.len(), 3);
    }

    #[test]
    fn merge_keeps_both_divergent_appends() {
        let mut stored = ChatSession::new("text");
        stored.messages = vec![ChatMessage::tutor("a"), ChatMessage::user("first")];

        let mut other = ChatSession::new("text");
        other.language = Some(Language::Spanish);
        other.messages = vec![ChatMessage::tutor("a"), ChatMessage::user("second")];
        stored.merge_from(other);

        let texts: Vec<_> = stored.messages.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "first", "second"]);
        assert_eq!(stored.language, Some(Language::Spanish));
    }

    #[test]
    fn upsert_into_never_duplicates() {
        let mut sessions = Vec::new();
        let mut first = ChatSession::new("same");
        first.messages.push(ChatMessage::tutor("one"));
        let mut second = ChatSession::new("same");
        second.messages.push(ChatMessage::tutor("one"));
        second.messages.push(ChatMessage::user("two"));

        let stored_first = upsert_into(&mut sessions, first);
        let stored_second = upsert_into(&mut sessions, second);

        assert_eq!(sessions.len(), 1);
        assert_eq!(stored_first.id, stored_second.id);
        assert_eq!(sessions[0].messages.len(), 2);
    }

    #[test]
    fn progress_is_additive() {
        let mut progress = UserProgress::default();
        progress.record_correction(Language::Spanish, 7);
        progress.record_correction(Language::Spanish, 5);
        progress.award(15);

        assert_eq!(progress.points, 27);
        assert_eq!(progress.total_corrections, 2);
        assert_eq!(progress.languages_learned.len(), 1);
        assert_eq!(progress.level, 1);
    }
}
