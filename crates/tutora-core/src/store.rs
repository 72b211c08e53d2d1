//! Conversation store
//!
//! Single authoritative owner of the conversation list, the
//! active-conversation pointer, and per-subject progress. Every mutation
//! writes the whole state back to a JSON snapshot so a restart picks up
//! where the student left off. The store is constructed explicitly and
//! handed to consumers; there is no ambient global.
//!
//! Mutations never fail: a missing target degrades to a no-op, and the
//! return value reports which kind of no-op happened so callers (and tests)
//! can still tell the difference.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::helpers::{format_date, generate_id, welcome_message};
use crate::types::{Attachment, Conversation, Message, Role, StudentProgress, Subject};

/// Current snapshot schema version. Bump together with a step in
/// [`StoreState::migrate`].
pub const SNAPSHOT_VERSION: u32 = 1;

/// File name of the persisted snapshot inside the app config directory.
pub const SNAPSHOT_FILE: &str = "chat-storage.json";

/// What a mutation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreUpdate {
    Applied,
    NoActiveConversation,
    MessageNotFound,
}

/// Fields for a message about to be appended. Id and timestamp are assigned
/// by the store.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub role: Role,
    pub content: String,
    pub attachments: Vec<Attachment>,
    pub is_loading: bool,
}

impl NewMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            attachments: Vec::new(),
            is_loading: false,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            attachments: Vec::new(),
            is_loading: false,
        }
    }
}

/// In-place updates for an existing message. `None` fields are left alone.
#[derive(Debug, Clone, Default)]
pub struct MessageUpdate {
    pub content: Option<String>,
    pub is_loading: Option<bool>,
    pub attachments: Option<Vec<Attachment>>,
}

/// The persisted shape. Everything in here survives a restart; transient
/// state (in-flight sends) deliberately does not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct StoreState {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub conversations: Vec<Conversation>,
    #[serde(default)]
    pub active_conversation_id: Option<String>,
    #[serde(default)]
    pub student_progress: Vec<StudentProgress>,
    #[serde(default)]
    pub rated_conversations: Vec<String>,
}

impl StoreState {
    fn current() -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            ..Default::default()
        }
    }

    /// Upgrade an older snapshot in place. A snapshot written before the
    /// version field existed deserializes as version 0.
    fn migrate(&mut self) {
        if self.version == 0 {
            // v0 -> v1 introduced the version tag and the rated-conversation
            // list; the serde defaults already fill both.
            self.version = 1;
        }
    }
}

pub struct ChatStore {
    state: StoreState,
    path: Option<PathBuf>,
    in_flight: HashSet<String>,
}

impl ChatStore {
    /// In-memory store, nothing touches disk. Used by tests and by callers
    /// that manage persistence themselves.
    pub fn in_memory() -> Self {
        Self {
            state: StoreState::current(),
            path: None,
            in_flight: HashSet::new(),
        }
    }

    /// Rehydrate from the snapshot at `path`, or start empty when no
    /// snapshot exists yet.
    pub fn load(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let content = fs::read_to_string(&path)?;
            let mut state: StoreState = serde_json::from_str(&content)?;
            state.migrate();
            state
        } else {
            StoreState::current()
        };

        Ok(Self {
            state,
            path: Some(path),
            in_flight: HashSet::new(),
        })
    }

    /// Default snapshot location under the user's config directory.
    pub fn default_path() -> Result<PathBuf> {
        let config_dir =
            dirs::config_dir().ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("tutora").join(SNAPSHOT_FILE))
    }

    // ── Mutations ──

    /// Create a conversation seeded with the subject's welcome message, make
    /// it active, and put it at the front of the list. Returns the new id.
    pub fn start_new_conversation(&mut self, subject: Subject) -> String {
        let id = generate_id();
        let now = Utc::now();
        let conversation = Conversation {
            id: id.clone(),
            subject,
            title: format!("Nova conversa - {}", format_date(&now)),
            messages: vec![welcome_message(subject)],
            created_at: now,
            updated_at: now,
        };

        self.state.conversations.insert(0, conversation);
        self.state.active_conversation_id = Some(id.clone());
        self.persist();
        id
    }

    /// Reassign the active pointer. The id is not checked against the
    /// conversation list; consumers must render an unresolvable pointer as
    /// the empty state.
    pub fn set_active_conversation(&mut self, id: Option<String>) {
        self.state.active_conversation_id = id;
        self.persist();
    }

    /// Append to the active conversation, assigning id and timestamp.
    /// Returns the assigned id, or `None` when there is no resolvable active
    /// conversation (the append is then a no-op).
    pub fn add_message(&mut self, message: NewMessage) -> Option<String> {
        let active_id = self.state.active_conversation_id.clone()?;
        let conversation = self
            .state
            .conversations
            .iter_mut()
            .find(|c| c.id == active_id)?;

        let id = generate_id();
        let now = Utc::now();
        conversation.messages.push(Message {
            id: id.clone(),
            role: message.role,
            content: message.content,
            timestamp: now,
            attachments: message.attachments,
            is_loading: message.is_loading,
        });
        conversation.updated_at = now;

        self.persist();
        Some(id)
    }

    /// Merge the given fields into the message with `id` inside the active
    /// conversation. Never raises; the result says whether anything changed.
    pub fn update_message(&mut self, id: &str, update: MessageUpdate) -> StoreUpdate {
        let Some(active_id) = self.state.active_conversation_id.clone() else {
            return StoreUpdate::NoActiveConversation;
        };
        let Some(conversation) = self
            .state
            .conversations
            .iter_mut()
            .find(|c| c.id == active_id)
        else {
            return StoreUpdate::NoActiveConversation;
        };
        let Some(message) = conversation.messages.iter_mut().find(|m| m.id == id) else {
            return StoreUpdate::MessageNotFound;
        };

        if let Some(content) = update.content {
            message.content = content;
        }
        if let Some(is_loading) = update.is_loading {
            message.is_loading = is_loading;
        }
        if let Some(attachments) = update.attachments {
            message.attachments = attachments;
        }

        self.persist();
        StoreUpdate::Applied
    }

    /// Set the subject's counter to an explicit value, or increment it by
    /// one when no value is given. Creates the record (default 1) on first
    /// contact with a subject.
    pub fn update_progress(&mut self, subject: Subject, questions_answered: Option<u32>) {
        let now = Utc::now();

        if let Some(progress) = self
            .state
            .student_progress
            .iter_mut()
            .find(|p| p.subject == subject)
        {
            progress.questions_answered = match questions_answered {
                Some(value) => value,
                None => progress.questions_answered + 1,
            };
            progress.last_active = now;
        } else {
            self.state.student_progress.push(StudentProgress {
                subject,
                questions_answered: questions_answered.unwrap_or(1),
                last_active: now,
            });
        }

        self.persist();
    }

    // ── In-flight send guard ──

    /// Mark a send as outstanding for the conversation. Returns `false` when
    /// one already is, in which case the caller must not start another
    /// exchange.
    pub fn begin_send(&mut self, conversation_id: &str) -> bool {
        self.in_flight.insert(conversation_id.to_string())
    }

    pub fn finish_send(&mut self, conversation_id: &str) {
        self.in_flight.remove(conversation_id);
    }

    pub fn send_in_flight(&self, conversation_id: &str) -> bool {
        self.in_flight.contains(conversation_id)
    }

    // ── Feedback bookkeeping ──

    pub fn mark_feedback_submitted(&mut self, conversation_id: &str) {
        if !self.feedback_submitted(conversation_id) {
            self.state
                .rated_conversations
                .push(conversation_id.to_string());
            self.persist();
        }
    }

    pub fn feedback_submitted(&self, conversation_id: &str) -> bool {
        self.state
            .rated_conversations
            .iter()
            .any(|id| id == conversation_id)
    }

    // ── Read access ──

    pub fn conversations(&self) -> &[Conversation] {
        &self.state.conversations
    }

    pub fn conversation(&self, id: &str) -> Option<&Conversation> {
        self.state.conversations.iter().find(|c| c.id == id)
    }

    pub fn active_conversation_id(&self) -> Option<&str> {
        self.state.active_conversation_id.as_deref()
    }

    pub fn active_conversation(&self) -> Option<&Conversation> {
        let id = self.state.active_conversation_id.as_deref()?;
        self.state.conversations.iter().find(|c| c.id == id)
    }

    /// Most recently touched conversation for a subject, if any.
    pub fn latest_conversation_for(&self, subject: Subject) -> Option<&Conversation> {
        self.state
            .conversations
            .iter()
            .filter(|c| c.subject == subject)
            .max_by_key(|c| c.updated_at)
    }

    pub fn progress(&self) -> &[StudentProgress] {
        &self.state.student_progress
    }

    pub fn progress_for(&self, subject: Subject) -> Option<&StudentProgress> {
        self.state
            .student_progress
            .iter()
            .find(|p| p.subject == subject)
    }

    pub fn total_questions_answered(&self) -> u32 {
        self.state
            .student_progress
            .iter()
            .map(|p| p.questions_answered)
            .sum()
    }

    /// The full persisted shape, for snapshot comparison.
    pub fn state(&self) -> &StoreState {
        &self.state
    }

    // ── Persistence ──

    fn persist(&self) {
        let Some(path) = &self.path else { return };
        if let Err(e) = self.write_snapshot(path) {
            tracing::warn!(error = %e, "failed to persist chat snapshot");
        }
    }

    fn write_snapshot(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(&self.state)?;
        fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_conversation(subject: Subject) -> ChatStore {
        let mut store = ChatStore::in_memory();
        store.start_new_conversation(subject);
        store
    }

    #[test]
    fn test_new_conversation_opens_with_welcome() {
        let mut store = ChatStore::in_memory();
        let id = store.start_new_conversation(Subject::Math);

        assert_eq!(store.active_conversation_id(), Some(id.as_str()));
        let conversation = store.active_conversation().unwrap();
        assert_eq!(conversation.subject, Subject::Math);
        assert_eq!(conversation.messages.len(), 1);
        assert_eq!(conversation.messages[0].role, Role::Assistant);
        assert!(conversation.title.starts_with("Nova conversa - "));
    }

    #[test]
    fn test_newest_conversation_is_first() {
        let mut store = ChatStore::in_memory();
        let first = store.start_new_conversation(Subject::Math);
        let second = store.start_new_conversation(Subject::Science);

        assert_eq!(store.conversations()[0].id, second);
        assert_eq!(store.conversations()[1].id, first);
        assert_eq!(store.active_conversation_id(), Some(second.as_str()));
    }

    #[test]
    fn test_messages_append_in_call_order() {
        let mut store = store_with_conversation(Subject::Math);
        let mut last_updated = store.active_conversation().unwrap().updated_at;

        let mut ids = Vec::new();
        for i in 0..5 {
            let id = store
                .add_message(NewMessage::user(format!("pergunta {}", i)))
                .unwrap();
            ids.push(id);

            let updated = store.active_conversation().unwrap().updated_at;
            assert!(updated >= last_updated);
            last_updated = updated;
        }

        let conversation = store.active_conversation().unwrap();
        // Welcome message first, then the five appends in call order.
        let appended: Vec<&str> = conversation.messages[1..]
            .iter()
            .map(|m| m.id.as_str())
            .collect();
        assert_eq!(appended, ids.iter().map(String::as_str).collect::<Vec<_>>());
    }

    #[test]
    fn test_placeholder_resolution_leaves_siblings_alone() {
        let mut store = store_with_conversation(Subject::Science);
        store.add_message(NewMessage::user("como funciona a fotossíntese?"));

        let placeholder = NewMessage {
            is_loading: true,
            ..NewMessage::assistant("Estou pensando... ⏳")
        };
        let placeholder_id = store.add_message(placeholder).unwrap();

        let before: Vec<Message> = store.active_conversation().unwrap().messages.clone();

        let result = store.update_message(
            &placeholder_id,
            MessageUpdate {
                content: Some("As plantas convertem luz em energia.".to_string()),
                is_loading: Some(false),
                attachments: None,
            },
        );
        assert_eq!(result, StoreUpdate::Applied);

        let after = &store.active_conversation().unwrap().messages;
        for (old, new) in before.iter().zip(after.iter()) {
            if new.id == placeholder_id {
                assert_eq!(new.content, "As plantas convertem luz em energia.");
                assert!(!new.is_loading);
                assert_eq!(new.id, old.id);
                assert_eq!(new.timestamp, old.timestamp);
            } else {
                assert_eq!(old, new);
            }
        }
    }

    #[test]
    fn test_update_unknown_message_is_a_noop() {
        let mut store = store_with_conversation(Subject::Portuguese);
        let before = store.state().clone();

        let result = store.update_message(
            "nao-existe",
            MessageUpdate {
                content: Some("nunca aplicado".to_string()),
                ..Default::default()
            },
        );

        assert_eq!(result, StoreUpdate::MessageNotFound);
        assert_eq!(store.state(), &before);
    }

    #[test]
    fn test_mutations_without_active_conversation_are_noops() {
        let mut store = ChatStore::in_memory();
        let before = store.state().clone();

        assert_eq!(store.add_message(NewMessage::user("oi")), None);
        assert_eq!(
            store.update_message("qualquer", MessageUpdate::default()),
            StoreUpdate::NoActiveConversation
        );
        assert_eq!(store.state(), &before);
    }

    #[test]
    fn test_dangling_active_pointer_is_tolerated() {
        let mut store = store_with_conversation(Subject::Math);
        store.set_active_conversation(Some("fantasma".to_string()));

        assert!(store.active_conversation().is_none());
        assert_eq!(store.add_message(NewMessage::user("oi")), None);
        assert_eq!(
            store.update_message("x", MessageUpdate::default()),
            StoreUpdate::NoActiveConversation
        );
    }

    #[test]
    fn test_progress_increments_once_per_call() {
        let mut store = ChatStore::in_memory();

        for _ in 0..4 {
            store.update_progress(Subject::Math, None);
        }

        assert_eq!(store.progress_for(Subject::Math).unwrap().questions_answered, 4);
        assert!(store.progress_for(Subject::Science).is_none());
    }

    #[test]
    fn test_progress_explicit_value_overrides() {
        let mut store = ChatStore::in_memory();
        store.update_progress(Subject::Science, None);
        store.update_progress(Subject::Science, None);
        store.update_progress(Subject::Science, Some(10));

        assert_eq!(
            store.progress_for(Subject::Science).unwrap().questions_answered,
            10
        );

        store.update_progress(Subject::Science, None);
        assert_eq!(
            store.progress_for(Subject::Science).unwrap().questions_answered,
            11
        );
    }

    #[test]
    fn test_progress_last_active_moves_forward() {
        let mut store = ChatStore::in_memory();
        store.update_progress(Subject::Math, None);
        let first = store.progress_for(Subject::Math).unwrap().last_active;
        store.update_progress(Subject::Math, None);
        let second = store.progress_for(Subject::Math).unwrap().last_active;
        assert!(second >= first);
    }

    #[test]
    fn test_total_questions_answered_sums_subjects() {
        let mut store = ChatStore::in_memory();
        store.update_progress(Subject::Math, Some(3));
        store.update_progress(Subject::Portuguese, Some(2));
        assert_eq!(store.total_questions_answered(), 5);
    }

    #[test]
    fn test_in_flight_guard() {
        let mut store = store_with_conversation(Subject::Math);
        let id = store.active_conversation_id().unwrap().to_string();

        assert!(store.begin_send(&id));
        assert!(store.send_in_flight(&id));
        assert!(!store.begin_send(&id));

        store.finish_send(&id);
        assert!(!store.send_in_flight(&id));
        assert!(store.begin_send(&id));
    }

    #[test]
    fn test_snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SNAPSHOT_FILE);

        let mut store = ChatStore::load(path.clone()).unwrap();
        store.start_new_conversation(Subject::Math);
        store.add_message(NewMessage::user("2+2=?")).unwrap();
        store.update_progress(Subject::Math, None);
        store.mark_feedback_submitted("alguma-conversa");

        let reloaded = ChatStore::load(path).unwrap();
        assert_eq!(reloaded.state(), store.state());
        assert!(reloaded.feedback_submitted("alguma-conversa"));
    }

    #[test]
    fn test_versionless_snapshot_migrates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SNAPSHOT_FILE);

        // A snapshot from before the version tag existed.
        let legacy = r#"{
            "conversations": [],
            "activeConversationId": null,
            "studentProgress": [
                {"subject": "math", "questionsAnswered": 7, "lastActive": "2025-01-15T12:00:00Z"}
            ]
        }"#;
        fs::write(&path, legacy).unwrap();

        let store = ChatStore::load(path).unwrap();
        assert_eq!(store.state().version, SNAPSHOT_VERSION);
        assert_eq!(store.progress_for(Subject::Math).unwrap().questions_answered, 7);
        assert!(store.state().rated_conversations.is_empty());
    }

    #[test]
    fn test_missing_snapshot_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChatStore::load(dir.path().join("nunca-escrito.json")).unwrap();
        assert!(store.conversations().is_empty());
        assert!(store.active_conversation_id().is_none());
    }

    #[test]
    fn test_latest_conversation_for_subject() {
        let mut store = ChatStore::in_memory();
        let math_one = store.start_new_conversation(Subject::Math);
        store.start_new_conversation(Subject::Science);
        let math_two = store.start_new_conversation(Subject::Math);

        // The newer math conversation wins.
        assert_eq!(store.latest_conversation_for(Subject::Math).unwrap().id, math_two);

        // Appending to the older one makes it the most recently touched.
        store.set_active_conversation(Some(math_one.clone()));
        store.add_message(NewMessage::user("voltei")).unwrap();
        assert_eq!(store.latest_conversation_for(Subject::Math).unwrap().id, math_one);
    }
}
