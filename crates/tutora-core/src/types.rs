//! UI-agnostic domain types
//!
//! Shared between the store, the backend gateway, and whatever front end
//! consumes them; nothing in here depends on a UI framework or on the
//! transport. Field names serialize in camelCase to match both the persisted
//! snapshot and the backend wire format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One of the three supported academic subjects. Closed set; textual input
/// outside it fails to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Subject {
    Math,
    Science,
    Portuguese,
}

impl Subject {
    pub fn as_str(&self) -> &'static str {
        match self {
            Subject::Math => "math",
            Subject::Science => "science",
            Subject::Portuguese => "portuguese",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "math" => Some(Subject::Math),
            "science" => Some(Subject::Science),
            "portuguese" => Some(Subject::Portuguese),
            _ => None,
        }
    }

    pub fn all() -> Vec<Subject> {
        vec![Subject::Math, Subject::Science, Subject::Portuguese]
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Subject::Math => "Matemática",
            Subject::Science => "Ciências",
            Subject::Portuguese => "Português",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Subject::Math => "🧮",
            Subject::Science => "🧪",
            Subject::Portuguese => "📚",
        }
    }
}

/// The role of a chat message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Image,
    Audio,
}

/// An uploaded file referenced by a message. Immutable once attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: AttachmentKind,
    pub url: String,
    pub filename: String,
}

/// A chat message in a conversation.
///
/// `id`, `role` and `timestamp` are fixed at creation. `content`,
/// `attachments` and `is_loading` may be rewritten in place; that is how a
/// loading placeholder becomes the real assistant reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub is_loading: bool,
}

/// An ordered thread of messages scoped to one subject. Messages are
/// append-only; `updated_at` tracks the most recent append.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub subject: Subject,
    pub title: String,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Per-subject counter of answered questions. At most one record per subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentProgress {
    pub subject: Subject,
    pub questions_answered: u32,
    pub last_active: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaperColor {
    Azul,
    Amarelo,
    Rosa,
    Branco,
}

impl PaperColor {
    pub fn display_name(&self) -> &'static str {
        match self {
            PaperColor::Azul => "Azul",
            PaperColor::Amarelo => "Amarelo",
            PaperColor::Rosa => "Rosa",
            PaperColor::Branco => "Branco",
        }
    }
}

/// An official exam paper as served by the backend. Read-only on this side;
/// the client only fetches and filters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamPaper {
    pub id: String,
    pub year: i32,
    pub day: u8,
    pub color: PaperColor,
    pub subjects: Vec<Subject>,
    pub file_url: String,
    pub answers_url: String,
}

impl ExamPaper {
    pub fn day_label(&self) -> &'static str {
        if self.day == 1 { "1º Dia" } else { "2º Dia" }
    }

    pub fn day_area(&self) -> &'static str {
        if self.day == 1 {
            "Linguagens e Humanas"
        } else {
            "Matemática e Natureza"
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YoutubeRecommendation {
    pub id: String,
    pub title: String,
    pub url: String,
    pub thumbnail_url: String,
}
