use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chunking::ChunkingConfig;
use crate::ranking::DEFAULT_TOP_K;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful study assistant. Answer the question using only the provided context from the course material. If the context does not contain the answer, say so.";

/// Subject selection a chat session is scoped to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub struct SubjectFilters {
    pub year: String,
    pub semester: String,
    pub subject: String,
    pub unit: String,
}

impl SubjectFilters {
    pub fn new(
        year: impl Into<String>,
        semester: impl Into<String>,
        subject: impl Into<String>,
        unit: impl Into<String>,
    ) -> Self {
        Self {
            year: year.into(),
            semester: semester.into(),
            subject: subject.into(),
            unit: unit.into(),
        }
    }

    /// Names of the fields that are blank, in declaration order.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("year", &self.year),
            ("semester", &self.semester),
            ("subject", &self.subject),
            ("unit", &self.unit),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }

    pub fn as_segments(&self) -> [&str; 4] {
        [
            self.year.trim(),
            self.semester.trim(),
            self.subject.trim(),
            self.unit.trim(),
        ]
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Pointer to a PDF owned by a [`crate::DocumentStore`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct DocumentRef {
    pub document_id: String,
    pub filename: String,
    pub location: String,
}

#[derive(Debug, Clone)]
pub struct StoredDocument {
    pub reference: DocumentRef,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatSession {
    pub id: String,
    pub filters: SubjectFilters,
    pub messages: Vec<Message>,
    pub documents: Vec<DocumentRef>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChatSession {
    pub fn new(filters: SubjectFilters, documents: Vec<DocumentRef>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            filters,
            messages: Vec::new(),
            documents,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub(crate) fn apply_append(&mut self, messages: Vec<Message>) -> u64 {
        self.messages.extend(messages);
        self.version = self.version.saturating_add(1);
        self.updated_at = Utc::now();
        self.version
    }
}

/// Paragraph-sized slice of one document's text. Lives for a single question.
#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    pub document_id: String,
    pub filename: String,
    pub index: usize,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct ChatOptions {
    pub top_k: usize,
    pub system_prompt: String,
    pub chunking: ChunkingConfig,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            chunking: ChunkingConfig::default(),
        }
    }
}
