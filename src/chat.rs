//! Conversation data model

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Author of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    /// Label used when rendering transcripts
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

/// A web citation backing part of a response
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct GroundingSource {
    pub title: String,
    pub uri: String,
}

impl GroundingSource {
    /// Create a new source
    #[must_use]
    pub fn new(title: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            uri: uri.into(),
        }
    }
}

/// A single entry in the conversation history
///
/// Messages are never edited after being appended.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,

    /// Message originated from a live voice session
    #[serde(default)]
    pub is_voice: bool,

    /// Message reports a failed request
    #[serde(default)]
    pub is_error: bool,

    /// Citations, in the order the backend returned them
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<GroundingSource>,
}

impl ChatMessage {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            is_voice: false,
            is_error: false,
            sources: Vec::new(),
        }
    }

    /// A message typed or spoken by the user
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// A reply from the assistant
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// A notice from the application itself
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// An inline error notice
    #[must_use]
    pub fn error(content: impl Into<String>) -> Self {
        Self {
            is_error: true,
            ..Self::system(content)
        }
    }

    /// Mark the message as coming from a voice session
    #[must_use]
    pub const fn voice(mut self) -> Self {
        self.is_voice = true;
        self
    }

    /// Attach grounding sources
    #[must_use]
    pub fn with_sources(mut self, sources: Vec<GroundingSource>) -> Self {
        self.sources = sources;
        self
    }
}

/// Drop sources whose uri was already seen, keeping first-seen order
#[must_use]
pub fn dedupe_sources(sources: impl IntoIterator<Item = GroundingSource>) -> Vec<GroundingSource> {
    let mut seen = HashSet::new();
    sources
        .into_iter()
        .filter(|s| seen.insert(s.uri.clone()))
        .collect()
}
