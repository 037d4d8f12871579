//! Turn (chat message) model.
//!
//! A [`Turn`] only exists once it has been admitted to a
//! [`ConversationLog`](crate::conversation::ConversationLog); before that it is
//! a [`NewTurn`] draft. Turns expose no setters, so an admitted entry cannot
//! change: corrections are appended as new turns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::gateway::ChatReply;

/// Handle to a synthesized-speech resource (the backend's `audio_url`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AudioRef(String);

impl AudioRef {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AudioRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Author {
    User,
    Assistant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnStatus {
    Ok,
    /// The turn's text describes a failure.
    Error,
}

/// One admitted message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Turn {
    id: Uuid,
    author: Author,
    text: String,
    timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    audio_ref: Option<AudioRef>,
    status: TurnStatus,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    suggestions: Vec<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    clarification_needed: bool,
}

impl Turn {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn author(&self) -> Author {
        self.author
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn audio_ref(&self) -> Option<&AudioRef> {
        self.audio_ref.as_ref()
    }

    pub fn status(&self) -> TurnStatus {
        self.status
    }

    pub fn is_error(&self) -> bool {
        self.status == TurnStatus::Error
    }

    /// Follow-up prompts offered by the assistant.
    pub fn suggestions(&self) -> &[String] {
        &self.suggestions
    }

    /// The assistant asked the user to clarify instead of answering.
    pub fn clarification_needed(&self) -> bool {
        self.clarification_needed
    }
}

/// A turn that has not been admitted to a log yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTurn {
    author: Author,
    text: String,
    audio_ref: Option<AudioRef>,
    status: TurnStatus,
    suggestions: Vec<String>,
    clarification_needed: bool,
}

impl NewTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Author::User, text.into(), TurnStatus::Ok)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Author::Assistant, text.into(), TurnStatus::Ok)
    }

    /// Assistant-authored failure description.
    pub fn error(description: impl Into<String>) -> Self {
        Self::new(Author::Assistant, description.into(), TurnStatus::Error)
    }

    pub fn from_reply(reply: ChatReply) -> Self {
        let audio_ref = reply.audio_ref();
        Self {
            author: Author::Assistant,
            text: reply.text,
            audio_ref,
            status: TurnStatus::Ok,
            suggestions: reply.suggestions,
            clarification_needed: reply.clarification_needed,
        }
    }

    fn new(author: Author, text: String, status: TurnStatus) -> Self {
        Self {
            author,
            text,
            audio_ref: None,
            status,
            suggestions: Vec::new(),
            clarification_needed: false,
        }
    }

    pub(crate) fn admit(self, timestamp: DateTime<Utc>) -> Turn {
        Turn {
            id: Uuid::new_v4(),
            author: self.author,
            text: self.text,
            timestamp,
            audio_ref: self.audio_ref,
            status: self.status,
            suggestions: self.suggestions,
            clarification_needed: self.clarification_needed,
        }
    }
}
