//! # Session Messages Module
//!
//! The conversation log of one coaching session.
//!
//! [`ConversationMemory`] is append-only: messages are pushed to the end and never edited,
//! reordered or removed, so insertion order is chronological order. It lives exactly as
//! long as its session and is never written to disk.
//!
//! The prompt composer reads it as history; the terminal surface reads it to redraw the
//! conversation.
//!
//! ```rust
//! use eque::session_messages::{ConversationMemory, Message, Speaker};
//!
//! let mut memory = ConversationMemory::new();
//! memory.append(Message::human("Hello"));
//! memory.append(Message::assistant("Hi! What would you like to work on?"));
//!
//! assert_eq!(memory.len(), 2);
//! assert_eq!(memory.all()[0].speaker, Speaker::Human);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Who wrote a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    Human,
    Assistant,
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Speaker::Human => "human",
            Speaker::Assistant => "assistant",
        })
    }
}

/// One exchanged message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub speaker: Speaker,
    pub content: String,
    /// When the message was recorded; display metadata only.
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(speaker: Speaker, content: impl Into<String>) -> Self {
        Self {
            speaker,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    pub fn human(content: impl Into<String>) -> Self {
        Self::new(Speaker::Human, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Speaker::Assistant, content)
    }
}

/// Append-only, session-scoped message log.
#[derive(Debug, Default, Clone)]
pub struct ConversationMemory {
    messages: Vec<Message>,
}

impl ConversationMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a message after every existing one.
    pub fn append(&mut self, message: Message) {
        tracing::debug!(
            speaker = %message.speaker,
            position = self.messages.len(),
            "Appending message"
        );
        self.messages.push(message);
    }

    /// The full history, oldest first.
    pub fn all(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }
}
