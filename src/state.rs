//! UI-agnostic chat state.
//!
//! The transcript is owned by the UI loop alone. Entries are appended,
//! never edited or removed.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatRole {
    User,
    Bot,
}

/// A chat line. `seq` is the insertion position in the transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEntry {
    pub role: ChatRole,
    pub text: String,
    pub seq: usize,
}

#[derive(Debug, Default, Clone)]
pub struct Transcript {
    entries: Vec<ChatEntry>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, role: ChatRole, text: impl Into<String>) -> &ChatEntry {
        let seq = self.entries.len();
        self.entries.push(ChatEntry {
            role,
            text: text.into(),
            seq,
        });
        &self.entries[seq]
    }

    pub fn push_user(&mut self, text: impl Into<String>) -> &ChatEntry {
        self.push(ChatRole::User, text)
    }

    pub fn push_bot(&mut self, text: impl Into<String>) -> &ChatEntry {
        self.push(ChatRole::Bot, text)
    }

    pub fn entries(&self) -> &[ChatEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn count(&self, role: ChatRole) -> usize {
        self.entries.iter().filter(|e| e.role == role).count()
    }
}
