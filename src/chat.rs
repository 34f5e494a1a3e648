//! Live chat log with pin and answered-mark annotations.
//!
//! The log is a per-participant replica fed by chat envelopes. Append
//! is idempotent by message id, so duplicate delivery is harmless, and
//! pin/answered are monotonic one-way transitions — there is no unpin
//! and no un-answer, which makes repeat or out-of-order marks no-ops.
//!
//! Processing order is irrelevant: display order is derived by sorting
//! on the sender's timestamp at render time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::protocol::ParticipantInfo;

/// Chat message category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatKind {
    Normal,
    Question,
    Answer,
}

/// One chat message replica.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    /// Globally unique even under concurrent creation: composed from
    /// the sender id, a millisecond timestamp, and a random component.
    pub id: String,
    pub kind: ChatKind,
    pub content: String,
    pub user_id: Uuid,
    pub user_name: String,
    pub timestamp: DateTime<Utc>,
    pub is_pinned: bool,
    pub is_answered: bool,
    pub answered_by: Option<String>,
}

impl ChatMessage {
    pub fn new(author: &ParticipantInfo, kind: ChatKind, content: impl Into<String>) -> Self {
        let timestamp = Utc::now();
        Self {
            id: compose_message_id(author.id, timestamp),
            kind,
            content: content.into(),
            user_id: author.id,
            user_name: author.name.clone(),
            timestamp,
            is_pinned: false,
            is_answered: false,
            answered_by: None,
        }
    }
}

/// `sender-millis-random`: collision-free across concurrent senders,
/// and attributable to its author when it shows up in logs.
fn compose_message_id(sender: Uuid, at: DateTime<Utc>) -> String {
    let nonce = Uuid::new_v4().simple().to_string();
    format!(
        "{}-{}-{}",
        sender.simple(),
        at.timestamp_millis(),
        &nonce[..8]
    )
}

/// The session-local chat replica.
#[derive(Debug, Default)]
pub struct ChatLog {
    messages: Vec<ChatMessage>,
}

impl ChatLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message. Returns `false` if the id is already present
    /// (duplicate delivery), leaving the log unchanged.
    pub fn append(&mut self, msg: ChatMessage) -> bool {
        if self.messages.iter().any(|m| m.id == msg.id) {
            log::debug!("Duplicate chat message {} ignored", msg.id);
            return false;
        }
        self.messages.push(msg);
        true
    }

    /// Pin a message. Monotonic: returns the updated message on the
    /// unpinned → pinned transition, `None` when already pinned or the
    /// id is unknown.
    pub fn pin(&mut self, message_id: &str) -> Option<ChatMessage> {
        let msg = self.messages.iter_mut().find(|m| m.id == message_id)?;
        if msg.is_pinned {
            return None;
        }
        msg.is_pinned = true;
        Some(msg.clone())
    }

    /// Mark a message answered. Monotonic, like [`ChatLog::pin`].
    pub fn mark_answered(
        &mut self,
        message_id: &str,
        answered_by: impl Into<String>,
    ) -> Option<ChatMessage> {
        let msg = self.messages.iter_mut().find(|m| m.id == message_id)?;
        if msg.is_answered {
            return None;
        }
        msg.is_answered = true;
        msg.answered_by = Some(answered_by.into());
        Some(msg.clone())
    }

    pub fn get(&self, message_id: &str) -> Option<&ChatMessage> {
        self.messages.iter().find(|m| m.id == message_id)
    }

    /// Messages in arrival order.
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Messages in timestamp order, for rendering. Arrival interleaving
    /// across senders does not matter; the sort makes display stable.
    pub fn sorted_for_display(&self) -> Vec<&ChatMessage> {
        let mut sorted: Vec<&ChatMessage> = self.messages.iter().collect();
        sorted.sort_by_key(|m| m.timestamp);
        sorted
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
