//! Ephemeral reaction stream.
//!
//! Reactions are fire-and-forget: no durability, no retraction. Every
//! receiver drops a reaction from local memory after a fixed display
//! TTL measured from its own receipt time — a memory-bound policy, not
//! a network-visible event. The only dedup is display-level, by id.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::protocol::ParticipantInfo;

/// One reaction event (emoji burst, raised hand, ...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reaction {
    pub id: Uuid,
    /// Reaction kind label chosen by the UI, e.g. "👏" or "raise-hand".
    pub kind: String,
    pub user_id: Uuid,
    pub user_name: String,
    pub created_at: DateTime<Utc>,
}

impl Reaction {
    pub fn new(author: &ParticipantInfo, kind: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: kind.into(),
            user_id: author.id,
            user_name: author.name.clone(),
            created_at: Utc::now(),
        }
    }
}

/// Session-local buffer of currently visible reactions.
pub struct ReactionStream {
    entries: Vec<(Reaction, Instant)>,
    ttl: Duration,
}

impl ReactionStream {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Vec::new(),
            ttl,
        }
    }

    /// Add a reaction. Returns `false` for a duplicate id.
    pub fn add(&mut self, reaction: Reaction) -> bool {
        if self.entries.iter().any(|(r, _)| r.id == reaction.id) {
            return false;
        }
        self.entries.push((reaction, Instant::now()));
        true
    }

    /// Drop entries older than the TTL. Returns how many were removed.
    pub fn prune_expired(&mut self) -> usize {
        let ttl = self.ttl;
        let before = self.entries.len();
        self.entries.retain(|(_, received)| received.elapsed() < ttl);
        before - self.entries.len()
    }

    /// Currently visible reactions, pruning expired ones first.
    pub fn visible(&mut self) -> Vec<&Reaction> {
        self.prune_expired();
        self.entries.iter().map(|(r, _)| r).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_add_and_duplicate() {
        let author = ParticipantInfo::new("Alice");
        let reaction = Reaction::new(&author, "👏");
        let mut stream = ReactionStream::new(Duration::from_secs(5));

        assert!(stream.add(reaction.clone()));
        assert!(!stream.add(reaction));
        assert_eq!(stream.len(), 1);
    }

    #[test]
    fn test_prune_after_ttl() {
        let author = ParticipantInfo::new("Alice");
        let mut stream = ReactionStream::new(Duration::from_millis(10));

        stream.add(Reaction::new(&author, "🎉"));
        assert_eq!(stream.visible().len(), 1);

        thread::sleep(Duration::from_millis(20));
        assert_eq!(stream.prune_expired(), 1);
        assert!(stream.is_empty());
    }

    #[test]
    fn test_fresh_entries_survive_prune() {
        let author = ParticipantInfo::new("Alice");
        let mut stream = ReactionStream::new(Duration::from_secs(60));

        stream.add(Reaction::new(&author, "👍"));
        stream.add(Reaction::new(&author, "👎"));
        assert_eq!(stream.prune_expired(), 0);
        assert_eq!(stream.visible().len(), 2);
    }
}
