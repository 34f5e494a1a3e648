//! Binary envelope protocol for room interaction events.
//!
//! Every interaction event travels as one bincode-encoded envelope:
//! ```text
//! ┌──────────┬──────────────┬───────────────────────────┐
//! │ sender   │ payload tag  │ kind-specific payload     │
//! │ 16 bytes │ 1 byte       │ variable                  │
//! └──────────┴──────────────┴───────────────────────────┘
//! ```
//!
//! The payload is a closed sum type over the six interaction kinds
//! (reaction, chat, poll, vote, pin, answer), so the dispatch site must
//! match exhaustively — an unhandled kind is a compile error, not a
//! silently dropped message.
//!
//! Decode failures are non-fatal by contract: receivers log and discard
//! a malformed envelope and keep processing the next one.
//!
//! Reference: Kleppmann, Chapter 4 — Encoding and Evolution

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chat::ChatMessage;
use crate::poll::{Poll, VoteRecord};
use crate::reaction::Reaction;

/// Participant identity with display metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParticipantInfo {
    pub id: Uuid,
    pub name: String,
}

impl ParticipantInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
        }
    }

    /// Create with explicit id (for testing)
    pub fn with_id(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// Marks a chat message as pinned. One-way: there is no unpin kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PinMark {
    pub message_id: String,
    pub pinned_by: Uuid,
}

/// Marks a chat question as answered. One-way, like [`PinMark`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnswerMark {
    pub message_id: String,
    pub answered_by: Uuid,
    pub answered_by_name: String,
}

/// The six interaction event kinds carried over the broadcast channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum EventPayload {
    /// Ephemeral reaction (fire-and-forget, expires on display)
    Reaction(Reaction),
    /// Chat message
    Chat(ChatMessage),
    /// Full poll snapshot: creation broadcast or late-join rebroadcast
    Poll(Poll),
    /// One participant's vote on one poll option
    Vote(VoteRecord),
    /// Pin a chat message
    Pin(PinMark),
    /// Mark a chat question answered
    Answer(AnswerMark),
}

impl EventPayload {
    /// Wire kind label, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            EventPayload::Reaction(_) => "reaction",
            EventPayload::Chat(_) => "chat",
            EventPayload::Poll(_) => "poll",
            EventPayload::Vote(_) => "vote",
            EventPayload::Pin(_) => "pin",
            EventPayload::Answer(_) => "answer",
        }
    }
}

/// Top-level wire envelope.
///
/// `sender` duplicates the transport-level sender identity so the
/// self-echo guard works even when the transport loops a sender's own
/// broadcast back to it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    pub sender: Uuid,
    pub payload: EventPayload,
}

impl Envelope {
    pub fn new(sender: Uuid, payload: EventPayload) -> Self {
        Self { sender, payload }
    }

    /// Serialize to binary wire format.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| ProtocolError::Serialization(e.to_string()))
    }

    /// Deserialize from binary wire format.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let (envelope, _) =
            bincode::serde::decode_from_slice(bytes, bincode::config::standard())
                .map_err(|e| ProtocolError::Deserialization(e.to_string()))?;
        Ok(envelope)
    }
}

/// Protocol errors.
#[derive(Debug, Clone)]
pub enum ProtocolError {
    Serialization(String),
    Deserialization(String),
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Serialization(e) => write!(f, "Serialization error: {e}"),
            Self::Deserialization(e) => write!(f, "Deserialization error: {e}"),
        }
    }
}

impl std::error::Error for ProtocolError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ChatKind;
    use crate::poll::Poll;

    #[test]
    fn test_vote_envelope_roundtrip() {
        let sender = Uuid::new_v4();
        let vote = VoteRecord {
            poll_id: Uuid::new_v4(),
            option_id: Uuid::new_v4(),
            voter_id: sender,
            voter_name: "Alice".into(),
        };

        let env = Envelope::new(sender, EventPayload::Vote(vote.clone()));
        let encoded = env.encode().unwrap();
        let decoded = Envelope::decode(&encoded).unwrap();

        assert_eq!(decoded.sender, sender);
        assert_eq!(decoded.payload, EventPayload::Vote(vote));
    }

    #[test]
    fn test_poll_envelope_roundtrip_preserves_option_order() {
        let creator = ParticipantInfo::new("Host");
        let poll = Poll::new(
            "Favorite color?",
            vec!["Red".into(), "Green".into(), "Blue".into()],
            &creator,
            Some(60),
            None,
            true,
        );
        let option_ids: Vec<Uuid> = poll.options.iter().map(|o| o.id).collect();

        let env = Envelope::new(creator.id, EventPayload::Poll(poll));
        let decoded = Envelope::decode(&env.encode().unwrap()).unwrap();

        match decoded.payload {
            EventPayload::Poll(p) => {
                let roundtripped: Vec<Uuid> = p.options.iter().map(|o| o.id).collect();
                assert_eq!(roundtripped, option_ids);
                assert_eq!(p.question, "Favorite color?");
                assert!(p.ends_at.is_some());
            }
            other => panic!("Expected Poll payload, got {other:?}"),
        }
    }

    #[test]
    fn test_chat_envelope_roundtrip() {
        let author = ParticipantInfo::new("Bob");
        let msg = ChatMessage::new(&author, ChatKind::Question, "Why is the sky blue?");

        let env = Envelope::new(author.id, EventPayload::Chat(msg.clone()));
        let decoded = Envelope::decode(&env.encode().unwrap()).unwrap();

        assert_eq!(decoded.payload, EventPayload::Chat(msg));
    }

    #[test]
    fn test_pin_answer_envelope_roundtrip() {
        let sender = Uuid::new_v4();
        let pin = PinMark {
            message_id: "abc-123".into(),
            pinned_by: sender,
        };
        let answer = AnswerMark {
            message_id: "abc-123".into(),
            answered_by: sender,
            answered_by_name: "Host".into(),
        };

        let pin_env = Envelope::decode(
            &Envelope::new(sender, EventPayload::Pin(pin.clone()))
                .encode()
                .unwrap(),
        )
        .unwrap();
        let ans_env = Envelope::decode(
            &Envelope::new(sender, EventPayload::Answer(answer.clone()))
                .encode()
                .unwrap(),
        )
        .unwrap();

        assert_eq!(pin_env.payload, EventPayload::Pin(pin));
        assert_eq!(ans_env.payload, EventPayload::Answer(answer));
    }

    #[test]
    fn test_payload_kind_labels() {
        let sender = Uuid::new_v4();
        let pin = EventPayload::Pin(PinMark {
            message_id: "m".into(),
            pinned_by: sender,
        });
        assert_eq!(pin.kind(), "pin");
    }

    #[test]
    fn test_decode_invalid_bytes() {
        let garbage = vec![0xFF, 0xFE, 0xFD];
        assert!(Envelope::decode(&garbage).is_err());
    }

    #[test]
    fn test_decode_empty_bytes() {
        assert!(Envelope::decode(&[]).is_err());
    }

    #[test]
    fn test_vote_envelope_size_efficient() {
        let sender = Uuid::new_v4();
        let vote = VoteRecord {
            poll_id: Uuid::new_v4(),
            option_id: Uuid::new_v4(),
            voter_id: sender,
            voter_name: "Alice".into(),
        };
        let encoded = Envelope::new(sender, EventPayload::Vote(vote))
            .encode()
            .unwrap();

        // 16 sender + tag + 3×16 uuid + short name — should stay well under 128
        assert!(
            encoded.len() < 128,
            "Encoded vote envelope too large: {} bytes",
            encoded.len()
        );
    }
}
