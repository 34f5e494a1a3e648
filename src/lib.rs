//! # roomsync — peer-to-peer interaction layer for live rooms
//!
//! Synchronizes polls, chat, reactions, and pin/answer marks across the
//! participants of a real-time audio/video room — with no central
//! server authority. Each participant holds a full local replica;
//! consistency comes from an envelope protocol over the room's
//! unreliable broadcast channel (at-least-once, ordered per sender
//! only), not from shared state.
//!
//! ## Architecture
//!
//! ```text
//!  UI action                                UI action
//!     │                                        │
//!     ▼                                        ▼
//! ┌───────────────────┐   broadcast    ┌───────────────────┐
//! │ InteractionSession│ ◄────────────► │ InteractionSession│
//! │  (participant A)  │   envelopes    │  (participant B)  │
//! ├───────────────────┤                ├───────────────────┤
//! │ PollCoordinator   │                │ PollCoordinator   │
//! │  └─ VoteLedger    │                │  └─ VoteLedger    │
//! │ ChatLog           │                │ ChatLog           │
//! │ ReactionStream    │                │ ReactionStream    │
//! └───────────────────┘                └───────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] — bincode envelope codec over a closed event sum type
//! - [`poll`] — poll replica model, idempotent vote ledger, lifecycle
//!   coordinator with merge-on-receipt and late-join rebroadcast
//! - [`chat`] — chat log with monotonic pin/answered annotations
//! - [`reaction`] — ephemeral reactions with local TTL expiry
//! - [`transport`] — broadcast seam + in-process fan-out hub
//! - [`session`] — per-participant orchestrator (action + event API)
//!
//! ## Consistency guarantees
//!
//! - A vote counts at most once per `(poll, voter)`, regardless of
//!   duplicate, reordered, or self-echoed delivery.
//! - `total_votes` always equals the sum of per-option counts.
//! - A late joiner converges after the poll creator's proactive
//!   snapshot rebroadcast.
//! - A malformed envelope from any peer is logged and dropped; it can
//!   never tear down the session.

pub mod chat;
pub mod poll;
pub mod protocol;
pub mod reaction;
pub mod session;
pub mod transport;

// Re-exports for convenience
pub use chat::{ChatKind, ChatLog, ChatMessage};
pub use poll::{Poll, PollCoordinator, PollOption, VoteLedger, VoteOutcome, VoteRecord};
pub use protocol::{AnswerMark, Envelope, EventPayload, ParticipantInfo, PinMark, ProtocolError};
pub use reaction::{Reaction, ReactionStream};
pub use session::{InteractionSession, SessionConfig, SessionEvent, SessionStats};
pub use transport::{Frame, HubLink, HubStats, NullTransport, RoomHub, RoomTransport};
