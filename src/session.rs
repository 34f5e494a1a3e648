//! Interaction session: the per-participant orchestrator.
//!
//! Wires the broadcast transport to the poll coordinator, chat log, and
//! reaction stream, and exposes the action/event API the UI consumes.
//!
//! ```text
//! UI action ──► InteractionSession
//!                 │  1. apply to local state   (self always sees it)
//!                 │  2. broadcast the envelope (best effort)
//!                 ▼
//!             remote peers ──► handle_incoming
//!                 │  decode → discard own sender → exhaustive dispatch
//!                 ▼
//!             SessionEvent channel ──► UI re-render
//! ```
//!
//! Local-apply-then-broadcast is the self-echo discipline: the sender's
//! state is updated before the envelope leaves the process, the receive
//! path discards envelopes carrying the local sender id, and the vote
//! ledger's idempotency makes even a leaked echo a no-op. All handlers
//! are synchronous and never block, so the receive loop cannot stall no
//! matter how many peers broadcast concurrently.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::chat::{ChatKind, ChatLog, ChatMessage};
use crate::poll::{Poll, PollCoordinator, VoteOutcome, VoteRecord};
use crate::protocol::{AnswerMark, Envelope, EventPayload, ParticipantInfo, PinMark};
use crate::reaction::{Reaction, ReactionStream};
use crate::transport::RoomTransport;

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long a reaction stays visible before local expiry.
    pub reaction_ttl: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reaction_ttl: Duration::from_secs(5),
        }
    }
}

/// Change notifications for UI consumers.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The active poll snapshot changed (created, voted, merged, closed)
    PollChanged(Arc<Poll>),
    /// A chat message was added
    ChatAdded(ChatMessage),
    /// A chat message was annotated (pinned or answered)
    ChatUpdated(ChatMessage),
    /// A reaction arrived
    ReactionAdded(Reaction),
}

/// Counters for observing what the receive path absorbed.
///
/// Unresolvable and duplicate drops are silent for tallies by design;
/// these counters are how tests (and dashboards) see them happen.
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    pub votes_applied: u64,
    pub votes_duplicate: u64,
    pub votes_unresolvable: u64,
    pub votes_rejected_closed: u64,
    pub decode_errors: u64,
    pub echo_frames_ignored: u64,
}

/// Per-participant interaction session.
///
/// Owns this participant's full replica of the room's interaction
/// state. No shared mutable memory exists between participants —
/// consistency comes only from the envelope protocol.
pub struct InteractionSession {
    local: ParticipantInfo,
    transport: Arc<dyn RoomTransport>,
    coordinator: PollCoordinator,
    chat: ChatLog,
    reactions: ReactionStream,
    stats: SessionStats,
    event_tx: mpsc::UnboundedSender<SessionEvent>,
    event_rx: Option<mpsc::UnboundedReceiver<SessionEvent>>,
}

impl InteractionSession {
    pub fn new(
        local: ParticipantInfo,
        transport: Arc<dyn RoomTransport>,
        config: SessionConfig,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Self {
            coordinator: PollCoordinator::new(local.id),
            reactions: ReactionStream::new(config.reaction_ttl),
            chat: ChatLog::new(),
            stats: SessionStats::default(),
            local,
            transport,
            event_tx,
            event_rx: Some(event_rx),
        }
    }

    /// Take the event receiver (can only be called once).
    pub fn take_event_rx(&mut self) -> Option<mpsc::UnboundedReceiver<SessionEvent>> {
        self.event_rx.take()
    }

    // ── Action API (UI-facing) ───────────────────────────────────

    /// Create a poll owned by this participant and broadcast it.
    pub fn create_poll(
        &mut self,
        question: impl Into<String>,
        options: Vec<String>,
        duration_secs: Option<i64>,
        correct_answer_index: Option<usize>,
        show_results: bool,
    ) -> Arc<Poll> {
        let poll = Poll::new(
            question,
            options,
            &self.local,
            duration_secs,
            correct_answer_index,
            show_results,
        );
        let snapshot = self.coordinator.adopt_local(poll);
        self.emit(SessionEvent::PollChanged(snapshot.clone()));
        self.send(EventPayload::Poll(Poll::clone(&snapshot)));
        snapshot
    }

    /// Vote on the active poll.
    ///
    /// Applied locally first, so this participant's UI updates even if
    /// the broadcast never leaves the machine. The envelope is only
    /// sent when the vote actually counted.
    pub fn vote(&mut self, poll_id: Uuid, option_id: Uuid) -> VoteOutcome {
        let vote = VoteRecord {
            poll_id,
            option_id,
            voter_id: self.local.id,
            voter_name: self.local.name.clone(),
        };
        let outcome = self.apply_vote_locally(&vote);
        if outcome == VoteOutcome::Applied {
            self.send(EventPayload::Vote(vote));
        }
        outcome
    }

    /// Send a chat message.
    pub fn send_chat(&mut self, kind: ChatKind, content: impl Into<String>) -> ChatMessage {
        let msg = ChatMessage::new(&self.local, kind, content);
        self.chat.append(msg.clone());
        self.emit(SessionEvent::ChatAdded(msg.clone()));
        self.send(EventPayload::Chat(msg.clone()));
        msg
    }

    /// Send a reaction.
    pub fn react(&mut self, kind: impl Into<String>) -> Reaction {
        let reaction = Reaction::new(&self.local, kind);
        self.reactions.add(reaction.clone());
        self.emit(SessionEvent::ReactionAdded(reaction.clone()));
        self.send(EventPayload::Reaction(reaction.clone()));
        reaction
    }

    /// Pin a chat message. Moderator gating is the caller's concern;
    /// the protocol itself is permissive.
    pub fn pin(&mut self, message_id: &str) -> bool {
        let Some(updated) = self.chat.pin(message_id) else {
            return false;
        };
        self.emit(SessionEvent::ChatUpdated(updated));
        self.send(EventPayload::Pin(PinMark {
            message_id: message_id.to_string(),
            pinned_by: self.local.id,
        }));
        true
    }

    /// Mark a chat question as answered by this participant.
    pub fn mark_answered(&mut self, message_id: &str) -> bool {
        let Some(updated) = self.chat.mark_answered(message_id, self.local.name.as_str()) else {
            return false;
        };
        self.emit(SessionEvent::ChatUpdated(updated));
        self.send(EventPayload::Answer(AnswerMark {
            message_id: message_id.to_string(),
            answered_by: self.local.id,
            answered_by_name: self.local.name.clone(),
        }));
        true
    }

    /// Close the active poll. Local display state only, not rebroadcast:
    /// each peer derives "ended" from the shared deadline.
    pub fn close_poll(&mut self) -> Option<Arc<Poll>> {
        let snapshot = self.coordinator.close()?;
        self.emit(SessionEvent::PollChanged(snapshot.clone()));
        Some(snapshot)
    }

    // ── Inbound (transport-facing) ───────────────────────────────

    /// Process one incoming payload from the broadcast channel.
    ///
    /// Synchronous and non-blocking. Every failure path is drop-and-
    /// continue: nothing here may tear down the receive loop.
    pub fn handle_incoming(&mut self, bytes: &[u8], sender: Uuid) {
        if sender == self.local.id {
            // Transport looped our own broadcast back; already applied.
            self.stats.echo_frames_ignored += 1;
            return;
        }

        let envelope = match Envelope::decode(bytes) {
            Ok(env) => env,
            Err(err) => {
                self.stats.decode_errors += 1;
                log::warn!("Discarding malformed envelope from {sender}: {err}");
                return;
            }
        };

        if envelope.sender == self.local.id {
            self.stats.echo_frames_ignored += 1;
            return;
        }

        match envelope.payload {
            EventPayload::Poll(poll) => {
                let before = self.coordinator.active_poll().cloned();
                let snapshot = self.coordinator.ingest(poll);
                // Duplicate snapshot delivery changes nothing; don't re-render
                let unchanged = before
                    .as_ref()
                    .map(|prev| Arc::ptr_eq(prev, &snapshot))
                    .unwrap_or(false);
                if !unchanged {
                    self.emit(SessionEvent::PollChanged(snapshot));
                }
            }
            EventPayload::Vote(vote) => {
                self.apply_vote_locally(&vote);
            }
            EventPayload::Chat(msg) => {
                if self.chat.append(msg.clone()) {
                    self.emit(SessionEvent::ChatAdded(msg));
                }
            }
            EventPayload::Reaction(reaction) => {
                if self.reactions.add(reaction.clone()) {
                    self.emit(SessionEvent::ReactionAdded(reaction));
                }
            }
            EventPayload::Pin(mark) => {
                if let Some(updated) = self.chat.pin(&mark.message_id) {
                    self.emit(SessionEvent::ChatUpdated(updated));
                }
            }
            EventPayload::Answer(mark) => {
                if let Some(updated) =
                    self.chat.mark_answered(&mark.message_id, mark.answered_by_name)
                {
                    self.emit(SessionEvent::ChatUpdated(updated));
                }
            }
        }
    }

    /// React to a participant joining the room.
    ///
    /// If this participant created the currently open poll, push the
    /// full snapshot so the joiner's replica catches up on a poll whose
    /// creation broadcast it missed.
    pub fn handle_participant_joined(&mut self, joined: Uuid) {
        if let Some(snapshot) = self.coordinator.snapshot_for_new_participant(Utc::now()) {
            log::info!("Rebroadcasting poll {} for late joiner {joined}", snapshot.id);
            self.send(EventPayload::Poll(Poll::clone(&snapshot)));
        }
    }

    // ── Accessors ────────────────────────────────────────────────

    pub fn local(&self) -> &ParticipantInfo {
        &self.local
    }

    pub fn active_poll(&self) -> Option<Arc<Poll>> {
        self.coordinator.active_poll().cloned()
    }

    pub fn chat(&self) -> &ChatLog {
        &self.chat
    }

    /// Currently visible reactions, with expired ones pruned.
    pub fn visible_reactions(&mut self) -> Vec<Reaction> {
        self.reactions.visible().into_iter().cloned().collect()
    }

    pub fn stats(&self) -> SessionStats {
        self.stats.clone()
    }

    // ── Internals ────────────────────────────────────────────────

    fn apply_vote_locally(&mut self, vote: &VoteRecord) -> VoteOutcome {
        let outcome = self.coordinator.apply_vote(vote);
        match outcome {
            VoteOutcome::Applied => {
                self.stats.votes_applied += 1;
                if let Some(snapshot) = self.coordinator.active_poll() {
                    let snapshot = snapshot.clone();
                    self.emit(SessionEvent::PollChanged(snapshot));
                }
            }
            VoteOutcome::Duplicate => self.stats.votes_duplicate += 1,
            VoteOutcome::UnknownOption | VoteOutcome::UnknownPoll => {
                self.stats.votes_unresolvable += 1;
            }
            VoteOutcome::PollClosed => self.stats.votes_rejected_closed += 1,
        }
        outcome
    }

    fn send(&self, payload: EventPayload) {
        let kind = payload.kind();
        let envelope = Envelope::new(self.local.id, payload);
        match envelope.encode() {
            Ok(bytes) => self.transport.broadcast(bytes),
            Err(err) => log::warn!("Failed to encode {kind} envelope: {err}"),
        }
    }

    fn emit(&self, event: SessionEvent) {
        // Receiver may be gone (headless use)
        let _ = self.event_tx.send(event);
    }
}
