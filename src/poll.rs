//! Poll replica model, vote ledger, and poll lifecycle coordination.
//!
//! Every participant holds its own full replica of the active poll.
//! Consistency comes from the protocol, not from shared memory:
//!
//! ```text
//! local vote ──► VoteLedger::apply ──► new Arc<Poll> snapshot
//!                      ▲                      │
//!                      │                      ▼
//! remote vote ─────────┘              PollChanged event
//!
//! remote poll snapshot ──► PollCoordinator::ingest (adopt or merge)
//! ```
//!
//! The vote ledger is the single idempotency primitive: a vote is
//! applied at most once per `(poll, voter)` no matter how many times
//! the envelope is delivered or in what order.
//!
//! Reference: Kleppmann, Chapter 5 — Replication

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::protocol::ParticipantInfo;

/// One answer option within a poll.
///
/// `voter_ids` is a set: the same participant can never be counted
/// twice, and `vote_count` always equals `voter_ids.len()`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PollOption {
    pub id: Uuid,
    pub text: String,
    pub vote_count: u32,
    pub voter_ids: HashSet<Uuid>,
}

impl PollOption {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            vote_count: 0,
            voter_ids: HashSet::new(),
        }
    }
}

/// A poll replica.
///
/// Created by exactly one participant; every other copy in the room is
/// a replica of that creator's broadcast, reconciled on receipt.
/// Option order is fixed at creation and survives the wire round-trip.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Poll {
    pub id: Uuid,
    pub question: String,
    pub options: Vec<PollOption>,
    pub created_by: Uuid,
    pub created_by_name: String,
    pub created_at: DateTime<Utc>,
    /// Absolute deadline; `None` means untimed.
    pub ends_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    /// Derived: always the sum of all option vote counts.
    pub total_votes: u32,
    /// Correct option id, present only for quiz-mode polls.
    pub correct_answer: Option<Uuid>,
    /// Whether results are visible before the viewer has voted.
    pub show_results: bool,
}

impl Poll {
    /// Build a new active poll owned by `creator`.
    ///
    /// `correct_answer_index` selects a quiz answer among `options`
    /// (out-of-range indexes are ignored).
    pub fn new(
        question: impl Into<String>,
        options: Vec<String>,
        creator: &ParticipantInfo,
        duration_secs: Option<i64>,
        correct_answer_index: Option<usize>,
        show_results: bool,
    ) -> Self {
        let created_at = Utc::now();
        let options: Vec<PollOption> = options.into_iter().map(PollOption::new).collect();
        let correct_answer = correct_answer_index
            .and_then(|i| options.get(i))
            .map(|o| o.id);

        Self {
            id: Uuid::new_v4(),
            question: question.into(),
            options,
            created_by: creator.id,
            created_by_name: creator.name.clone(),
            created_at,
            ends_at: duration_secs.map(|secs| created_at + Duration::seconds(secs)),
            is_active: true,
            total_votes: 0,
            correct_answer,
            show_results,
        }
    }

    /// Look up an option by id.
    pub fn option(&self, option_id: &Uuid) -> Option<&PollOption> {
        self.options.iter().find(|o| o.id == *option_id)
    }

    /// Which option, if any, this voter is already counted in.
    pub fn voter_option(&self, voter_id: &Uuid) -> Option<Uuid> {
        self.options
            .iter()
            .find(|o| o.voter_ids.contains(voter_id))
            .map(|o| o.id)
    }

    /// Whether the deadline has passed. Untimed polls never end this way.
    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        self.ends_at.map(|ends| now > ends).unwrap_or(false)
    }

    /// Active and not past its deadline.
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        self.is_active && !self.has_ended(now)
    }

    /// Check the replica invariants: counts match voter sets, the total
    /// is the sum of the options, and no voter appears twice.
    pub fn invariants_hold(&self) -> bool {
        let mut seen: HashSet<Uuid> = HashSet::new();
        let mut sum = 0u32;
        for opt in &self.options {
            if opt.vote_count as usize != opt.voter_ids.len() {
                return false;
            }
            sum += opt.vote_count;
            for voter in &opt.voter_ids {
                if !seen.insert(*voter) {
                    return false;
                }
            }
        }
        sum == self.total_votes
    }
}

/// One participant's vote on one poll option.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VoteRecord {
    pub poll_id: Uuid,
    pub option_id: Uuid,
    pub voter_id: Uuid,
    pub voter_name: String,
}

/// Result of applying a vote to a poll replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteOutcome {
    /// Vote counted; a new poll snapshot was produced.
    Applied,
    /// Voter already counted in some option; replica unchanged.
    Duplicate,
    /// Target option id not on this replica (stale copy); dropped.
    UnknownOption,
    /// Vote references a poll this replica is not tracking; dropped.
    UnknownPoll,
    /// Poll is closed or past its deadline; vote rejected.
    PollClosed,
}

/// At-most-once vote application per `(poll, voter)`.
///
/// Stateless: all state lives in the poll snapshot itself, so the same
/// check covers network duplicates, self-echo, and out-of-order
/// delivery uniformly.
pub struct VoteLedger;

impl VoteLedger {
    /// Apply `vote` to `poll`, returning the resulting snapshot.
    ///
    /// A new `Arc` is allocated only when state actually changed;
    /// on every non-applied outcome the original snapshot is returned,
    /// so observers can rely on pointer identity.
    pub fn apply(poll: &Arc<Poll>, vote: &VoteRecord) -> (Arc<Poll>, VoteOutcome) {
        if vote.poll_id != poll.id {
            log::warn!(
                "Dropping vote for untracked poll {} (tracking {})",
                vote.poll_id,
                poll.id
            );
            return (poll.clone(), VoteOutcome::UnknownPoll);
        }

        if poll.voter_option(&vote.voter_id).is_some() {
            log::debug!("Duplicate vote from {} on poll {}", vote.voter_id, poll.id);
            return (poll.clone(), VoteOutcome::Duplicate);
        }

        let Some(idx) = poll.options.iter().position(|o| o.id == vote.option_id) else {
            // Stale replica relative to the sender. Not queued or retried:
            // poll state converges via the coordinator's full-snapshot
            // rebroadcast, not per-vote buffering.
            log::warn!(
                "Dropping unresolvable vote: option {} not on poll {}",
                vote.option_id,
                poll.id
            );
            return (poll.clone(), VoteOutcome::UnknownOption);
        };

        let mut next = Poll::clone(poll);
        next.options[idx].voter_ids.insert(vote.voter_id);
        next.options[idx].vote_count += 1;
        next.total_votes += 1;
        debug_assert!(next.invariants_hold());

        (Arc::new(next), VoteOutcome::Applied)
    }
}

/// Owns the single active-poll state machine: Absent → Active → Closed.
///
/// A new poll id supersedes the currently tracked poll. A snapshot for
/// the *same* id is merged, not replaced, so locally-known votes the
/// incoming copy hasn't seen yet are preserved.
pub struct PollCoordinator {
    local_id: Uuid,
    active: Option<Arc<Poll>>,
}

impl PollCoordinator {
    pub fn new(local_id: Uuid) -> Self {
        Self {
            local_id,
            active: None,
        }
    }

    /// Currently tracked poll snapshot.
    pub fn active_poll(&self) -> Option<&Arc<Poll>> {
        self.active.as_ref()
    }

    /// Adopt a locally created poll as the active one.
    pub fn adopt_local(&mut self, poll: Poll) -> Arc<Poll> {
        log::info!("Created poll {} ({:?})", poll.id, poll.question);
        let snapshot = Arc::new(poll);
        self.active = Some(snapshot.clone());
        snapshot
    }

    /// Ingest a remote poll snapshot.
    ///
    /// Unknown id → adopt verbatim (Absent → Active, or supersede the
    /// prior poll). Same id → reconciliation merge: the incoming copy's
    /// static fields win, vote tallies are re-derived from the union of
    /// both replicas' voters. When the merge changes nothing (duplicate
    /// delivery, late-join rebroadcast already seen) the existing `Arc`
    /// is returned, preserving pointer-identity semantics for observers.
    pub fn ingest(&mut self, incoming: Poll) -> Arc<Poll> {
        let snapshot = match self.active.take() {
            Some(current) if current.id == incoming.id => {
                let merged = Self::merge(&current, incoming);
                if merged == *current {
                    current
                } else {
                    Arc::new(merged)
                }
            }
            Some(current) => {
                log::info!("Poll {} supersedes {}", incoming.id, current.id);
                Arc::new(incoming)
            }
            None => {
                log::info!("Adopting poll {}", incoming.id);
                Arc::new(incoming)
            }
        };
        self.active = Some(snapshot.clone());
        snapshot
    }

    /// Apply a vote to the active poll, replacing the snapshot on success.
    ///
    /// The current time is checked against the deadline here, on every
    /// vote attempt: a closed or ended poll is terminal and rejects
    /// votes on all replicas, local and remote alike.
    pub fn apply_vote(&mut self, vote: &VoteRecord) -> VoteOutcome {
        let Some(current) = &self.active else {
            log::warn!("Dropping vote for poll {}: no poll tracked", vote.poll_id);
            return VoteOutcome::UnknownPoll;
        };

        if !current.is_open(Utc::now()) {
            log::debug!(
                "Rejecting vote from {} on poll {}: poll closed",
                vote.voter_id,
                current.id
            );
            return VoteOutcome::PollClosed;
        }

        let (snapshot, outcome) = VoteLedger::apply(current, vote);
        if outcome == VoteOutcome::Applied {
            self.active = Some(snapshot);
        }
        outcome
    }

    /// Close the active poll locally. Advisory display state, never
    /// rebroadcast: peers derive "ended" from the shared `ends_at`.
    pub fn close(&mut self) -> Option<Arc<Poll>> {
        let current = self.active.as_ref()?;
        if !current.is_active {
            return Some(current.clone());
        }
        let mut closed = Poll::clone(current);
        closed.is_active = false;
        let snapshot = Arc::new(closed);
        self.active = Some(snapshot.clone());
        Some(snapshot)
    }

    /// Snapshot to push to a newly joined participant, if the local
    /// participant created the currently open poll. Best-effort push —
    /// the protocol deliberately has no query/request kind.
    pub fn snapshot_for_new_participant(&self, now: DateTime<Utc>) -> Option<Arc<Poll>> {
        let current = self.active.as_ref()?;
        if current.created_by == self.local_id && current.is_open(now) {
            Some(current.clone())
        } else {
            None
        }
    }

    /// Last-write-wins for static fields, additive union for voters.
    ///
    /// Voters are placed in option order; a voter appearing in
    /// different options across the two replicas lands in the earlier
    /// option, keeping the one-vote invariant deterministic everywhere.
    fn merge(local: &Poll, incoming: Poll) -> Poll {
        let mut merged = incoming;
        let mut placed: HashSet<Uuid> = HashSet::new();
        let mut total = 0u32;

        for opt in merged.options.iter_mut() {
            let mut union: HashSet<Uuid> = opt.voter_ids.iter().copied().collect();
            if let Some(local_opt) = local.options.iter().find(|o| o.id == opt.id) {
                union.extend(local_opt.voter_ids.iter().copied());
            }

            opt.voter_ids = union
                .into_iter()
                .filter(|voter| placed.insert(*voter))
                .collect();
            opt.vote_count = opt.voter_ids.len() as u32;
            total += opt.vote_count;
        }
        merged.total_votes = total;

        // A locally closed poll stays closed.
        merged.is_active = merged.is_active && local.is_active;

        debug_assert!(merged.invariants_hold());
        merged
    }
}
