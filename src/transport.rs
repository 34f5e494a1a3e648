//! Broadcast transport seam and in-process fan-out hub.
//!
//! The real transport is the surrounding conferencing SDK's data
//! channel — out of scope here. The session only needs one outbound
//! capability, [`RoomTransport::broadcast`]; inbound payloads and join
//! notifications are pushed into the session by the embedding layer.
//!
//! [`RoomHub`] is the in-process stand-in: per-peer inboxes with a
//! participant registry. Delivery is pull-based (`drain`), so tests can
//! reorder, duplicate, delay, or drop frames deliberately — exactly the
//! failure modes the protocol must absorb. Optional loopback redelivers
//! a sender's own frames to exercise self-echo suppression.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use uuid::Uuid;

/// Best-effort broadcast to all current room participants.
///
/// May silently drop when disconnected; the protocol tolerates loss via
/// idempotent application and full-snapshot rebroadcast.
pub trait RoomTransport: Send + Sync {
    fn broadcast(&self, bytes: Vec<u8>);
}

/// Transport that drops everything: a disconnected room.
pub struct NullTransport;

impl RoomTransport for NullTransport {
    fn broadcast(&self, _bytes: Vec<u8>) {}
}

/// One payload with its transport-level sender identity.
#[derive(Debug, Clone)]
pub struct Frame {
    pub sender: Uuid,
    pub bytes: Vec<u8>,
}

/// Statistics for monitoring hub health.
#[derive(Debug, Clone, Default)]
pub struct HubStats {
    pub frames_sent: u64,
    pub frames_dropped: u64,
    pub active_peers: usize,
}

struct HubInner {
    inboxes: HashMap<Uuid, VecDeque<Frame>>,
    frames_sent: u64,
    frames_dropped: u64,
}

/// In-process broadcast hub for one room.
pub struct RoomHub {
    inner: Arc<Mutex<HubInner>>,
    capacity: usize,
    loopback: bool,
}

impl RoomHub {
    /// Create a hub. `capacity` bounds each peer's inbox; frames beyond
    /// it are dropped (lagging-peer backpressure).
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HubInner {
                inboxes: HashMap::new(),
                frames_sent: 0,
                frames_dropped: 0,
            })),
            capacity,
            loopback: false,
        }
    }

    /// Create a hub that also redelivers each sender's own frames.
    pub fn with_loopback(capacity: usize) -> Self {
        let mut hub = Self::new(capacity);
        hub.loopback = true;
        hub
    }

    /// Register a peer. Returns the peer's broadcast handle.
    pub fn join(&self, peer: Uuid) -> HubLink {
        self.lock().inboxes.entry(peer).or_default();
        HubLink {
            inner: self.inner.clone(),
            peer,
            capacity: self.capacity,
            loopback: self.loopback,
        }
    }

    /// Remove a peer and its pending frames.
    pub fn leave(&self, peer: &Uuid) {
        self.lock().inboxes.remove(peer);
    }

    /// Take all frames currently pending for `peer`.
    pub fn drain(&self, peer: &Uuid) -> Vec<Frame> {
        self.lock()
            .inboxes
            .get_mut(peer)
            .map(|inbox| inbox.drain(..).collect())
            .unwrap_or_default()
    }

    pub fn peer_count(&self) -> usize {
        self.lock().inboxes.len()
    }

    pub fn stats(&self) -> HubStats {
        let inner = self.lock();
        HubStats {
            frames_sent: inner.frames_sent,
            frames_dropped: inner.frames_dropped,
            active_peers: inner.inboxes.len(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HubInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// A single peer's handle onto a [`RoomHub`].
#[derive(Clone)]
pub struct HubLink {
    inner: Arc<Mutex<HubInner>>,
    peer: Uuid,
    capacity: usize,
    loopback: bool,
}

impl HubLink {
    pub fn peer(&self) -> Uuid {
        self.peer
    }
}

impl RoomTransport for HubLink {
    fn broadcast(&self, bytes: Vec<u8>) {
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        inner.frames_sent += 1;

        let mut dropped = 0u64;
        let sender = self.peer;
        for (id, inbox) in inner.inboxes.iter_mut() {
            if *id == sender && !self.loopback {
                continue;
            }
            if inbox.len() >= self.capacity {
                dropped += 1;
                continue;
            }
            inbox.push_back(Frame {
                sender,
                bytes: bytes.clone(),
            });
        }
        inner.frames_dropped += dropped;
    }
}
