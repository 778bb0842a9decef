// src/network/session.rs
use std::fmt;
use std::time::Instant;

use tokio::sync::mpsc;

use super::message::RawMessage;
use crate::peers::Endpoint;

pub type PeerId = u32;

/// Per-peer facts recorded by the broadcaster. Each bit is set at most once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Hints(u8);

impl Hints {
    /// We announced the transaction to this peer.
    pub const INV_SENT: Hints = Hints(1 << 0);
    /// We served the transaction to this peer.
    pub const TX_SENT: Hints = Hints(1 << 1);
    /// This peer announced the transaction to us.
    pub const TX_SEEN: Hints = Hints(1 << 2);

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, other: Hints) -> bool {
        self.0 & other.0 == other.0
    }

    /// Sets `other`, returning false if it was already set.
    pub fn insert(&mut self, other: Hints) -> bool {
        let fresh = !self.contains(other);
        self.0 |= other.0;
        fresh
    }
}

impl fmt::Display for Hints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = [
            (Hints::INV_SENT, "inv_sent"),
            (Hints::TX_SENT, "tx_sent"),
            (Hints::TX_SEEN, "tx_seen"),
        ]
        .iter()
        .filter(|(h, _)| self.contains(*h))
        .map(|(_, n)| *n)
        .collect();
        write!(f, "[{}]", names.join(","))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, TCP connect not started yet.
    Idle,
    Connecting,
    /// TCP up, version/verack in progress.
    Handshaking,
    Ready,
    /// Disconnect requested; waiting for the socket task to finish.
    Closing,
}

/// One peer connection as seen from the event loop.
///
/// The socket itself lives in a task; the session holds the sending half of
/// that task's outbound queue. Dropping it closes the connection once queued
/// messages are flushed.
#[derive(Debug)]
pub struct PeerSession {
    id: PeerId,
    endpoint: Endpoint,
    state: SessionState,
    connect_started_at: Option<Instant>,
    hints: Hints,
    outbound: Option<mpsc::UnboundedSender<RawMessage>>,
    misbehaved: bool,
    timed_out: bool,
    last_ping_at: Option<Instant>,
}

impl PeerSession {
    pub fn new(id: PeerId, endpoint: Endpoint, outbound: mpsc::UnboundedSender<RawMessage>) -> Self {
        Self {
            id,
            endpoint,
            state: SessionState::Idle,
            connect_started_at: None,
            hints: Hints::default(),
            outbound: Some(outbound),
            misbehaved: false,
            timed_out: false,
            last_ping_at: None,
        }
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn connect_started_at(&self) -> Option<Instant> {
        self.connect_started_at
    }

    pub fn hints(&self) -> Hints {
        self.hints
    }

    pub fn has_hint(&self, hint: Hints) -> bool {
        self.hints.contains(hint)
    }

    /// Returns false if the hint was already set.
    pub fn set_hint(&mut self, hint: Hints) -> bool {
        self.hints.insert(hint)
    }

    pub fn misbehaved(&self) -> bool {
        self.misbehaved
    }

    /// True until `disconnect` is called.
    pub fn is_live(&self) -> bool {
        self.outbound.is_some()
    }

    /// Queue a message without blocking. Returns false if the session is
    /// closing or the socket task is gone.
    pub fn send(&self, msg: RawMessage) -> bool {
        match &self.outbound {
            Some(tx) => tx.send(msg).is_ok(),
            None => false,
        }
    }

    /// Close the connection after already-queued messages are written.
    /// Calling it again is a no-op.
    pub fn disconnect(&mut self) {
        if self.outbound.take().is_some() {
            tracing::debug!(peer = self.id, addr = %self.endpoint, "disconnecting");
            self.state = SessionState::Closing;
        }
    }

    /// Record a protocol violation; the peer is dropped.
    pub fn misbehave(&mut self) {
        tracing::warn!(peer = self.id, addr = %self.endpoint, "peer misbehaved");
        self.misbehaved = true;
        self.disconnect();
    }

    /// Give up on a peer that never finished connecting. Unlike
    /// [`disconnect`](Self::disconnect), the group replaces it.
    pub(crate) fn connect_timeout(&mut self) {
        self.timed_out = true;
        self.disconnect();
    }

    /// Whether the group should connect another endpoint in its place once
    /// the connection is gone.
    pub(crate) fn wants_replacement(&self) -> bool {
        self.timed_out || self.state != SessionState::Closing
    }

    pub(crate) fn mark_connecting(&mut self, now: Instant) {
        self.connect_started_at = Some(now);
        self.state = SessionState::Connecting;
    }

    pub(crate) fn mark_handshaking(&mut self) {
        if self.is_live() {
            self.state = SessionState::Handshaking;
        }
    }

    pub(crate) fn mark_ready(&mut self) {
        if self.is_live() {
            self.state = SessionState::Ready;
        }
    }

    pub(crate) fn last_ping_at(&self) -> Option<Instant> {
        self.last_ping_at
    }

    pub(crate) fn set_last_ping_at(&mut self, at: Instant) {
        self.last_ping_at = Some(at);
    }
}
