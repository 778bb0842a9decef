// src/network/group.rs
// A small group of outbound peer connections driven by one event loop.

use std::collections::{BTreeMap, VecDeque};
use std::future::Future;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use futures::{SinkExt, StreamExt};
use rand::RngCore;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::codec::Framed;

use super::codec::MessageCodec;
use super::handshake;
use super::message::{ping_message, pong_for, RawMessage, VersionMessage, CMD_PING};
use super::session::{PeerId, PeerSession, SessionState};
use crate::peers::Endpoint;

/// Callbacks invoked by [`PeerGroup::run`]. All of them run on the loop
/// task, one at a time, so implementations need no locking.
pub trait GroupHandler {
    /// The version/verack exchange with `peer` finished.
    fn on_handshake_done(&mut self, peer: &mut PeerSession);

    /// A message arrived from a peer that completed its handshake.
    fn on_message(&mut self, peer: &mut PeerSession, msg: &RawMessage);

    /// Periodic timer for a live peer. Returning true lets the group run its
    /// own housekeeping (pings, connect timeout) for that peer afterwards.
    fn on_tick(&mut self, peer: &mut PeerSession, now: Instant) -> bool;
}

#[derive(Debug, Clone)]
pub struct GroupConfig {
    pub magic: [u8; 4],
    /// Connections kept open (or opening) at the same time.
    pub desired_connections: usize,
    pub tick_interval: Duration,
    /// Give up on peers that have not completed the handshake by then.
    pub connect_timeout: Duration,
    pub ping_interval: Duration,
}

#[derive(Debug)]
enum PeerEvent {
    Connected { id: PeerId },
    HandshakeDone { id: PeerId, version: VersionMessage },
    Message { id: PeerId, msg: RawMessage },
    Closed { id: PeerId, reason: Option<String> },
}

/// Owns every peer session of one run.
pub struct PeerGroup {
    config: GroupConfig,
    pending: VecDeque<Endpoint>,
    sessions: BTreeMap<PeerId, PeerSession>,
    next_id: PeerId,
    events_tx: mpsc::UnboundedSender<PeerEvent>,
    events_rx: mpsc::UnboundedReceiver<PeerEvent>,
}

impl PeerGroup {
    pub fn new(config: GroupConfig) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            config,
            pending: VecDeque::new(),
            sessions: BTreeMap::new(),
            next_id: 1,
            events_tx,
            events_rx,
        }
    }

    pub fn add_endpoint(&mut self, endpoint: Endpoint) {
        self.pending.push_back(endpoint);
    }

    /// Start connections until the desired number is open or no endpoint is
    /// left. Returns how many were started.
    pub fn connect_next_nodes(&mut self) -> usize {
        let mut started = 0;
        while self.sessions.len() < self.config.desired_connections {
            let Some(endpoint) = self.pending.pop_front() else { break };
            self.spawn_session(endpoint);
            started += 1;
        }
        started
    }

    fn spawn_session(&mut self, endpoint: Endpoint) {
        let id = self.next_id;
        self.next_id += 1;

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let mut session = PeerSession::new(id, endpoint.clone(), out_tx);
        session.mark_connecting(Instant::now());
        tracing::debug!(peer = id, addr = %endpoint, "connecting");

        tokio::spawn(run_peer(id, endpoint, self.config.magic, out_rx, self.events_tx.clone()));
        self.sessions.insert(id, session);
    }

    /// Run until every session has closed. Endpoints left over when the
    /// last session goes away are never tried. Once `shutdown` resolves all
    /// sessions are disconnected.
    pub async fn run_until<H, F>(&mut self, handler: &mut H, shutdown: F)
    where
        H: GroupHandler,
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut stopping = false;

        self.connect_next_nodes();
        let mut ticker = tokio::time::interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !self.sessions.is_empty() {
            tokio::select! {
                Some(event) = self.events_rx.recv() => self.dispatch(handler, event),
                _ = ticker.tick() => self.tick(handler, Instant::now()),
                _ = &mut shutdown, if !stopping => {
                    tracing::info!("shutdown requested, disconnecting peers");
                    stopping = true;
                    self.pending.clear();
                    for session in self.sessions.values_mut() {
                        session.disconnect();
                    }
                }
            }
        }
    }

    fn dispatch<H: GroupHandler>(&mut self, handler: &mut H, event: PeerEvent) {
        match event {
            PeerEvent::Connected { id } => {
                if let Some(session) = self.sessions.get_mut(&id) {
                    tracing::debug!(peer = id, addr = %session.endpoint(), "tcp connected");
                    session.mark_handshaking();
                }
            }
            PeerEvent::HandshakeDone { id, version } => {
                let Some(session) = self.sessions.get_mut(&id) else { return };
                tracing::debug!(
                    peer = id,
                    version = version.version,
                    user_agent = %version.user_agent,
                    start_height = version.start_height,
                    "handshake done"
                );
                session.mark_ready();
                if session.is_live() {
                    handler.on_handshake_done(session);
                }
            }
            PeerEvent::Message { id, msg } => {
                let Some(session) = self.sessions.get_mut(&id) else { return };
                if session.state() == SessionState::Ready {
                    tracing::trace!(peer = id, command = %msg.command, len = msg.payload.len(), "received");
                    handler.on_message(session, &msg);
                }
            }
            PeerEvent::Closed { id, reason } => {
                let Some(session) = self.sessions.remove(&id) else { return };
                match reason {
                    Some(reason) => {
                        tracing::info!(peer = id, addr = %session.endpoint(), %reason, "peer connection closed")
                    }
                    None => tracing::debug!(peer = id, addr = %session.endpoint(), "peer disconnected"),
                }
                // only peers lost to errors are replaced; our own disconnects are final
                if session.wants_replacement() {
                    self.connect_next_nodes();
                }
            }
        }
    }

    fn tick<H: GroupHandler>(&mut self, handler: &mut H, now: Instant) {
        for session in self.sessions.values_mut() {
            if !session.is_live() {
                continue;
            }
            if handler.on_tick(session, now) && session.is_live() {
                Self::housekeeping(&self.config, session, now);
            }
        }
    }

    fn housekeeping(config: &GroupConfig, session: &mut PeerSession, now: Instant) {
        let Some(started) = session.connect_started_at() else { return };
        match session.state() {
            SessionState::Connecting | SessionState::Handshaking => {
                if now.saturating_duration_since(started) > config.connect_timeout {
                    tracing::debug!(peer = session.id(), "connect timeout");
                    session.connect_timeout();
                }
            }
            SessionState::Ready => {
                let last = session.last_ping_at().unwrap_or(started);
                if now.saturating_duration_since(last) > config.ping_interval {
                    session.send(ping_message(rand::thread_rng().next_u64()));
                    session.set_last_ping_at(now);
                }
            }
            SessionState::Idle | SessionState::Closing => {}
        }
    }
}

/// Resolves once the session dropped its sender. Nothing is queued before
/// the handshake completes, so draining here loses no messages.
async fn session_dropped(outbound: &mut mpsc::UnboundedReceiver<RawMessage>) {
    while outbound.recv().await.is_some() {}
}

async fn run_peer(
    id: PeerId,
    endpoint: Endpoint,
    magic: [u8; 4],
    mut outbound: mpsc::UnboundedReceiver<RawMessage>,
    events: mpsc::UnboundedSender<PeerEvent>,
) {
    let reason = match drive_peer(id, &endpoint, magic, &mut outbound, &events).await {
        Ok(()) => None,
        Err(e) => Some(format!("{:#}", e)),
    };
    let _ = events.send(PeerEvent::Closed { id, reason });
}

async fn drive_peer(
    id: PeerId,
    endpoint: &Endpoint,
    magic: [u8; 4],
    outbound: &mut mpsc::UnboundedReceiver<RawMessage>,
    events: &mpsc::UnboundedSender<PeerEvent>,
) -> Result<()> {
    let stream = tokio::select! {
        res = TcpStream::connect((endpoint.host.as_str(), endpoint.port)) => {
            res.with_context(|| format!("connect to {} failed", endpoint))?
        }
        _ = session_dropped(outbound) => return Ok(()),
    };
    let remote = stream.peer_addr()?;
    let _ = events.send(PeerEvent::Connected { id });

    let mut framed = Framed::new(stream, MessageCodec::new(magic));
    let version = tokio::select! {
        res = handshake::client_handshake(&mut framed, remote) => res.context("handshake failed")?,
        _ = session_dropped(outbound) => return Ok(()),
    };
    if events.send(PeerEvent::HandshakeDone { id, version }).is_err() {
        return Ok(());
    }

    loop {
        tokio::select! {
            out = outbound.recv() => match out {
                Some(msg) => framed.send(msg).await?,
                // queued messages come out before the closed channel does
                None => return Ok(()),
            },
            inbound = framed.next() => match inbound {
                Some(Ok(msg)) => {
                    if msg.is(CMD_PING) {
                        framed.send(pong_for(&msg)).await?;
                    }
                    if events.send(PeerEvent::Message { id, msg }).is_err() {
                        return Ok(());
                    }
                }
                Some(Err(e)) => return Err(anyhow!(e).context("protocol error")),
                None => return Err(anyhow!("connection closed by peer")),
            },
        }
    }
}
