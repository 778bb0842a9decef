// src/broadcast/engine.rs
use std::time::Instant;

use tracing::debug;

use super::context::{BroadcastContext, Counter};
use super::report::Summary;
use crate::config::SightingPolicy;
use crate::network::message::{
    decode_inv, decode_single_tx_request, inv_message, tx_message, CMD_GETDATA, CMD_INV,
};
use crate::network::{GroupHandler, Hints, InvEntry, PeerSession, RawMessage};

/// Reacts to peer group events: informs a few peers, serves getdata and
/// watches the others for announcements of the transaction.
pub struct BroadcastEngine<'a> {
    ctx: BroadcastContext<'a>,
    policy: SightingPolicy,
}

impl<'a> BroadcastEngine<'a> {
    pub fn new(ctx: BroadcastContext<'a>, policy: SightingPolicy) -> Self {
        Self { ctx, policy }
    }

    pub fn context(&self) -> &BroadcastContext<'a> {
        &self.ctx
    }

    pub fn summary(&self) -> Summary {
        self.ctx.summary()
    }

    fn handle_inv(&mut self, peer: &mut PeerSession, payload: &[u8]) {
        let entries = match decode_inv(payload) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(peer = peer.id(), "bad inv: {}", e);
                peer.misbehave();
                return;
            }
        };
        let hash = self.ctx.tx.hash();
        if !entries.iter().any(|e| e.hash == hash) {
            return;
        }
        if self.policy == SightingPolicy::NonInvedOnly && peer.has_hint(Hints::INV_SENT) {
            debug!(peer = peer.id(), "informed peer echoed the tx, not counted");
            return;
        }
        if peer.set_hint(Hints::TX_SEEN) {
            self.ctx.increment(Counter::FoundOnNonInvedPeers);
            println!("node {} has the tx", peer.id());
            println!("tx successfully seen on node {}", peer.id());
        }
    }

    fn handle_getdata(&mut self, peer: &mut PeerSession, payload: &[u8]) {
        // only a single tx object per getdata is served
        if let Err(e) = decode_single_tx_request(payload) {
            debug!(peer = peer.id(), "refusing getdata: {}", e);
            peer.misbehave();
            return;
        }
        if !peer.send(tx_message(self.ctx.tx.raw())) {
            return;
        }
        peer.set_hint(Hints::TX_SENT);
        self.ctx.increment(Counter::GetdataFromPeers);
        println!("tx successfully sent to node {}", peer.id());
    }
}

impl GroupHandler for BroadcastEngine<'_> {
    fn on_handshake_done(&mut self, peer: &mut PeerSession) {
        println!("Successfully connected to peer {}", peer.id());
        self.ctx.increment(Counter::ConnectedToPeers);

        // the rest stay connected as observers
        if !self.ctx.inv_budget_left() || peer.has_hint(Hints::INV_SENT) {
            return;
        }
        if peer.send(inv_message(&[InvEntry::tx(self.ctx.tx.hash())])) {
            peer.set_hint(Hints::INV_SENT);
            self.ctx.increment(Counter::InvedToPeers);
            debug!(peer = peer.id(), txid = %self.ctx.tx.txid(), "inv sent");
        }
    }

    fn on_message(&mut self, peer: &mut PeerSession, msg: &RawMessage) {
        match msg.command.as_str() {
            CMD_INV => self.handle_inv(peer, &msg.payload),
            CMD_GETDATA if !peer.has_hint(Hints::TX_SENT) => self.handle_getdata(peer, &msg.payload),
            _ => {}
        }
    }

    fn on_tick(&mut self, peer: &mut PeerSession, now: Instant) -> bool {
        // a session that never started connecting counts as expired
        let age = peer
            .connect_started_at()
            .map(|started| now.saturating_duration_since(started));
        if self.ctx.debug {
            if let Some(age) = age {
                debug!("timer node {}, delta: {} secs, hints {}", peer.id(), age.as_secs(), peer.hints());
            }
        }

        if age.map_or(true, |age| age > self.ctx.timeout) {
            peer.disconnect();
        }
        if peer.has_hint(Hints::TX_SENT) || peer.has_hint(Hints::TX_SEEN) {
            peer.disconnect();
        }
        true
    }
}
