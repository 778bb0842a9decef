// src/broadcast/context.rs
use std::time::Duration;

use super::report::Summary;
use crate::config::BroadcastConfig;
use crate::tx::BroadcastTx;

/// Counters kept by the context. They only ever go up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    ConnectedToPeers,
    InvedToPeers,
    GetdataFromPeers,
    FoundOnNonInvedPeers,
}

/// Observation record for one broadcast run.
#[derive(Debug)]
pub struct BroadcastContext<'a> {
    pub tx: &'a BroadcastTx,
    pub timeout: Duration,
    pub debug: bool,
    pub max_peers_to_connect: usize,
    pub max_peers_to_inv: usize,
    connected_to_peers: usize,
    inved_to_peers: usize,
    getdata_from_peers: usize,
    found_on_non_inved_peers: usize,
}

impl<'a> BroadcastContext<'a> {
    pub fn new(tx: &'a BroadcastTx, config: &BroadcastConfig) -> Self {
        Self {
            tx,
            timeout: config.timeout,
            debug: config.debug,
            max_peers_to_connect: config.max_peers_to_connect,
            max_peers_to_inv: config.max_peers_to_inv,
            connected_to_peers: 0,
            inved_to_peers: 0,
            getdata_from_peers: 0,
            found_on_non_inved_peers: 0,
        }
    }

    pub fn increment(&mut self, counter: Counter) {
        let slot = match counter {
            Counter::ConnectedToPeers => &mut self.connected_to_peers,
            Counter::InvedToPeers => &mut self.inved_to_peers,
            Counter::GetdataFromPeers => &mut self.getdata_from_peers,
            Counter::FoundOnNonInvedPeers => &mut self.found_on_non_inved_peers,
        };
        *slot += 1;
    }

    pub fn get(&self, counter: Counter) -> usize {
        match counter {
            Counter::ConnectedToPeers => self.connected_to_peers,
            Counter::InvedToPeers => self.inved_to_peers,
            Counter::GetdataFromPeers => self.getdata_from_peers,
            Counter::FoundOnNonInvedPeers => self.found_on_non_inved_peers,
        }
    }

    pub fn inv_budget_left(&self) -> bool {
        self.inved_to_peers < self.max_peers_to_inv
    }

    pub fn summary(&self) -> Summary {
        Summary {
            txid: self.tx.txid(),
            max_peers_to_connect: self.max_peers_to_connect,
            connected_to_peers: self.connected_to_peers,
            inved_to_peers: self.inved_to_peers,
            getdata_from_peers: self.getdata_from_peers,
            found_on_non_inved_peers: self.found_on_non_inved_peers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tx::{decode_tx_hex, tests::GENESIS_TX_HEX};

    #[test]
    fn counters_start_at_zero_and_increment_independently() {
        let tx = decode_tx_hex(GENESIS_TX_HEX).unwrap();
        let mut ctx = BroadcastContext::new(&tx, &BroadcastConfig::default());
        assert_eq!(ctx.summary().connected_to_peers, 0);

        ctx.increment(Counter::ConnectedToPeers);
        ctx.increment(Counter::ConnectedToPeers);
        ctx.increment(Counter::InvedToPeers);
        assert_eq!(ctx.get(Counter::ConnectedToPeers), 2);
        assert_eq!(ctx.get(Counter::InvedToPeers), 1);
        assert_eq!(ctx.get(Counter::GetdataFromPeers), 0);
        assert!(ctx.inv_budget_left());

        ctx.increment(Counter::InvedToPeers);
        assert!(!ctx.inv_budget_left());
        assert_eq!(ctx.summary().max_peers_to_connect, 6);
    }
}
