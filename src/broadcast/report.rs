// src/broadcast/report.rs
use std::fmt;

use bitcoin::Txid;

/// Final counters of a broadcast run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub txid: Txid,
    pub max_peers_to_connect: usize,
    pub connected_to_peers: usize,
    pub inved_to_peers: usize,
    pub getdata_from_peers: usize,
    pub found_on_non_inved_peers: usize,
}

impl Summary {
    /// At least one peer asked for the transaction or announced it back.
    pub fn propagated(&self) -> bool {
        self.getdata_from_peers > 0 || self.found_on_non_inved_peers > 0
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Result:")?;
        writeln!(f, "=============")?;
        writeln!(f, "Max nodes to connect to: {}", self.max_peers_to_connect)?;
        writeln!(f, "Connected to nodes: {}", self.connected_to_peers)?;
        writeln!(f, "Informed nodes: {}", self.inved_to_peers)?;
        writeln!(f, "Requested from nodes: {}", self.getdata_from_peers)?;
        write!(f, "Seen on other nodes: {}", self.found_on_non_inved_peers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::hashes::Hash;

    #[test]
    fn fixed_format() {
        let s = Summary {
            txid: Txid::all_zeros(),
            max_peers_to_connect: 6,
            connected_to_peers: 2,
            inved_to_peers: 2,
            getdata_from_peers: 1,
            found_on_non_inved_peers: 0,
        };
        assert_eq!(
            s.to_string(),
            "Result:\n=============\nMax nodes to connect to: 6\nConnected to nodes: 2\n\
             Informed nodes: 2\nRequested from nodes: 1\nSeen on other nodes: 0"
        );
        assert!(s.propagated());
    }

    #[test]
    fn nothing_requested_is_not_propagated() {
        let s = Summary {
            txid: Txid::all_zeros(),
            max_peers_to_connect: 6,
            connected_to_peers: 3,
            inved_to_peers: 2,
            getdata_from_peers: 0,
            found_on_non_inved_peers: 0,
        };
        assert!(!s.propagated());
    }
}
