// src/lib.rs
//! Broadcast a signed bitcoin transaction straight to P2P nodes, without a
//! local full node or wallet.

pub mod broadcast;
pub mod chain;
pub mod config;
pub mod error;
pub mod network;
pub mod peers;
pub mod tx;

pub use broadcast::{broadcast, broadcast_until, Summary};
pub use chain::{Chain, ChainParams};
pub use config::{BroadcastConfig, SightingPolicy};
pub use error::{BroadcastError, ConfigError, ParseEndpointError, PeerSourceError, TxError};
pub use peers::{Endpoint, PeerSource};
pub use tx::{decode_tx_hex, BroadcastTx};
