// src/error.rs
use thiserror::Error;

/// Problems with the transaction supplied by the operator.
#[derive(Debug, Error)]
pub enum TxError {
    #[error("transaction is empty")]
    Empty,

    #[error("transaction is too large ({len} hex chars, max {max})")]
    TooLarge { len: usize, max: usize },

    #[error("invalid transaction hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    #[error("transaction is invalid: {0}")]
    Decode(#[from] bitcoin::consensus::encode::Error),
}

/// Problems obtaining candidate peers.
#[derive(Debug, Error)]
pub enum PeerSourceError {
    #[error("no DNS seed configured for chain {0}")]
    NoDnsSeed(&'static str),

    #[error("DNS seed lookup for {seed} failed: {source}")]
    Dns {
        seed: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no peers to connect to")]
    NoPeers,
}

/// A `host:port` token that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid endpoint '{0}' (expected host:port)")]
pub struct ParseEndpointError(pub String);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("timeout must be at least one second")]
    ZeroTimeout,

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Everything that can stop a broadcast before the event loop starts.
#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error(transparent)]
    Tx(#[from] TxError),

    #[error(transparent)]
    PeerSource(#[from] PeerSourceError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
