// src/network.rs
//! Minimal bitcoin P2P client layer: framing, handshake and a peer group
//! event loop that hands peer events to a [`GroupHandler`].

pub mod codec;
pub mod group;
pub mod handshake;
pub mod message;
pub mod session;

pub use codec::{CodecError, MessageCodec};
pub use group::{GroupConfig, GroupHandler, PeerGroup};
pub use message::{InvEntry, InvType, RawMessage, MAX_P2P_MSG_SIZE};
pub use session::{Hints, PeerId, PeerSession, SessionState};
