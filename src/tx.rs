// src/tx.rs
use bitcoin::consensus::{deserialize, serialize};
use bitcoin::hashes::Hash;
use bitcoin::{Transaction, Txid};
use bytes::Bytes;

use crate::error::TxError;
use crate::network::message::MAX_P2P_MSG_SIZE;

/// Txid and wire encoding of the transaction being broadcast, computed
/// once up front.
#[derive(Debug, Clone)]
pub struct BroadcastTx {
    txid: Txid,
    raw: Bytes,
}

impl BroadcastTx {
    pub fn new(tx: Transaction) -> Self {
        let txid = tx.compute_txid();
        let raw = Bytes::from(serialize(&tx));
        Self { txid, raw }
    }

    pub fn txid(&self) -> Txid {
        self.txid
    }

    /// Txid in internal byte order, as used in inventory entries.
    pub fn hash(&self) -> [u8; 32] {
        self.txid.to_byte_array()
    }

    /// Canonical serialization, the payload of a `tx` message.
    pub fn raw(&self) -> Bytes {
        self.raw.clone()
    }
}

/// Decode an operator-supplied hex string into a transaction.
///
/// Rejects empty input, input longer than the maximum P2P message size,
/// odd-length or non-hex input, and bytes that do not form exactly one
/// transaction.
pub fn decode_tx_hex(input: &str) -> Result<BroadcastTx, TxError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(TxError::Empty);
    }
    if input.len() > MAX_P2P_MSG_SIZE {
        return Err(TxError::TooLarge { len: input.len(), max: MAX_P2P_MSG_SIZE });
    }
    let bytes = hex::decode(input)?;
    let tx: Transaction = deserialize(&bytes)?;
    Ok(BroadcastTx::new(tx))
}
