// src/network/message.rs
// Bitcoin P2P message payloads used by the broadcaster.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Largest payload accepted or produced (32 MiB).
pub const MAX_P2P_MSG_SIZE: usize = 0x0200_0000;

/// Upper bound on entries in a single inv/getdata.
pub const MAX_INV_ENTRIES: u64 = 50_000;

pub const PROTOCOL_VERSION: i32 = 70015;

pub const CMD_VERSION: &str = "version";
pub const CMD_VERACK: &str = "verack";
pub const CMD_PING: &str = "ping";
pub const CMD_PONG: &str = "pong";
pub const CMD_INV: &str = "inv";
pub const CMD_GETDATA: &str = "getdata";
pub const CMD_TX: &str = "tx";

const INV_ENTRY_LEN: usize = 36;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("payload truncated")]
    Truncated,

    #[error("too many entries: {0}")]
    TooManyEntries(u64),

    #[error("{0} trailing bytes")]
    Trailing(usize),

    #[error("expected exactly one entry, got {0}")]
    NotSingle(usize),

    #[error("unexpected inventory type {0:?}")]
    UnexpectedType(InvType),
}

/// A framed message: command name plus raw payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub command: String,
    pub payload: Bytes,
}

impl RawMessage {
    pub fn new(command: &str, payload: Bytes) -> Self {
        Self { command: command.to_string(), payload }
    }

    pub fn is(&self, command: &str) -> bool {
        self.command == command
    }
}

/// Inventory object type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvType {
    Error,
    Tx,
    Block,
    FilteredBlock,
    CompactBlock,
    WitnessTx,
    WitnessBlock,
    Unknown(u32),
}

const WITNESS_FLAG: u32 = 1 << 30;

impl From<u32> for InvType {
    fn from(v: u32) -> Self {
        match v {
            0 => InvType::Error,
            1 => InvType::Tx,
            2 => InvType::Block,
            3 => InvType::FilteredBlock,
            4 => InvType::CompactBlock,
            v if v == WITNESS_FLAG | 1 => InvType::WitnessTx,
            v if v == WITNESS_FLAG | 2 => InvType::WitnessBlock,
            other => InvType::Unknown(other),
        }
    }
}

impl From<InvType> for u32 {
    fn from(t: InvType) -> u32 {
        match t {
            InvType::Error => 0,
            InvType::Tx => 1,
            InvType::Block => 2,
            InvType::FilteredBlock => 3,
            InvType::CompactBlock => 4,
            InvType::WitnessTx => WITNESS_FLAG | 1,
            InvType::WitnessBlock => WITNESS_FLAG | 2,
            InvType::Unknown(v) => v,
        }
    }
}

/// One entry of an inv/getdata payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvEntry {
    pub kind: InvType,
    pub hash: [u8; 32],
}

impl InvEntry {
    pub fn tx(hash: [u8; 32]) -> Self {
        Self { kind: InvType::Tx, hash }
    }
}

pub fn write_compact_size(buf: &mut BytesMut, n: u64) {
    match n {
        0..=0xfc => buf.put_u8(n as u8),
        0xfd..=0xffff => {
            buf.put_u8(0xfd);
            buf.put_u16_le(n as u16);
        }
        0x1_0000..=0xffff_ffff => {
            buf.put_u8(0xfe);
            buf.put_u32_le(n as u32);
        }
        _ => {
            buf.put_u8(0xff);
            buf.put_u64_le(n);
        }
    }
}

pub fn read_compact_size(buf: &mut &[u8]) -> Result<u64, PayloadError> {
    if !buf.has_remaining() {
        return Err(PayloadError::Truncated);
    }
    let width = match buf.get_u8() {
        0xfd => 2,
        0xfe => 4,
        0xff => 8,
        n => return Ok(n as u64),
    };
    if buf.remaining() < width {
        return Err(PayloadError::Truncated);
    }
    Ok(match width {
        2 => buf.get_u16_le() as u64,
        4 => buf.get_u32_le() as u64,
        _ => buf.get_u64_le(),
    })
}

fn read_inv_entry(buf: &mut &[u8]) -> Result<InvEntry, PayloadError> {
    if buf.remaining() < INV_ENTRY_LEN {
        return Err(PayloadError::Truncated);
    }
    let kind = InvType::from(buf.get_u32_le());
    let mut hash = [0u8; 32];
    buf.copy_to_slice(&mut hash);
    Ok(InvEntry { kind, hash })
}

/// Encode an inv/getdata payload.
pub fn encode_inv(entries: &[InvEntry]) -> Bytes {
    let mut buf = BytesMut::with_capacity(9 + entries.len() * INV_ENTRY_LEN);
    write_compact_size(&mut buf, entries.len() as u64);
    for e in entries {
        buf.put_u32_le(e.kind.into());
        buf.put_slice(&e.hash);
    }
    buf.freeze()
}

/// Decode an inv/getdata payload: a compact-size count followed by entries.
pub fn decode_inv(payload: &[u8]) -> Result<Vec<InvEntry>, PayloadError> {
    let mut buf = payload;
    let count = read_compact_size(&mut buf)?;
    if count > MAX_INV_ENTRIES {
        return Err(PayloadError::TooManyEntries(count));
    }
    // the count is peer supplied; size the buffer by what the payload can hold
    let fits = (buf.remaining() / INV_ENTRY_LEN) as u64;
    let mut entries = Vec::with_capacity(count.min(fits) as usize);
    for _ in 0..count {
        entries.push(read_inv_entry(&mut buf)?);
    }
    if buf.has_remaining() {
        return Err(PayloadError::Trailing(buf.remaining()));
    }
    Ok(entries)
}

/// Decode a getdata that must request exactly one transaction.
pub fn decode_single_tx_request(payload: &[u8]) -> Result<InvEntry, PayloadError> {
    let mut buf = payload;
    let count = read_compact_size(&mut buf)?;
    if count != 1 {
        return Err(PayloadError::NotSingle(count as usize));
    }
    let entry = read_inv_entry(&mut buf)?;
    if entry.kind != InvType::Tx {
        return Err(PayloadError::UnexpectedType(entry.kind));
    }
    Ok(entry)
}

pub fn inv_message(entries: &[InvEntry]) -> RawMessage {
    RawMessage::new(CMD_INV, encode_inv(entries))
}

pub fn getdata_message(entries: &[InvEntry]) -> RawMessage {
    RawMessage::new(CMD_GETDATA, encode_inv(entries))
}

pub fn tx_message(raw_tx: Bytes) -> RawMessage {
    RawMessage::new(CMD_TX, raw_tx)
}

pub fn verack_message() -> RawMessage {
    RawMessage::new(CMD_VERACK, Bytes::new())
}

pub fn ping_message(nonce: u64) -> RawMessage {
    RawMessage::new(CMD_PING, Bytes::copy_from_slice(&nonce.to_le_bytes()))
}

/// A pong echoes the ping's nonce; pre-BIP31 pings carry none.
pub fn pong_for(ping: &RawMessage) -> RawMessage {
    RawMessage::new(CMD_PONG, ping.payload.clone())
}

/// Fields of a `version` message that matter to the broadcaster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionMessage {
    pub version: i32,
    pub services: u64,
    pub timestamp: i64,
    pub receiver: SocketAddr,
    pub nonce: u64,
    pub user_agent: String,
    pub start_height: i32,
    pub relay: bool,
}

impl VersionMessage {
    /// Version message announcing a non-serving client that wants tx relay.
    pub fn outbound(receiver: SocketAddr, nonce: u64) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        Self {
            version: PROTOCOL_VERSION,
            services: 0,
            timestamp,
            receiver,
            nonce,
            user_agent: format!("/btc-send-tx:{}/", env!("CARGO_PKG_VERSION")),
            start_height: 0,
            relay: true,
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(128);
        buf.put_i32_le(self.version);
        buf.put_u64_le(self.services);
        buf.put_i64_le(self.timestamp);
        put_net_addr(&mut buf, 0, self.receiver);
        put_net_addr(&mut buf, self.services, SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)));
        buf.put_u64_le(self.nonce);
        write_compact_size(&mut buf, self.user_agent.len() as u64);
        buf.put_slice(self.user_agent.as_bytes());
        buf.put_i32_le(self.start_height);
        buf.put_u8(self.relay as u8);
        buf.freeze()
    }

    pub fn decode(payload: &[u8]) -> Result<Self, PayloadError> {
        let mut buf = payload;
        // version, services, timestamp, addr_recv
        if buf.remaining() < 4 + 8 + 8 + 26 {
            return Err(PayloadError::Truncated);
        }
        let version = buf.get_i32_le();
        let services = buf.get_u64_le();
        let timestamp = buf.get_i64_le();
        let receiver = get_net_addr(&mut buf);

        // very old peers stop here
        let mut msg = Self {
            version,
            services,
            timestamp,
            receiver,
            nonce: 0,
            user_agent: String::new(),
            start_height: 0,
            relay: true,
        };
        if buf.remaining() < 26 + 8 {
            return Ok(msg);
        }
        buf.advance(26);
        msg.nonce = buf.get_u64_le();

        let ua_len = read_compact_size(&mut buf)? as usize;
        if buf.remaining() < ua_len.saturating_add(4) {
            return Err(PayloadError::Truncated);
        }
        msg.user_agent = String::from_utf8_lossy(&buf[..ua_len]).into_owned();
        buf.advance(ua_len);
        msg.start_height = buf.get_i32_le();
        if buf.has_remaining() {
            msg.relay = buf.get_u8() != 0;
        }
        Ok(msg)
    }

    pub fn to_message(&self) -> RawMessage {
        RawMessage::new(CMD_VERSION, self.encode())
    }
}

fn put_net_addr(buf: &mut BytesMut, services: u64, addr: SocketAddr) {
    buf.put_u64_le(services);
    let ip = match addr {
        SocketAddr::V4(a) => a.ip().to_ipv6_mapped(),
        SocketAddr::V6(a) => *a.ip(),
    };
    buf.put_slice(&ip.octets());
    buf.put_u16(addr.port());
}

fn get_net_addr(buf: &mut &[u8]) -> SocketAddr {
    let _services = buf.get_u64_le();
    let mut octets = [0u8; 16];
    buf.copy_to_slice(&mut octets);
    let port = buf.get_u16();
    let ip = std::net::Ipv6Addr::from(octets);
    match ip.to_ipv4_mapped() {
        Some(v4) => SocketAddr::from((v4, port)),
        None => SocketAddr::from((ip, port)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compact_size_boundaries() {
        for (n, len) in [(0u64, 1), (0xfc, 1), (0xfd, 3), (0xffff, 3), (0x1_0000, 5), (0x1_0000_0000, 9)] {
            let mut buf = BytesMut::new();
            write_compact_size(&mut buf, n);
            assert_eq!(buf.len(), len, "encoded width of {n}");
            let mut slice = &buf[..];
            assert_eq!(read_compact_size(&mut slice).unwrap(), n);
            assert!(slice.is_empty());
        }
    }

    #[test]
    fn single_tx_inv_layout() {
        let payload = encode_inv(&[InvEntry::tx([0xab; 32])]);
        assert_eq!(payload.len(), 37);
        assert_eq!(payload[0], 1);
        assert_eq!(&payload[1..5], &[1, 0, 0, 0]);
        assert_eq!(&payload[5..], &[0xab; 32]);
    }

    #[test]
    fn decode_inv_rejects_truncation_and_trailing_bytes() {
        let payload = encode_inv(&[InvEntry::tx([1; 32]), InvEntry::tx([2; 32])]);
        assert_eq!(decode_inv(&payload).unwrap().len(), 2);
        assert_eq!(decode_inv(&payload[..payload.len() - 1]), Err(PayloadError::Truncated));

        let mut extra = payload.to_vec();
        extra.push(0);
        assert_eq!(decode_inv(&extra), Err(PayloadError::Trailing(1)));
        assert_eq!(decode_inv(&[]), Err(PayloadError::Truncated));
    }

    #[test]
    fn decode_inv_caps_entry_count() {
        let mut buf = BytesMut::new();
        write_compact_size(&mut buf, MAX_INV_ENTRIES + 1);
        assert_eq!(decode_inv(&buf), Err(PayloadError::TooManyEntries(MAX_INV_ENTRIES + 1)));
    }

    #[test]
    fn decode_inv_count_larger_than_payload() {
        let mut buf = BytesMut::new();
        write_compact_size(&mut buf, MAX_INV_ENTRIES);
        buf.put_u32_le(1);
        buf.put_slice(&[7u8; 32]);
        assert_eq!(decode_inv(&buf), Err(PayloadError::Truncated));
    }

    #[test]
    fn single_tx_request_rules() {
        let ok = encode_inv(&[InvEntry::tx([7; 32])]);
        assert_eq!(decode_single_tx_request(&ok).unwrap().hash, [7; 32]);

        let batched = encode_inv(&[InvEntry::tx([7; 32]); 3]);
        assert_eq!(decode_single_tx_request(&batched), Err(PayloadError::NotSingle(3)));

        let block = encode_inv(&[InvEntry { kind: InvType::Block, hash: [7; 32] }]);
        assert_eq!(decode_single_tx_request(&block), Err(PayloadError::UnexpectedType(InvType::Block)));

        let witness = encode_inv(&[InvEntry { kind: InvType::WitnessTx, hash: [7; 32] }]);
        assert!(decode_single_tx_request(&witness).is_err());
    }

    #[test]
    fn inv_type_codes() {
        assert_eq!(u32::from(InvType::WitnessTx), 0x4000_0001);
        assert_eq!(InvType::from(0x4000_0002u32), InvType::WitnessBlock);
        assert_eq!(InvType::from(99u32), InvType::Unknown(99));
    }

    #[test]
    fn version_message_decodes_what_it_encodes() {
        let receiver: SocketAddr = "127.0.0.1:18444".parse().unwrap();
        let sent = VersionMessage::outbound(receiver, 42);
        let got = VersionMessage::decode(&sent.encode()).unwrap();
        assert_eq!(got, sent);
        assert!(got.relay);
        assert!(got.user_agent.starts_with("/btc-send-tx:"));
    }

    #[test]
    fn version_message_without_relay_flag() {
        let receiver: SocketAddr = "10.0.0.1:8333".parse().unwrap();
        let encoded = VersionMessage::outbound(receiver, 1).encode();
        let got = VersionMessage::decode(&encoded[..encoded.len() - 1]).unwrap();
        assert!(got.relay);
        assert_eq!(got.start_height, 0);
    }
}
