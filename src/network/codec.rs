// src/network/codec.rs
// Framing for bitcoin P2P messages:
// magic(4) | command(12, NUL padded) | length(u32 LE) | checksum(4) | payload

use bytes::{Buf, BufMut, BytesMut};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

use super::message::{RawMessage, MAX_P2P_MSG_SIZE};

pub const HEADER_LEN: usize = 24;
const COMMAND_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("wrong network magic {0}")]
    BadMagic(String),

    #[error("malformed command name")]
    BadCommand,

    #[error("command name too long: {0}")]
    CommandTooLong(String),

    #[error("payload of {0} bytes exceeds limit")]
    Oversize(usize),

    #[error("checksum mismatch for {0}")]
    BadChecksum(String),
}

/// First four bytes of double-SHA256.
pub fn checksum(payload: &[u8]) -> [u8; 4] {
    let digest = Sha256::digest(Sha256::digest(payload));
    let mut out = [0u8; 4];
    out.copy_from_slice(&digest[..4]);
    out
}

#[derive(Debug, Clone)]
pub struct MessageCodec {
    magic: [u8; 4],
    max_payload: usize,
}

impl MessageCodec {
    pub fn new(magic: [u8; 4]) -> Self {
        Self { magic, max_payload: MAX_P2P_MSG_SIZE }
    }

    pub fn with_max_payload(mut self, max_payload: usize) -> Self {
        self.max_payload = max_payload;
        self
    }
}

fn parse_command(raw: &[u8]) -> Result<String, CodecError> {
    let end = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());
    let (name, padding) = raw.split_at(end);
    if name.is_empty()
        || padding.iter().any(|b| *b != 0)
        || !name.iter().all(|b| b.is_ascii_graphic())
    {
        return Err(CodecError::BadCommand);
    }
    Ok(String::from_utf8_lossy(name).into_owned())
}

impl Decoder for MessageCodec {
    type Item = RawMessage;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<RawMessage>, CodecError> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }
        if src[..4] != self.magic {
            return Err(CodecError::BadMagic(hex::encode(&src[..4])));
        }
        let command = parse_command(&src[4..16])?;
        let len = u32::from_le_bytes([src[16], src[17], src[18], src[19]]) as usize;
        if len > self.max_payload {
            return Err(CodecError::Oversize(len));
        }
        if src.len() < HEADER_LEN + len {
            src.reserve(HEADER_LEN + len - src.len());
            return Ok(None);
        }
        let mut expected = [0u8; 4];
        expected.copy_from_slice(&src[20..24]);

        src.advance(HEADER_LEN);
        let payload = src.split_to(len).freeze();
        if checksum(&payload) != expected {
            return Err(CodecError::BadChecksum(command));
        }
        Ok(Some(RawMessage { command, payload }))
    }
}

impl Encoder<RawMessage> for MessageCodec {
    type Error = CodecError;

    fn encode(&mut self, msg: RawMessage, dst: &mut BytesMut) -> Result<(), CodecError> {
        let name = msg.command.as_bytes();
        if name.len() > COMMAND_LEN {
            return Err(CodecError::CommandTooLong(msg.command));
        }
        if msg.payload.len() > self.max_payload {
            return Err(CodecError::Oversize(msg.payload.len()));
        }
        dst.reserve(HEADER_LEN + msg.payload.len());
        dst.put_slice(&self.magic);
        dst.put_slice(name);
        dst.put_bytes(0, COMMAND_LEN - name.len());
        dst.put_u32_le(msg.payload.len() as u32);
        dst.put_slice(&checksum(&msg.payload));
        dst.put_slice(&msg.payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{MAINNET, REGTEST};
    use crate::network::message::{inv_message, verack_message, InvEntry};

    fn encoded(codec: &mut MessageCodec, msg: RawMessage) -> BytesMut {
        let mut buf = BytesMut::new();
        codec.encode(msg, &mut buf).unwrap();
        buf
    }

    #[test]
    fn verack_wire_bytes() {
        let mut codec = MessageCodec::new(MAINNET.magic);
        let buf = encoded(&mut codec, verack_message());
        assert_eq!(
            hex::encode(&buf),
            "f9beb4d976657261636b000000000000000000005df6e0e2"
        );
    }

    #[test]
    fn decodes_across_partial_reads() {
        let mut codec = MessageCodec::new(REGTEST.magic);
        let msg = inv_message(&[InvEntry::tx([3; 32])]);
        let full = encoded(&mut codec, msg.clone());

        let mut src = BytesMut::from(&full[..10]);
        assert!(codec.decode(&mut src).unwrap().is_none());
        src.extend_from_slice(&full[10..30]);
        assert!(codec.decode(&mut src).unwrap().is_none());
        src.extend_from_slice(&full[30..]);
        assert_eq!(codec.decode(&mut src).unwrap(), Some(msg));
        assert!(src.is_empty());
    }

    #[test]
    fn two_messages_in_one_buffer() {
        let mut codec = MessageCodec::new(REGTEST.magic);
        let mut src = encoded(&mut codec, verack_message());
        src.extend_from_slice(&encoded(&mut codec, inv_message(&[InvEntry::tx([1; 32])])));
        assert_eq!(codec.decode(&mut src).unwrap().unwrap().command, "verack");
        assert_eq!(codec.decode(&mut src).unwrap().unwrap().command, "inv");
        assert!(codec.decode(&mut src).unwrap().is_none());
    }

    #[test]
    fn rejects_foreign_magic() {
        let mut mainnet = MessageCodec::new(MAINNET.magic);
        let mut regtest = MessageCodec::new(REGTEST.magic);
        let mut src = encoded(&mut mainnet, verack_message());
        assert!(matches!(regtest.decode(&mut src), Err(CodecError::BadMagic(_))));
    }

    #[test]
    fn rejects_corrupted_payload() {
        let mut codec = MessageCodec::new(REGTEST.magic);
        let mut src = encoded(&mut codec, inv_message(&[InvEntry::tx([1; 32])]));
        let last = src.len() - 1;
        src[last] ^= 0xff;
        assert!(matches!(codec.decode(&mut src), Err(CodecError::BadChecksum(_))));
    }

    #[test]
    fn rejects_oversize_length_before_buffering() {
        let mut codec = MessageCodec::new(REGTEST.magic).with_max_payload(16);
        let mut src = encoded(&mut MessageCodec::new(REGTEST.magic), inv_message(&[InvEntry::tx([1; 32])]));
        assert!(matches!(codec.decode(&mut src), Err(CodecError::Oversize(37))));
    }

    #[test]
    fn rejects_garbage_command() {
        let mut codec = MessageCodec::new(REGTEST.magic);
        let mut src = encoded(&mut codec, verack_message());
        src[4] = 0x01;
        assert!(matches!(codec.decode(&mut src), Err(CodecError::BadCommand)));

        let mut src = encoded(&mut codec, verack_message());
        // byte after the terminating NUL must also be NUL
        src[15] = b'x';
        assert!(matches!(codec.decode(&mut src), Err(CodecError::BadCommand)));
    }
}
