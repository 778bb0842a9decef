// src/network/handshake.rs
use std::net::SocketAddr;

use anyhow::{anyhow, Result};
use futures::{SinkExt, StreamExt};
use rand::RngCore;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;

use super::codec::MessageCodec;
use super::message::{
    pong_for, verack_message, VersionMessage, CMD_PING, CMD_VERACK, CMD_VERSION,
};

/// Oldest protocol version we talk to (BIP31 pong support).
pub const MIN_PEER_PROTO_VERSION: i32 = 60001;

/// Outbound version/verack exchange.
///
/// Sends our version, answers the peer's version with verack and pings with
/// pongs, and returns once both the peer's version and verack have arrived.
/// Anything else received before that (sendaddrv2, wtxidrelay, ...) is
/// ignored.
pub async fn client_handshake<S>(
    framed: &mut Framed<S, MessageCodec>,
    remote: SocketAddr,
) -> Result<VersionMessage>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let nonce = rand::thread_rng().next_u64();
    framed.send(VersionMessage::outbound(remote, nonce).to_message()).await?;

    let mut peer_version: Option<VersionMessage> = None;
    let mut got_verack = false;

    while peer_version.is_none() || !got_verack {
        let msg = framed
            .next()
            .await
            .ok_or_else(|| anyhow!("peer closed during handshake"))??;

        match msg.command.as_str() {
            CMD_VERSION => {
                if peer_version.is_some() {
                    return Err(anyhow!("duplicate version message"));
                }
                let v = VersionMessage::decode(&msg.payload)
                    .map_err(|e| anyhow!("bad version payload: {}", e))?;
                if v.nonce == nonce && nonce != 0 {
                    return Err(anyhow!("connected to self"));
                }
                if v.version < MIN_PEER_PROTO_VERSION {
                    return Err(anyhow!("peer protocol version {} too old", v.version));
                }
                framed.send(verack_message()).await?;
                peer_version = Some(v);
            }
            CMD_VERACK => {
                if peer_version.is_none() {
                    return Err(anyhow!("verack before version"));
                }
                got_verack = true;
            }
            CMD_PING => framed.send(pong_for(&msg)).await?,
            other => tracing::trace!(command = other, "ignoring message during handshake"),
        }
    }

    peer_version.ok_or_else(|| anyhow!("handshake ended without version"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::REGTEST;
    use crate::network::message::{ping_message, RawMessage, CMD_PONG};
    use bytes::Bytes;
    use tokio::io::duplex;

    fn peer_version(nonce: u64) -> RawMessage {
        let addr: SocketAddr = "127.0.0.1:1".parse().unwrap();
        VersionMessage::outbound(addr, nonce).to_message()
    }

    #[tokio::test]
    async fn completes_after_version_and_verack() {
        let (a, b) = duplex(64 * 1024);
        let mut ours = Framed::new(a, MessageCodec::new(REGTEST.magic));
        let mut theirs = Framed::new(b, MessageCodec::new(REGTEST.magic));
        let remote: SocketAddr = "127.0.0.1:18444".parse().unwrap();

        let peer = tokio::spawn(async move {
            let first = theirs.next().await.unwrap().unwrap();
            assert_eq!(first.command, CMD_VERSION);
            theirs.send(RawMessage::new("sendaddrv2", Bytes::new())).await.unwrap();
            theirs.send(peer_version(99)).await.unwrap();
            theirs.send(ping_message(5)).await.unwrap();
            theirs.send(verack_message()).await.unwrap();

            let mut seen = Vec::new();
            for _ in 0..2 {
                seen.push(theirs.next().await.unwrap().unwrap().command);
            }
            seen
        });

        let v = client_handshake(&mut ours, remote).await.unwrap();
        assert_eq!(v.nonce, 99);
        assert_eq!(peer.await.unwrap(), vec![CMD_VERACK.to_string(), CMD_PONG.to_string()]);
    }

    #[tokio::test]
    async fn verack_first_is_rejected() {
        let (a, b) = duplex(64 * 1024);
        let mut ours = Framed::new(a, MessageCodec::new(REGTEST.magic));
        let mut theirs = Framed::new(b, MessageCodec::new(REGTEST.magic));
        let remote: SocketAddr = "127.0.0.1:18444".parse().unwrap();

        tokio::spawn(async move {
            let _ = theirs.next().await;
            let _ = theirs.send(verack_message()).await;
            let _ = theirs.next().await;
        });
        assert!(client_handshake(&mut ours, remote).await.is_err());
    }

    #[tokio::test]
    async fn closed_connection_fails() {
        let (a, b) = duplex(64 * 1024);
        let mut ours = Framed::new(a, MessageCodec::new(REGTEST.magic));
        drop(b);
        let remote: SocketAddr = "127.0.0.1:18444".parse().unwrap();
        assert!(client_handshake(&mut ours, remote).await.is_err());
    }
}
