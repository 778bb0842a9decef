// src/peers.rs
// Candidate peer endpoints: an operator-supplied list or one DNS seed.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use crate::chain::ChainParams;
use crate::error::{ParseEndpointError, PeerSourceError};

/// Longest accepted `host:port` token.
pub const MAX_ENDPOINT_LEN: usize = 63;

/// A host (IP literal or name) and TCP port.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port }
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Self { host: addr.ip().to_string(), port: addr.port() }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for Endpoint {
    type Err = ParseEndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseEndpointError(s.to_string());
        let (host, port) = s.rsplit_once(':').ok_or_else(err)?;
        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);
        // a bare IPv6 address without brackets is ambiguous
        if host.is_empty() || host.contains(|c: char| c.is_whitespace() || c == '[' || c == ']') {
            return Err(err());
        }
        if host.contains(':') && !s.starts_with('[') {
            return Err(err());
        }
        let port: u16 = port.parse().map_err(|_| err())?;
        if port == 0 {
            return Err(err());
        }
        Ok(Endpoint::new(host, port))
    }
}

/// Where candidate peers come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerSource {
    /// Comma separated `host:port` list.
    Explicit(String),
    /// First DNS seed of the selected chain.
    DnsSeed,
}

impl PeerSource {
    pub fn from_ips(ips: Option<String>) -> Self {
        match ips {
            Some(list) => PeerSource::Explicit(list),
            None => PeerSource::DnsSeed,
        }
    }

    /// Fails before any socket is opened if no endpoint can be produced.
    pub async fn resolve(&self, chain: &ChainParams) -> Result<Vec<Endpoint>, PeerSourceError> {
        let endpoints = match self {
            PeerSource::Explicit(list) => parse_ip_list(list),
            PeerSource::DnsSeed => {
                let seed = chain.first_seed().ok_or(PeerSourceError::NoDnsSeed(chain.name))?;
                resolve_seed(seed, chain.default_port).await?
            }
        };
        if endpoints.is_empty() {
            return Err(PeerSourceError::NoPeers);
        }
        Ok(endpoints)
    }
}

/// Split a comma separated list into endpoints. Whitespace is stripped,
/// empty tokens are skipped and malformed or overlong tokens are dropped.
pub fn parse_ip_list(list: &str) -> Vec<Endpoint> {
    let mut out: Vec<Endpoint> = Vec::new();
    for token in list.split(',') {
        let token: String = token.chars().filter(|c| !c.is_whitespace()).collect();
        if token.is_empty() {
            continue;
        }
        if token.len() > MAX_ENDPOINT_LEN {
            tracing::warn!(token = %token, "peer address too long, skipped");
            continue;
        }
        match token.parse::<Endpoint>() {
            Ok(ep) if !out.contains(&ep) => out.push(ep),
            Ok(_) => {}
            Err(e) => tracing::debug!("{}, skipped", e),
        }
    }
    out
}

/// Resolve a seed domain to IPv4 endpoints on the chain's default port.
pub async fn resolve_seed(seed: &str, port: u16) -> Result<Vec<Endpoint>, PeerSourceError> {
    tracing::info!(seed, "querying DNS seed");
    let addrs = tokio::net::lookup_host((seed, port))
        .await
        .map_err(|source| PeerSourceError::Dns { seed: seed.to_string(), source })?;

    let mut out: Vec<Endpoint> = Vec::new();
    for addr in addrs.filter(SocketAddr::is_ipv4) {
        let ep = Endpoint::from(addr);
        if !out.contains(&ep) {
            out.push(ep);
        }
    }
    tracing::info!(seed, count = out.len(), "DNS seed returned peers");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{ChainParams, MAINNET, REGTEST};

    #[test]
    fn endpoint_parsing() {
        assert_eq!("127.0.0.1:8333".parse::<Endpoint>().unwrap(), Endpoint::new("127.0.0.1", 8333));
        assert_eq!("node.example:18333".parse::<Endpoint>().unwrap(), Endpoint::new("node.example", 18333));
        assert_eq!("[::1]:8333".parse::<Endpoint>().unwrap(), Endpoint::new("::1", 8333));
        for bad in ["127.0.0.1", ":8333", "127.0.0.1:", "127.0.0.1:99999", "127.0.0.1:0", "::1:8333", "a b:1"] {
            assert!(bad.parse::<Endpoint>().is_err(), "{bad} should be rejected");
        }
        assert_eq!(
            "seed.example".parse::<Endpoint>().unwrap_err(),
            ParseEndpointError("seed.example".into())
        );
        assert_eq!(
            "seed.example".parse::<Endpoint>().unwrap_err().to_string(),
            "invalid endpoint 'seed.example' (expected host:port)"
        );
    }

    #[test]
    fn endpoint_display() {
        assert_eq!(Endpoint::new("::1", 8333).to_string(), "[::1]:8333");
        assert_eq!(Endpoint::new("10.0.0.2", 18444).to_string(), "10.0.0.2:18444");
    }

    #[test]
    fn list_with_trailing_comma_and_whitespace() {
        let eps = parse_ip_list(" 127.0.0.1:18444 , 127.0.0. 1:18445,");
        assert_eq!(
            eps,
            vec![Endpoint::new("127.0.0.1", 18444), Endpoint::new("127.0.0.1", 18445)]
        );
    }

    #[test]
    fn single_entry_list() {
        assert_eq!(parse_ip_list("10.1.2.3:8333"), vec![Endpoint::new("10.1.2.3", 8333)]);
    }

    #[test]
    fn malformed_and_overlong_tokens_are_dropped() {
        let long_host = "a".repeat(MAX_ENDPOINT_LEN);
        let list = format!("garbage,,{}:1,10.0.0.1:8333,10.0.0.1:8333", long_host);
        assert_eq!(parse_ip_list(&list), vec![Endpoint::new("10.0.0.1", 8333)]);
        assert!(parse_ip_list(" , ,").is_empty());
    }

    #[tokio::test]
    async fn empty_explicit_list_is_an_error() {
        let src = PeerSource::Explicit(" ,".into());
        assert!(matches!(src.resolve(&MAINNET).await, Err(PeerSourceError::NoPeers)));
    }

    #[tokio::test]
    async fn dns_mode_without_seed_fails_before_lookup() {
        let src = PeerSource::from_ips(None);
        assert!(matches!(src.resolve(&REGTEST).await, Err(PeerSourceError::NoDnsSeed("regtest"))));

        let blank = ChainParams { dns_seeds: &[""], ..MAINNET };
        assert!(matches!(src.resolve(&blank).await, Err(PeerSourceError::NoDnsSeed(_))));
    }

    #[tokio::test]
    async fn localhost_seed_resolves_to_ipv4() {
        let eps = resolve_seed("localhost", 18444).await.unwrap();
        assert!(eps.iter().all(|e| e.port == 18444 && e.host.parse::<std::net::Ipv4Addr>().is_ok()));
    }
}
