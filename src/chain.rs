// src/chain.rs
// Per-network constants for the bitcoin P2P protocol.

use std::fmt;

/// Static parameters distinguishing one bitcoin network from another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainParams {
    pub name: &'static str,
    /// Message start bytes, as they appear on the wire.
    pub magic: [u8; 4],
    pub default_port: u16,
    /// DNS seed domains; only the first one is queried.
    pub dns_seeds: &'static [&'static str],
}

pub const MAINNET: ChainParams = ChainParams {
    name: "main",
    magic: [0xf9, 0xbe, 0xb4, 0xd9],
    default_port: 8333,
    dns_seeds: &["seed.bitcoin.sipa.be", "dnsseed.bluematt.me"],
};

pub const TESTNET: ChainParams = ChainParams {
    name: "testnet3",
    magic: [0x0b, 0x11, 0x09, 0x07],
    default_port: 18333,
    dns_seeds: &["testnet-seed.bitcoin.jonasschnelli.ch", "seed.tbtc.petertodd.net"],
};

pub const REGTEST: ChainParams = ChainParams {
    name: "regtest",
    magic: [0xfa, 0xbf, 0xb5, 0xda],
    default_port: 18444,
    dns_seeds: &[],
};

impl ChainParams {
    /// First configured seed domain, if it is non-empty.
    pub fn first_seed(&self) -> Option<&'static str> {
        self.dns_seeds
            .first()
            .copied()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

impl fmt::Display for ChainParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (magic {}, port {})", self.name, hex::encode(self.magic), self.default_port)
    }
}

/// Network selection made by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Chain {
    #[default]
    Mainnet,
    Testnet,
    Regtest,
}

impl Chain {
    pub fn params(self) -> &'static ChainParams {
        match self {
            Chain::Mainnet => &MAINNET,
            Chain::Testnet => &TESTNET,
            Chain::Regtest => &REGTEST,
        }
    }
}
