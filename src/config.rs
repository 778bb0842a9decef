// src/config.rs
// Broadcast settings and their validation

use std::time::Duration;

use tracing::{info, warn};

use crate::chain::ChainParams;
use crate::error::ConfigError;
use crate::network::GroupConfig;

pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
pub const MAX_PEERS_TO_CONNECT: usize = 6;
pub const MAX_PEERS_TO_INV: usize = 2;

/// Which inv announcements count as sightings of the transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SightingPolicy {
    /// Any peer announcing the txid, including ones we informed.
    AnyPeer,
    /// Only peers we did not send an inv to.
    #[default]
    NonInvedOnly,
}

#[derive(Debug, Clone)]
pub struct BroadcastConfig {
    /// Per-peer deadline, measured from the start of its TCP connect.
    pub timeout: Duration,
    pub debug: bool,
    pub max_peers_to_connect: usize,
    pub max_peers_to_inv: usize,
    pub sighting_policy: SightingPolicy,
    pub tick_interval: Duration,
    pub connect_timeout: Duration,
    pub ping_interval: Duration,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            debug: false,
            max_peers_to_connect: MAX_PEERS_TO_CONNECT,
            max_peers_to_inv: MAX_PEERS_TO_INV,
            sighting_policy: SightingPolicy::default(),
            tick_interval: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(10),
            ping_interval: Duration::from_secs(180),
        }
    }
}

impl BroadcastConfig {
    pub fn with_timeout_secs(secs: u64) -> Self {
        Self { timeout: Duration::from_secs(secs), ..Self::default() }
    }

    pub fn validate(&self) -> ConfigValidation {
        let mut validation = ConfigValidation::default();

        if self.timeout.is_zero() {
            validation.add_error(ConfigError::ZeroTimeout);
        } else if self.timeout > Duration::from_secs(600) {
            validation.add_warning(format!(
                "timeout of {}s is long; every peer stays connected until it expires or is done",
                self.timeout.as_secs()
            ));
        }
        if self.max_peers_to_connect == 0 {
            validation.add_error(ConfigError::Zero("max_peers_to_connect"));
        }
        if self.tick_interval.is_zero() {
            validation.add_error(ConfigError::Zero("tick_interval"));
        }
        if self.max_peers_to_inv >= self.max_peers_to_connect {
            validation.add_warning(
                "every connected peer gets an inv; sightings cannot be told apart from echoes".into(),
            );
        }
        validation
    }

    pub fn group_config(&self, chain: &ChainParams) -> GroupConfig {
        GroupConfig {
            magic: chain.magic,
            desired_connections: self.max_peers_to_connect,
            tick_interval: self.tick_interval,
            connect_timeout: self.connect_timeout,
            ping_interval: self.ping_interval,
        }
    }
}

/// Outcome of [`BroadcastConfig::validate`].
#[derive(Debug, Default)]
pub struct ConfigValidation {
    pub warnings: Vec<String>,
    pub errors: Vec<ConfigError>,
}

impl ConfigValidation {
    fn add_warning(&mut self, msg: String) {
        self.warnings.push(msg);
    }

    fn add_error(&mut self, err: ConfigError) {
        self.errors.push(err);
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn log_summary(&self) {
        for w in &self.warnings {
            warn!("config: {}", w);
        }
        if self.is_valid() && self.warnings.is_empty() {
            info!("configuration ok");
        }
    }

    /// First error, if any.
    pub fn into_result(self) -> Result<(), ConfigError> {
        match self.errors.into_iter().next() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
