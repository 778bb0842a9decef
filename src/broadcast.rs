// src/broadcast.rs
//! One-shot broadcast of a transaction to a handful of peers.

mod context;
mod engine;
mod report;

pub use context::{BroadcastContext, Counter};
pub use engine::BroadcastEngine;
pub use report::Summary;

use std::future::Future;

use tracing::warn;

use crate::chain::ChainParams;
use crate::config::BroadcastConfig;
use crate::error::{BroadcastError, PeerSourceError};
use crate::network::PeerGroup;
use crate::peers::{Endpoint, PeerSource};
use crate::tx::BroadcastTx;

/// Announce `tx` to peers from `source` and serve it to those that ask.
///
/// Configuration and peer source errors are returned before any socket is
/// opened. Once the peer group runs, per-peer failures only show up in the
/// returned counters. Ctrl-C disconnects every peer and ends the run early.
pub async fn broadcast(
    chain: &ChainParams,
    tx: &BroadcastTx,
    source: &PeerSource,
    config: &BroadcastConfig,
) -> Result<Summary, BroadcastError> {
    check_config(config)?;
    let endpoints = source.resolve(chain).await?;
    Ok(run_group(chain, tx, endpoints, config, ctrl_c()).await)
}

/// Same as [`broadcast`] with already resolved endpoints and a caller
/// supplied shutdown future in place of Ctrl-C.
pub async fn broadcast_until<F>(
    chain: &ChainParams,
    tx: &BroadcastTx,
    endpoints: Vec<Endpoint>,
    config: &BroadcastConfig,
    shutdown: F,
) -> Result<Summary, BroadcastError>
where
    F: Future<Output = ()>,
{
    check_config(config)?;
    if endpoints.is_empty() {
        return Err(PeerSourceError::NoPeers.into());
    }
    Ok(run_group(chain, tx, endpoints, config, shutdown).await)
}

fn check_config(config: &BroadcastConfig) -> Result<(), BroadcastError> {
    let validation = config.validate();
    validation.log_summary();
    Ok(validation.into_result()?)
}

async fn run_group<F>(
    chain: &ChainParams,
    tx: &BroadcastTx,
    endpoints: Vec<Endpoint>,
    config: &BroadcastConfig,
    shutdown: F,
) -> Summary
where
    F: Future<Output = ()>,
{
    println!("Start broadcasting process with timeout of {} seconds", config.timeout.as_secs());
    tracing::info!(chain = %chain, txid = %tx.txid(), peers = endpoints.len(), "broadcasting");

    let mut engine = BroadcastEngine::new(BroadcastContext::new(tx, config), config.sighting_policy);
    let mut group = PeerGroup::new(config.group_config(chain));
    for endpoint in endpoints {
        group.add_endpoint(endpoint);
    }

    println!("Trying to connect to nodes...");
    group.run_until(&mut engine, shutdown).await;
    engine.summary()
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("unable to listen for shutdown signal: {}", e);
        futures::future::pending::<()>().await;
    }
}
