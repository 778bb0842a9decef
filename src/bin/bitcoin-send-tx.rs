// src/bin/bitcoin-send-tx.rs
use anyhow::{anyhow, Context};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use btc_send_tx::config::DEFAULT_TIMEOUT_SECS;
use btc_send_tx::{broadcast, decode_tx_hex, BroadcastConfig, Chain, PeerSource, SightingPolicy};

const EXAMPLES: &str = "\
Examples:
Send a TX to random peers on testnet:
> bitcoin-send-tx --testnet <txhex>

Send a TX to specific peers on mainnet:
> bitcoin-send-tx -i 127.0.0.1:8333,192.168.0.1:8333 <txhex>";

#[derive(Parser, Debug)]
#[command(name = "bitcoin-send-tx", author, version, about, after_help = EXAMPLES)]
struct Cli {
    /// Signed transaction, hex encoded
    #[arg(value_name = "TXHEX")]
    txhex: String,

    /// Use testnet
    #[arg(short, long, conflicts_with = "regtest")]
    testnet: bool,

    /// Use regtest
    #[arg(short, long)]
    regtest: bool,

    /// Comma separated host:port list to use instead of the DNS seed
    #[arg(short, long, value_name = "IP,IP,...", env = "BITCOIN_SEND_TX_IPS")]
    ips: Option<String>,

    /// Verbose per-peer logging
    #[arg(short, long)]
    debug: bool,

    /// Seconds each peer may stay connected
    #[arg(short = 's', long, value_name = "SECS", default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout: u64,

    /// Also count announcements from peers we informed ourselves
    #[arg(long)]
    count_echoes: bool,
}

impl Cli {
    fn chain(&self) -> Chain {
        if self.testnet {
            Chain::Testnet
        } else if self.regtest {
            Chain::Regtest
        } else {
            Chain::Mainnet
        }
    }

    fn broadcast_config(&self) -> BroadcastConfig {
        let mut config = BroadcastConfig::with_timeout_secs(self.timeout);
        config.debug = self.debug;
        if self.count_echoes {
            config.sighting_policy = SightingPolicy::AnyPeer;
        }
        config
    }
}

fn init_logging(debug: bool) -> anyhow::Result<()> {
    let default = if debug { "btc_send_tx=debug,info" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default))
        .context("invalid log filter")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow!("failed to initialise logging: {}", e))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug)?;

    let tx = decode_tx_hex(&cli.txhex)?;
    let chain = cli.chain().params();
    let source = PeerSource::from_ips(cli.ips.clone());
    let config = cli.broadcast_config();

    let summary = broadcast(chain, &tx, &source, &config).await?;
    println!("\n\n{}", summary);
    Ok(())
}
