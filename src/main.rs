//! Main entry point for a replica node.
//!
//! Speaks newline-delimited JSON on stdin/stdout; logs go to stderr.
//! Configuration comes from the file named by `CRDT_GOSSIP_CONFIG` and
//! `CRDT_GOSSIP_*` environment variables.

use tokio::io::BufReader;
use tracing::info;

use crdt_gossip::node::runtime;
use crdt_gossip::{config, logging};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = config::load()?;
    logging::init_logging(&config.log)?;

    info!(
        workload = config.workload.as_str(),
        interval = ?config.gossip.interval(config.workload),
        fanout = ?config.gossip.fanout,
        "Starting crdt-gossip node"
    );

    runtime::run(config, BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await?;
    Ok(())
}
