pub mod config;
pub mod driver;
pub mod fleet;
pub mod stats;

use anyhow::Result;
use config::FloodConfig;
use contflood_net::TlsDialer;
use fleet::{Fleet, FleetSummary};
use std::sync::Arc;
use tracing::Level;

pub fn init_tracing(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();
}

/// Dials the configured target over TLS and runs the whole fleet against it.
pub async fn run(config: FloodConfig) -> Result<FleetSummary> {
    let dialer = Arc::new(TlsDialer::new(config.verify_certs));
    let fleet = Fleet::new(config, dialer);
    Ok(fleet.run().await?)
}
