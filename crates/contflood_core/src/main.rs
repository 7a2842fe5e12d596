use clap::Parser;
use contflood_core::config::{Cli, FloodConfig};
use contflood_core::{init_tracing, run};

/// Sockets beyond the flood connections: stdio, resolver, runtime internals.
const FD_HEADROOM: u64 = 64;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = FloodConfig::try_from(Cli::parse())?;
    init_tracing(config.verbose);

    let wanted = config.connections as u64 + FD_HEADROOM;
    match rlimit::increase_nofile_limit(wanted) {
        Ok(limit) if limit < wanted => tracing::warn!(
            "open file limit is {}, fewer than the {} needed for {} connections",
            limit,
            wanted,
            config.connections
        ),
        Ok(_) => {}
        Err(e) => tracing::warn!("could not raise the open file limit: {}", e),
    }

    let summary = run(config).await?;
    println!("{summary}");

    Ok(())
}
