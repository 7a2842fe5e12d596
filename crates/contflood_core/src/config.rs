use clap::Parser;
use contflood_traits::{Target, TargetError};
use std::time::Duration;

/// Floods HTTP/2 servers with CONTINUATION frames that never end the header block.
#[derive(Debug, Parser)]
#[command(name = "contflood", version)]
pub struct Cli {
    /// Server URL
    #[arg(long, default_value = "https://localhost:8443")]
    pub url: String,

    /// Number of concurrent connections
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    pub connections: u32,

    /// Number of seconds to keep sending CONTINUATION frames on each connection
    #[arg(long = "time-limit", default_value_t = 120)]
    pub time_limit: u64,

    /// Wait time in milliseconds between starting workers
    #[arg(long, default_value_t = 0)]
    pub wait: u64,

    /// Milliseconds to keep reading the server's reaction after the flood stops
    #[arg(long = "drain-ms", default_value_t = 1000)]
    pub drain_ms: u64,

    /// Verify the server certificate against the webpki roots
    #[arg(long = "verify-certs")]
    pub verify_certs: bool,

    /// Verbose output
    #[arg(long)]
    pub verbose: bool,
}

/// Immutable run configuration, shared by every driver.
#[derive(Debug, Clone)]
pub struct FloodConfig {
    pub target: Target,
    pub connections: usize,
    pub time_limit: Duration,
    pub launch_delay: Duration,
    pub drain_grace: Duration,
    pub verify_certs: bool,
    pub verbose: bool,
}

impl FloodConfig {
    pub fn new(target: Target) -> Self {
        Self {
            target,
            connections: 1,
            time_limit: Duration::from_secs(120),
            launch_delay: Duration::ZERO,
            drain_grace: Duration::from_secs(1),
            verify_certs: false,
            verbose: false,
        }
    }
}

impl TryFrom<Cli> for FloodConfig {
    type Error = TargetError;

    fn try_from(cli: Cli) -> Result<Self, Self::Error> {
        Ok(Self {
            target: Target::parse(&cli.url)?,
            connections: cli.connections as usize,
            time_limit: Duration::from_secs(cli.time_limit),
            launch_delay: Duration::from_millis(cli.wait),
            drain_grace: Duration::from_millis(cli.drain_ms),
            verify_certs: cli.verify_certs,
            verbose: cli.verbose,
        })
    }
}
