use clap::Parser;
use contflood_health::{init_tracing, serve, ServerConfig};
use std::path::PathBuf;

/// gRPC health endpoint that reports its own CPU and memory usage.
#[derive(Debug, Parser)]
#[command(name = "health_server", version)]
struct Args {
    /// Port to listen on
    #[arg(long, default_value_t = 8443)]
    port: u16,

    /// PEM certificate chain
    #[arg(long, default_value = "./certs/server.crt")]
    cert: PathBuf,

    /// PEM private key
    #[arg(long, default_value = "./certs/server.key")]
    key: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing();

    serve(ServerConfig {
        port: args.port,
        cert: args.cert,
        key: args.key,
    })
    .await
}
