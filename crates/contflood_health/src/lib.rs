pub mod sampler;
pub mod service;
pub mod ticker;

pub mod proto {
    tonic::include_proto!("health");

    pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("health_descriptor");
}

use anyhow::{Context, Result};
use proto::health_service_server::HealthServiceServer;
use service::HealthProbe;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use tonic::transport::{Identity, Server, ServerTlsConfig};
use tracing::info;

/// Where and with which identity the health service listens.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub cert: PathBuf,
    pub key: PathBuf,
}

impl ServerConfig {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port))
    }
}

pub async fn load_identity(config: &ServerConfig) -> Result<Identity> {
    let cert = tokio::fs::read(&config.cert)
        .await
        .with_context(|| format!("failed to read certificate {}", config.cert.display()))?;
    let key = tokio::fs::read(&config.key)
        .await
        .with_context(|| format!("failed to read private key {}", config.key.display()))?;
    Ok(Identity::from_pem(cert, key))
}

/// Serves the health check and reflection over TLS until the process exits,
/// with the CPU ticker running alongside.
pub async fn serve(config: ServerConfig) -> Result<()> {
    let identity = load_identity(&config).await?;

    let reflection = tonic_reflection::server::Builder::configure()
        .register_encoded_file_descriptor_set(proto::FILE_DESCRIPTOR_SET)
        .build()
        .context("failed to build the reflection service")?;

    tokio::spawn(ticker::run_cpu_ticker(ticker::TICK_PERIOD));

    let addr = config.addr();
    info!("Starting gRPC server on port {}", config.port);
    Server::builder()
        .tls_config(ServerTlsConfig::new().identity(identity))
        .context("failed to create credentials")?
        .add_service(HealthServiceServer::new(HealthProbe::new()))
        .add_service(reflection)
        .serve(addr)
        .await
        .with_context(|| format!("failed to serve on {addr}"))?;

    Ok(())
}

pub fn init_tracing() {
    tracing_subscriber::fmt().with_target(false).init();
}
