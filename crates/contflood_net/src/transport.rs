use anyhow::{Context, Result};
use socket2::{Domain, Protocol, Socket, Type};
use std::net::SocketAddr;
use tokio::net::{lookup_host, TcpSocket, TcpStream};

pub struct TransportBuilder;

impl TransportBuilder {
    /// Resolves `host:port` and connects to the first address that answers.
    pub async fn connect_host(host: &str, port: u16) -> Result<TcpStream> {
        let mut last_err = None;
        for addr in lookup_host((host, port))
            .await
            .with_context(|| format!("resolving {host}:{port}"))?
        {
            match Self::connect(addr).await {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    tracing::debug!("connect to {} failed: {:#}", addr, e);
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("{host}:{port} resolved to no addresses")))
    }

    /// Pre-flight socket configuration happens before the SYN so every
    /// frame write leaves immediately instead of waiting on Nagle.
    pub async fn connect(addr: SocketAddr) -> Result<TcpStream> {
        let domain = if addr.is_ipv4() { Domain::IPV4 } else { Domain::IPV6 };

        let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
        socket.set_nodelay(true)?;
        socket.set_keepalive(true)?;
        socket.set_nonblocking(true)?;

        let std_stream: std::net::TcpStream = socket.into();
        let socket = TcpSocket::from_std_stream(std_stream);
        let stream = socket
            .connect(addr)
            .await
            .with_context(|| format!("connecting to {addr}"))?;

        Ok(stream)
    }
}
