use async_trait::async_trait;
use http::Uri;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

/// A byte stream that can carry HTTP/2 frames, whether TLS over TCP or an in-memory pipe.
pub trait RawStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> RawStream for T {}

pub type FloodStream = Box<dyn RawStream>;

#[derive(Debug, Error)]
pub enum TargetError {
    #[error("failed to parse URL {url:?}: {source}")]
    Invalid {
        url: String,
        #[source]
        source: http::uri::InvalidUri,
    },
    #[error("unsupported scheme {0:?}, only https is dialed with ALPN h2")]
    UnsupportedScheme(String),
    #[error("URL {0:?} has no host")]
    MissingHost(String),
}

/// The endpoint under test, resolved once from the `--url` flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub url: String,
    /// Host as dialed (IPv6 literals without brackets).
    pub host: String,
    pub port: u16,
    /// Value of the `:authority` pseudo-header, as written in the URL.
    pub authority: String,
    /// Value of the `:path` pseudo-header.
    pub path: String,
}

impl Target {
    pub fn parse(url: &str) -> Result<Self, TargetError> {
        let uri: Uri = url.parse().map_err(|source| TargetError::Invalid {
            url: url.to_string(),
            source,
        })?;

        let scheme = uri.scheme_str().unwrap_or_default();
        if scheme != "https" {
            return Err(TargetError::UnsupportedScheme(scheme.to_string()));
        }

        let authority = uri
            .authority()
            .ok_or_else(|| TargetError::MissingHost(url.to_string()))?;
        let host = authority
            .host()
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();
        if host.is_empty() {
            return Err(TargetError::MissingHost(url.to_string()));
        }

        let path = uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .filter(|pq| !pq.is_empty())
            .unwrap_or("/")
            .to_string();

        Ok(Self {
            url: url.to_string(),
            host,
            port: authority.port_u16().unwrap_or(443),
            authority: authority.as_str().to_string(),
            path,
        })
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.url)
    }
}

/// Opens the byte stream a driver floods. Production dials TLS with ALPN `h2`;
/// tests hand out in-memory pipes wired to a scripted peer.
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(&self, target: &Target) -> anyhow::Result<FloodStream>;
}
