use crate::transport::TransportBuilder;
use anyhow::{Context, Result};
use async_trait::async_trait;
use contflood_traits::{Dialer, FloodStream, Target};
use std::sync::Arc;
use std::time::SystemTime;
use tokio_rustls::rustls::client::{ServerCertVerified, ServerCertVerifier};
use tokio_rustls::rustls::{
    Certificate, ClientConfig, OwnedTrustAnchor, RootCertStore, ServerName,
};
use tokio_rustls::TlsConnector;

pub const ALPN_H2: &[u8] = b"h2";

/// Accepts whatever certificate the server presents. Test servers for this
/// tool run on self-signed certificates.
struct AcceptAnyServerCert;

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &Certificate,
        _intermediates: &[Certificate],
        _server_name: &ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: SystemTime,
    ) -> Result<ServerCertVerified, tokio_rustls::rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }
}

/// Dials TCP, then negotiates TLS offering only `h2` via ALPN.
pub struct TlsDialer {
    connector: TlsConnector,
}

impl TlsDialer {
    pub fn new(verify_certs: bool) -> Self {
        let builder = ClientConfig::builder().with_safe_defaults();

        let mut config = if verify_certs {
            let mut root_store = RootCertStore::empty();
            root_store.add_trust_anchors(webpki_roots::TLS_SERVER_ROOTS.iter().map(|ta| {
                OwnedTrustAnchor::from_subject_spki_name_constraints(
                    ta.subject,
                    ta.spki,
                    ta.name_constraints,
                )
            }));
            builder
                .with_root_certificates(root_store)
                .with_no_client_auth()
        } else {
            builder
                .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert))
                .with_no_client_auth()
        };
        config.alpn_protocols = vec![ALPN_H2.to_vec()];

        Self {
            connector: TlsConnector::from(Arc::new(config)),
        }
    }
}

#[async_trait]
impl Dialer for TlsDialer {
    async fn dial(&self, target: &Target) -> Result<FloodStream> {
        let tcp = TransportBuilder::connect_host(&target.host, target.port).await?;

        let domain = ServerName::try_from(target.host.as_str())
            .with_context(|| format!("invalid TLS server name {:?}", target.host))?;
        let tls = self
            .connector
            .connect(domain, tcp)
            .await
            .with_context(|| format!("TLS handshake with {}", target.authority))?;

        let (_, session) = tls.get_ref();
        match session.alpn_protocol() {
            Some(ALPN_H2) => {}
            Some(other) => tracing::warn!(
                "{} negotiated ALPN {:?} instead of h2",
                target.authority,
                String::from_utf8_lossy(other)
            ),
            None => tracing::warn!("{} did not negotiate ALPN, sending h2 anyway", target.authority),
        }

        Ok(Box::new(tls))
    }
}
