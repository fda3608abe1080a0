//! Low-level connection setup: name resolution, TCP dial, TLS handshake.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rustls::client::WebPkiServerVerifier;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio::net::{TcpStream, lookup_host};
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::types::Endpoint;

/// Strips the brackets an IPv6 literal may carry in user input.
fn bare_host(host: &str) -> &str {
    host.strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host)
}

/// Resolves the endpoint and returns the first address.
async fn resolve(endpoint: &Endpoint) -> Result<SocketAddr> {
    let host = bare_host(&endpoint.host);
    let resolve_error = |source| Error::Resolve {
        host: host.to_string(),
        source,
    };

    let mut addrs = lookup_host((host, endpoint.port))
        .await
        .map_err(resolve_error)?;
    addrs.next().ok_or_else(|| {
        resolve_error(io::Error::new(
            io::ErrorKind::NotFound,
            "no addresses returned",
        ))
    })
}

async fn dial(endpoint: &Endpoint) -> Result<TcpStream> {
    let addr = resolve(endpoint).await?;
    debug!(%addr, "dialling");
    TcpStream::connect(addr)
        .await
        .map_err(|source| Error::Connect {
            endpoint: endpoint.to_string(),
            source,
        })
}

/// Connects over plain TCP, without a connect timeout.
///
/// # Errors
///
/// Returns an error if the host does not resolve or the connection fails.
pub async fn connect_plain(endpoint: &Endpoint) -> Result<TcpStream> {
    dial(endpoint).await
}

/// Connects with implicit TLS.
///
/// The TCP connect (resolution included) and the TLS handshake are each
/// bounded by `connect_timeout`. The server certificate is checked against
/// the endpoint's host name.
///
/// # Errors
///
/// Returns an error if the connection times out or fails, if the host is not
/// a valid server name, or if the handshake is rejected.
pub async fn connect_tls(
    endpoint: &Endpoint,
    connect_timeout: Duration,
    config: Arc<ClientConfig>,
) -> Result<TlsStream<TcpStream>> {
    let tcp = timeout(connect_timeout, dial(endpoint))
        .await
        .map_err(|_| Error::ConnectTimeout {
            endpoint: endpoint.to_string(),
            timeout: connect_timeout,
        })??;

    let host = bare_host(&endpoint.host);
    let server_name = ServerName::try_from(host.to_string())
        .map_err(|_| Error::InvalidServerName(host.to_string()))?;

    let handshake_error = |source| Error::Handshake {
        host: host.to_string(),
        source,
    };
    // A failed handshake drops the TCP stream with it
    let tls = timeout(
        connect_timeout,
        TlsConnector::from(config).connect(server_name, tcp),
    )
    .await
    .map_err(|_| {
        handshake_error(io::Error::new(
            io::ErrorKind::TimedOut,
            "handshake timed out",
        ))
    })?
    .map_err(handshake_error)?;

    Ok(tls)
}

/// Creates the default TLS client configuration: webpki trust anchors,
/// rejected certificates logged.
///
/// # Errors
///
/// Returns an error if the certificate verifier cannot be built.
pub fn default_tls_config() -> Result<Arc<ClientConfig>> {
    let root_store = RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };
    tls_config_with_roots(root_store)
}

/// Creates a TLS client configuration trusting exactly `roots`.
///
/// # Errors
///
/// Returns an error if the certificate verifier cannot be built (for
/// example, when `roots` is empty).
pub fn tls_config_with_roots(roots: RootCertStore) -> Result<Arc<ClientConfig>> {
    let verifier = LoggingVerifier::new(roots)?;
    let config = ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(verifier))
        .with_no_client_auth();
    Ok(Arc::new(config))
}

/// Standard webpki verification that logs why a certificate was refused.
///
/// Accepts only when verification reports no error at all; expiry, an
/// unknown issuer or a name mismatch each reject the handshake.
#[derive(Debug)]
struct LoggingVerifier {
    inner: Arc<WebPkiServerVerifier>,
}

impl LoggingVerifier {
    fn new(roots: RootCertStore) -> Result<Self> {
        let inner = WebPkiServerVerifier::builder(Arc::new(roots))
            .build()
            .map_err(|e| Error::Tls(rustls::Error::General(e.to_string())))?;
        Ok(Self { inner })
    }
}

impl ServerCertVerifier for LoggingVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        self.inner
            .verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now)
            .inspect_err(|err| {
                warn!(server = ?server_name, error = %err, "server certificate rejected");
            })
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::similar_names
)]
mod tests {
    use super::*;

    fn self_signed(name: &str) -> CertificateDer<'static> {
        let rcgen::CertifiedKey { cert, .. } =
            rcgen::generate_simple_self_signed(vec![name.to_string()]).unwrap();
        cert.der().clone()
    }

    fn verify(verifier: &LoggingVerifier, cert: &CertificateDer<'_>, name: &str) -> bool {
        let server_name = ServerName::try_from(name.to_string()).unwrap();
        verifier
            .verify_server_cert(cert, &[], &server_name, &[], UnixTime::now())
            .is_ok()
    }

    #[test]
    fn test_bare_host() {
        assert_eq!(bare_host("[::1]"), "::1");
        assert_eq!(bare_host("::1"), "::1");
        assert_eq!(bare_host("smtp.test"), "smtp.test");
    }

    #[test]
    fn test_default_tls_config() {
        assert!(default_tls_config().is_ok());
    }

    #[test]
    fn test_empty_root_store_is_an_error() {
        assert!(tls_config_with_roots(RootCertStore::empty()).is_err());
    }

    #[test]
    fn test_untrusted_certificate_rejected() {
        let root_store = RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        };
        let verifier = LoggingVerifier::new(root_store).unwrap();
        let cert = self_signed("smtp.test");
        assert!(!verify(&verifier, &cert, "smtp.test"));
    }

    #[test]
    fn test_garbage_certificate_rejected() {
        let root_store = RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        };
        let verifier = LoggingVerifier::new(root_store).unwrap();
        let cert = CertificateDer::from(vec![0x30, 0x03, 0x02, 0x01, 0x00]);
        assert!(!verify(&verifier, &cert, "smtp.test"));
    }

    #[test]
    fn test_trusted_certificate_checked_against_name() {
        let cert = self_signed("smtp.test");
        let mut roots = RootCertStore::empty();
        roots.add(cert.clone()).unwrap();
        let verifier = LoggingVerifier::new(roots).unwrap();

        assert!(verify(&verifier, &cert, "smtp.test"));
        assert!(!verify(&verifier, &cert, "other.test"));
    }

    #[tokio::test]
    async fn test_unresolvable_host() {
        let endpoint = Endpoint::new("host.invalid", 25);
        let err = connect_plain(&endpoint).await.unwrap_err();
        assert_eq!(err.kind(), crate::FailureKind::Connect);
    }
}
