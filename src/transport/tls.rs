//! TCP + TLS transport
//!
//! Printers present a self-signed certificate on the camera port, so by
//! default the certificate is not checked. That choice is carried in
//! [`TlsOptions::accept_invalid_certs`] and logged on every connection.

use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, warn};

use super::{Endpoint, Transport};
use crate::error::CameraError;

/// TLS settings for the camera connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TlsOptions {
    /// Skip server certificate verification
    pub accept_invalid_certs: bool,
}

impl TlsOptions {
    /// Settings that work with the printer's self-signed certificate
    pub fn device_default() -> Self {
        Self {
            accept_invalid_certs: true,
        }
    }

    /// Verify against the Mozilla root store
    pub fn verified() -> Self {
        Self {
            accept_invalid_certs: false,
        }
    }
}

/// Connects over TCP and upgrades to TLS
pub struct TlsTransport {
    endpoint: Endpoint,
    server_name: ServerName<'static>,
    connector: TlsConnector,
    options: TlsOptions,
}

impl TlsTransport {
    pub fn new(endpoint: Endpoint, options: TlsOptions) -> Result<Self, CameraError> {
        let server_name = ServerName::try_from(endpoint.host().to_string())
            .map_err(|_| CameraError::InvalidHost(endpoint.host().to_string()))?;

        let config = client_config(options).map_err(|e| {
            CameraError::Tls(std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
        })?;

        Ok(Self {
            endpoint,
            server_name,
            connector: TlsConnector::from(Arc::new(config)),
            options,
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn options(&self) -> TlsOptions {
        self.options
    }
}

impl Transport for TlsTransport {
    type Stream = TlsStream<TcpStream>;

    async fn connect(&self) -> Result<Self::Stream, CameraError> {
        debug!(endpoint = %self.endpoint, "Opening TCP connection");

        let tcp = TcpStream::connect((self.endpoint.host(), self.endpoint.port()))
            .await
            .map_err(CameraError::Connection)?;
        tcp.set_nodelay(true)?;

        if self.options.accept_invalid_certs {
            warn!(
                endpoint = %self.endpoint,
                "Certificate verification disabled for camera connection"
            );
        }

        let stream = self
            .connector
            .connect(self.server_name.clone(), tcp)
            .await
            .map_err(CameraError::Tls)?;

        debug!(endpoint = %self.endpoint, "TLS session established");

        Ok(stream)
    }

    fn describe(&self) -> String {
        self.endpoint.to_string()
    }
}

fn client_config(options: TlsOptions) -> Result<ClientConfig, rustls::Error> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let builder =
        ClientConfig::builder_with_provider(provider.clone()).with_safe_default_protocol_versions()?;

    let config = if options.accept_invalid_certs {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert(provider)))
            .with_no_client_auth()
    } else {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        builder.with_root_certificates(roots).with_no_client_auth()
    };

    Ok(config)
}

/// Accepts any server certificate, still checking handshake signatures
#[derive(Debug)]
struct AcceptAnyServerCert(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}
