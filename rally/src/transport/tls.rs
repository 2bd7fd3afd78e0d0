//! Cluster-internal TLS for the QUIC transport.
//!
//! Each listener presents a fresh self-signed certificate; connecting
//! localities accept any certificate, since every member of a cluster is
//! trusted.

use crate::error::{RallyError, Result};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use std::sync::Arc;

const ALPN: &[u8] = b"rally/1";

/// Server name every locality certificate is issued for.
pub(crate) const SERVER_NAME: &str = "rally.locality";

fn tls_err(e: impl std::fmt::Display) -> RallyError {
    RallyError::Tls(e.to_string())
}

fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

/// Certificate and key a listener presents to connecting localities.
pub(crate) struct LocalityIdentity {
    cert: CertificateDer<'static>,
    key: PrivateKeyDer<'static>,
}

impl LocalityIdentity {
    pub(crate) fn self_signed() -> Result<Self> {
        let key_pair = rcgen::KeyPair::generate().map_err(tls_err)?;
        let cert = rcgen::CertificateParams::new(vec![SERVER_NAME.to_owned()])
            .map_err(tls_err)?
            .self_signed(&key_pair)
            .map_err(tls_err)?;
        let key = PrivateKeyDer::try_from(key_pair.serialize_der()).map_err(tls_err)?;
        Ok(Self {
            cert: cert.der().clone(),
            key,
        })
    }

    pub(crate) fn server_config(self) -> Result<quinn::ServerConfig> {
        let mut tls = rustls::ServerConfig::builder_with_provider(provider())
            .with_protocol_versions(&[&rustls::version::TLS13])
            .map_err(tls_err)?
            .with_no_client_auth()
            .with_single_cert(vec![self.cert], self.key)
            .map_err(tls_err)?;
        tls.alpn_protocols = vec![ALPN.to_vec()];

        let crypto = quinn::crypto::rustls::QuicServerConfig::try_from(Arc::new(tls)).map_err(tls_err)?;
        Ok(quinn::ServerConfig::with_crypto(Arc::new(crypto)))
    }
}

/// Client configuration used to reach other localities.
pub(crate) fn client_config() -> Result<quinn::ClientConfig> {
    let provider = provider();
    let mut tls = rustls::ClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_protocol_versions(&[&rustls::version::TLS13])
        .map_err(tls_err)?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(TrustCluster(provider)))
        .with_no_client_auth();
    tls.alpn_protocols = vec![ALPN.to_vec()];

    let crypto = quinn::crypto::rustls::QuicClientConfig::try_from(Arc::new(tls)).map_err(tls_err)?;
    Ok(quinn::ClientConfig::new(Arc::new(crypto)))
}

/// Accepts every server certificate; handshake signatures are still
/// checked against the provider's algorithms.
#[derive(Debug)]
struct TrustCluster(Arc<CryptoProvider>);

impl ServerCertVerifier for TrustCluster {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}
