use quinn::{Connection, Endpoint as QuinnEndpoint};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

/// Name presented in the self-signed certificate and used when dialing
const SERVER_NAME: &str = "dirnet.local";

/// QUIC endpoint that both accepts and dials mesh connections
pub struct Endpoint {
    inner: QuinnEndpoint,
    local_addr: SocketAddr,
}

impl Endpoint {
    /// Bind a new endpoint
    pub fn bind(bind_addr: SocketAddr) -> Result<Self, TransportError> {
        let server_config = Self::server_config()?;
        let client_config = Self::client_config()?;

        let mut endpoint = QuinnEndpoint::server(server_config, bind_addr)
            .map_err(|e| TransportError::BindFailed(e.to_string()))?;
        endpoint.set_default_client_config(client_config);

        let local_addr = endpoint.local_addr()?;

        Ok(Self {
            inner: endpoint,
            local_addr,
        })
    }

    fn transport_config() -> quinn::TransportConfig {
        let mut transport = quinn::TransportConfig::default();
        transport.max_idle_timeout(Some(quinn::IdleTimeout::from(quinn::VarInt::from_u32(
            60_000,
        ))));
        transport.keep_alive_interval(Some(Duration::from_secs(5)));
        transport.max_concurrent_bidi_streams(0u32.into());
        transport.max_concurrent_uni_streams(256u32.into());
        transport
    }

    /// Server configuration with a freshly generated self-signed certificate
    fn server_config() -> Result<quinn::ServerConfig, TransportError> {
        let cert = rcgen::generate_simple_self_signed(vec![SERVER_NAME.to_string()])
            .map_err(|e| TransportError::CertGeneration(e.to_string()))?;

        let cert_chain = vec![rustls::pki_types::CertificateDer::from(cert.cert.der().to_vec())];
        let key = rustls::pki_types::PrivateKeyDer::try_from(cert.key_pair.serialize_der())
            .map_err(|e| TransportError::CertGeneration(format!("Invalid key: {}", e)))?;

        let crypto = rustls::ServerConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()
        .map_err(|e| TransportError::ConfigCreation(e.to_string()))?
        .with_no_client_auth()
        .with_single_cert(cert_chain, key)
        .map_err(|e| TransportError::ConfigCreation(e.to_string()))?;

        let quic = quinn::crypto::rustls::QuicServerConfig::try_from(crypto)
            .map_err(|e| TransportError::ConfigCreation(e.to_string()))?;

        let mut server_config = quinn::ServerConfig::with_crypto(Arc::new(quic));
        server_config.transport_config(Arc::new(Self::transport_config()));

        Ok(server_config)
    }

    /// Client configuration
    ///
    /// Peers present throwaway certificates, so the server certificate is
    /// not checked; room membership is enforced by the frame topic.
    fn client_config() -> Result<quinn::ClientConfig, TransportError> {
        let crypto = rustls::ClientConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()
        .map_err(|e| TransportError::ConfigCreation(e.to_string()))?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(SkipServerVerification))
        .with_no_client_auth();

        let quic = quinn::crypto::rustls::QuicClientConfig::try_from(crypto)
            .map_err(|e| TransportError::ConfigCreation(e.to_string()))?;

        let mut client_config = quinn::ClientConfig::new(Arc::new(quic));
        client_config.transport_config(Arc::new(Self::transport_config()));

        Ok(client_config)
    }

    /// Dial a remote peer
    pub async fn connect(&self, addr: SocketAddr) -> Result<Connection, TransportError> {
        let connecting = self
            .inner
            .connect(addr, SERVER_NAME)
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        connecting
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))
    }

    /// Wait for the next inbound connection
    pub async fn accept(&self) -> Result<Connection, TransportError> {
        let incoming = self.inner.accept().await.ok_or(TransportError::Closed)?;

        incoming
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))
    }

    /// Local address, with an unspecified IP replaced by loopback
    pub fn local_addr(&self) -> SocketAddr {
        let mut addr = self.local_addr;
        if addr.ip().is_unspecified() {
            addr.set_ip(std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST));
        }
        addr
    }

    pub fn close(&self) {
        self.inner.close(0u32.into(), b"shutdown");
    }
}

#[derive(Debug)]
struct SkipServerVerification;

impl rustls::client::danger::ServerCertVerifier for SkipServerVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// Transport errors
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Failed to bind to address: {0}")]
    BindFailed(String),

    #[error("Failed to generate certificate: {0}")]
    CertGeneration(String),

    #[error("Failed to create config: {0}")]
    ConfigCreation(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Frame too large: {0} bytes")]
    FrameTooLarge(usize),

    #[error("Endpoint is closed")]
    Closed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
