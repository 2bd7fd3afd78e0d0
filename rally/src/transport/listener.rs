use crate::error::{RallyError, Result};
use crate::transport::tls::{LocalityIdentity, SERVER_NAME, client_config};
use std::net::SocketAddr;

/// A QUIC endpoint that accepts connections from other localities and can
/// open connections to them.
pub struct TransportListener {
    endpoint: quinn::Endpoint,
    local_addr: SocketAddr,
}

impl TransportListener {
    /// Bind on `addr` with a fresh self-signed certificate.
    pub fn bind(addr: SocketAddr) -> Result<Self> {
        let server_config = LocalityIdentity::self_signed()?.server_config()?;

        let mut endpoint = quinn::Endpoint::server(server_config, addr)
            .map_err(|e| RallyError::transport_with_source(format!("bind {addr}"), e))?;
        endpoint.set_default_client_config(client_config()?);

        let local_addr = endpoint
            .local_addr()
            .map_err(|e| RallyError::transport_with_source("local_addr", e))?;

        Ok(Self {
            endpoint,
            local_addr,
        })
    }

    /// Accept the next incoming connection.
    pub async fn accept(&self) -> Result<quinn::Connection> {
        let incoming = self
            .endpoint
            .accept()
            .await
            .ok_or_else(|| RallyError::transport("endpoint closed"))?;

        incoming
            .await
            .map_err(|e| RallyError::transport_with_source("accept", e))
    }

    /// Open a connection to another locality's listener.
    pub async fn connect(&self, addr: SocketAddr) -> Result<quinn::Connection> {
        let connecting = self
            .endpoint
            .connect(addr, SERVER_NAME)
            .map_err(|e| RallyError::transport_with_source(format!("connect {addr}"), e))?;
        connecting
            .await
            .map_err(|e| RallyError::transport_with_source(format!("handshake with {addr}"), e))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn endpoint(&self) -> &quinn::Endpoint {
        &self.endpoint
    }
}
