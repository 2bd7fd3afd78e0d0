use crate::error::{RallyError, Result};
use crate::protocol::RallyMessage;
use crate::protocol::codec::encode_message;
use crate::types::{Priority, Site};

/// Stream type tag: first byte on every QUIC uni stream.
pub(crate) const STREAM_TAG_FRAMED: u8 = 0x01;

/// Send side of a connection to one remote locality.
///
/// Every message goes out on its own unidirectional stream so that a large
/// action payload never blocks a small reply behind it. Receiving is done
/// by `PeerRouter`.
pub struct PeerConnection {
    pub site: Site,
    pub(crate) conn: quinn::Connection,
}

impl PeerConnection {
    pub fn new(site: Site, conn: quinn::Connection) -> Self {
        Self { site, conn }
    }

    /// Send a framed message on a fresh uni stream scheduled at `priority`.
    pub async fn send_message(&self, msg: &RallyMessage, priority: Priority) -> Result<()> {
        let buf = encode_message(msg, priority)?;
        let mut stream = self
            .conn
            .open_uni()
            .await
            .map_err(|e| RallyError::transport_with_source("open uni stream", e))?;
        stream
            .set_priority(priority.stream_priority())
            .map_err(|e| RallyError::transport_with_source("set stream priority", e))?;
        stream
            .write_all(&[STREAM_TAG_FRAMED])
            .await
            .map_err(|e| RallyError::transport_with_source("write stream tag", e))?;
        stream
            .write_all(&(buf.len() as u64).to_le_bytes())
            .await
            .map_err(|e| RallyError::transport_with_source("write length", e))?;
        stream
            .write_all(&buf)
            .await
            .map_err(|e| RallyError::transport_with_source("write payload", e))?;
        stream
            .finish()
            .map_err(|e| RallyError::transport_with_source("finish stream", e))?;
        Ok(())
    }

    pub fn remote_addr(&self) -> std::net::SocketAddr {
        self.conn.remote_address()
    }

    /// Close the underlying QUIC connection. Pending and future sends fail.
    pub fn close(&self, reason: &str) {
        self.conn.close(0u32.into(), reason.as_bytes());
    }
}
