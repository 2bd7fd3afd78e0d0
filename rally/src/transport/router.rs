use crate::error::{RallyError, Result};
use crate::protocol::RallyMessage;
use crate::protocol::codec::decode_message;
use crate::transport::connection::STREAM_TAG_FRAMED;
use crate::types::Site;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore, mpsc, oneshot};

/// Channel capacity of the request lane.
const LANE_CAPACITY: usize = 256;

/// Maximum number of concurrent in-flight stream reads per peer.
const MAX_CONCURRENT_STREAMS: usize = 512;

/// Maximum framed message size accepted by the router (1 GiB).
const MAX_MESSAGE_SIZE: u64 = 1024 * 1024 * 1024;

/// Reply waiters keyed by request id; `None` once the connection is gone,
/// so a late registration fails instead of waiting forever.
type WaiterMap = Arc<Mutex<Option<HashMap<u64, oneshot::Sender<RallyMessage>>>>>;

/// Demultiplexer running one receive loop per remote locality.
///
/// # Lanes
///
/// - **`rpc_requests`**: `Rpc` frames, consumed by the dispatcher.
/// - **rpc waiters**: `RpcResponse` / `RpcFault` frames, delivered to the
///   one-shot waiter registered for their `req_id`.
///
/// Control frames are handled inline: a `Goodbye` fails every outstanding
/// waiter for that peer.
pub struct PeerRouter {
    rpc_requests: Mutex<mpsc::Receiver<RallyMessage>>,
    rpc_waiters: WaiterMap,
}

#[derive(Clone)]
struct RouterSenders {
    site: Site,
    rpc_requests: mpsc::Sender<RallyMessage>,
    rpc_waiters: WaiterMap,
}

impl PeerRouter {
    /// Spawn the receive loop for `conn` (whose remote end is `site`).
    pub fn spawn(site: Site, conn: quinn::Connection) -> (Self, tokio::task::JoinHandle<()>) {
        let (req_tx, req_rx) = mpsc::channel(LANE_CAPACITY);
        let rpc_waiters: WaiterMap = Arc::new(Mutex::new(Some(HashMap::new())));

        let senders = RouterSenders {
            site,
            rpc_requests: req_tx,
            rpc_waiters: Arc::clone(&rpc_waiters),
        };
        let handle = tokio::spawn(accept_loop(conn, senders));

        let router = Self {
            rpc_requests: Mutex::new(req_rx),
            rpc_waiters,
        };
        (router, handle)
    }

    /// Register a oneshot waiter for a specific `req_id`.
    ///
    /// If the connection has already ended the returned receiver fails
    /// immediately.
    pub async fn register_rpc_waiter(&self, req_id: u64) -> oneshot::Receiver<RallyMessage> {
        let (tx, rx) = oneshot::channel();
        if let Some(waiters) = self.rpc_waiters.lock().await.as_mut() {
            waiters.insert(req_id, tx);
        }
        rx
    }

    pub async fn remove_rpc_waiter(&self, req_id: u64) {
        if let Some(waiters) = self.rpc_waiters.lock().await.as_mut() {
            waiters.remove(&req_id);
        }
    }

    /// Receive the next request from the `rpc_requests` lane.
    pub async fn recv_rpc_request(&self, site: Site) -> Result<RallyMessage> {
        self.rpc_requests
            .lock()
            .await
            .recv()
            .await
            .ok_or(RallyError::PeerDisconnected { site })
    }
}

async fn accept_loop(conn: quinn::Connection, tx: RouterSenders) {
    let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_STREAMS));

    loop {
        let stream = match conn.accept_uni().await {
            Ok(s) => s,
            Err(e) => {
                tracing::debug!(site = tx.site, "router: connection ended: {e}");
                tx.rpc_waiters.lock().await.take();
                return;
            }
        };

        let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
            return;
        };

        let tx = tx.clone();
        tokio::spawn(async move {
            if let Some(msg) = read_frame(stream, tx.site).await {
                dispatch_frame(msg, &tx).await;
            }
            drop(permit);
        });
    }
}

async fn dispatch_frame(msg: RallyMessage, tx: &RouterSenders) {
    match msg {
        RallyMessage::Rpc { .. } => {
            if tx.rpc_requests.send(msg).await.is_err() {
                tracing::warn!(site = tx.site, "router: rpc_requests receiver dropped");
            }
        }
        RallyMessage::RpcResponse { req_id, .. } | RallyMessage::RpcFault { req_id, .. } => {
            let waiter = tx
                .rpc_waiters
                .lock()
                .await
                .as_mut()
                .and_then(|waiters| waiters.remove(&req_id));
            match waiter {
                Some(waiter) => {
                    if waiter.send(msg).is_err() {
                        tracing::error!(site = tx.site, req_id, "router: rpc caller went away");
                    }
                }
                None => {
                    tracing::warn!(
                        site = tx.site,
                        req_id,
                        "router: reply with no registered waiter, discarding"
                    );
                }
            }
        }
        RallyMessage::Goodbye { site } => {
            tracing::info!(site, "router: peer is leaving");
            tx.rpc_waiters.lock().await.take();
        }
        RallyMessage::Hello { site, .. } => {
            tracing::warn!(site, "router: unexpected hello after handshake, ignoring");
        }
    }
}

/// Read one framed message from a uni stream: tag, length, frame.
pub(crate) async fn read_frame(mut stream: quinn::RecvStream, site: Site) -> Option<RallyMessage> {
    let mut tag_buf = [0u8; 1];
    if stream.read_exact(&mut tag_buf).await.is_err() {
        tracing::warn!(site, "router: failed to read stream tag, skipping stream");
        return None;
    }
    if tag_buf[0] != STREAM_TAG_FRAMED {
        tracing::warn!(
            site,
            "router: unknown stream tag 0x{:02x}, skipping stream",
            tag_buf[0]
        );
        return None;
    }

    let mut len_buf = [0u8; 8];
    if let Err(e) = stream.read_exact(&mut len_buf).await {
        tracing::warn!(site, "router: length read failed: {e}");
        return None;
    }
    let len = u64::from_le_bytes(len_buf);
    if len > MAX_MESSAGE_SIZE {
        tracing::warn!(site, "router: message too large ({len} bytes), skipping");
        return None;
    }

    let mut buf = vec![0u8; len as usize];
    if let Err(e) = stream.read_exact(&mut buf).await {
        tracing::warn!(site, "router: payload read failed: {e}");
        return None;
    }

    match decode_message(&buf) {
        Ok((header, msg)) => {
            tracing::trace!(site, priority = ?header.priority, len, "router: frame received");
            Some(msg)
        }
        Err(e) => {
            tracing::warn!(site, "router: frame decode failed: {e}");
            None
        }
    }
}
