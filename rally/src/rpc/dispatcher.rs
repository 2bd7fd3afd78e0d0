use crate::error::{RallyError, Result};
use crate::protocol::RallyMessage;
use crate::rpc::registry::RpcRegistry;
use crate::transport::{PeerConnection, PeerRouter};
use crate::types::{ActionId, Priority, Site};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tokio::task::JoinSet;

/// Handler tasks started on behalf of remote callers.
///
/// Once `stop_accepting` has been called new requests are refused with
/// `ShuttingDown`; the tasks already running can then be drained.
pub(crate) struct InflightRequests {
    site: Site,
    accepting: AtomicBool,
    tasks: std::sync::Mutex<JoinSet<()>>,
}

impl InflightRequests {
    pub(crate) fn new(site: Site) -> Self {
        Self {
            site,
            accepting: AtomicBool::new(true),
            tasks: std::sync::Mutex::new(JoinSet::new()),
        }
    }

    pub(crate) fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    pub(crate) fn stop_accepting(&self) {
        self.accepting.store(false, Ordering::Release);
    }

    fn spawn(&self, fut: impl Future<Output = ()> + Send + 'static) -> Result<()> {
        let mut tasks = self
            .tasks
            .lock()
            .map_err(|_| RallyError::LockPoisoned("inflight requests"))?;
        // Checked under the lock: `take_all` must see every accepted task.
        if !self.is_accepting() {
            return Err(RallyError::ShuttingDown { site: self.site });
        }
        // Reap finished tasks so the set only holds live ones.
        while tasks.try_join_next().is_some() {}
        tasks.spawn(fut);
        Ok(())
    }

    /// Take every task still tracked, leaving the set empty.
    pub(crate) fn take_all(&self) -> Result<JoinSet<()>> {
        let mut tasks = self
            .tasks
            .lock()
            .map_err(|_| RallyError::LockPoisoned("inflight requests"))?;
        Ok(std::mem::take(&mut *tasks))
    }

    pub(crate) fn len(&self) -> usize {
        self.tasks.lock().map(|t| t.len()).unwrap_or(0)
    }
}

/// Runs incoming action requests against the registered handlers.
pub struct RpcDispatcher {
    registry: Arc<RwLock<RpcRegistry>>,
    inflight: Arc<InflightRequests>,
}

impl RpcDispatcher {
    pub(crate) fn new(registry: Arc<RwLock<RpcRegistry>>, inflight: Arc<InflightRequests>) -> Self {
        Self { registry, inflight }
    }

    /// Run the handler for `action` in the calling task.
    pub async fn dispatch(&self, action: ActionId, payload: Vec<u8>) -> Result<Vec<u8>> {
        let handler = self
            .registry
            .read()
            .await
            .get(action)
            .cloned()
            .ok_or(RallyError::RpcNotRegistered { action })?;
        handler(payload).await
    }

    /// Serve the request lane of one peer until the router shuts down.
    ///
    /// Every request runs in its own task: a handler parked on a rendezvous
    /// must not hold up requests behind it.
    pub async fn serve(self: Arc<Self>, peer: Arc<PeerConnection>, router: Arc<PeerRouter>) {
        while let Ok(msg) = router.recv_rpc_request(peer.site).await {
            let RallyMessage::Rpc {
                req_id,
                action,
                payload,
            } = msg
            else {
                continue;
            };

            let this = Arc::clone(&self);
            let task_peer = Arc::clone(&peer);
            let task = async move {
                let result = this.dispatch(action, payload).await;
                send_reply(&task_peer, req_id, result).await;
            };
            if let Err(e) = self.inflight.spawn(task) {
                send_reply(&peer, req_id, Err(e)).await;
            }
        }
        tracing::debug!(site = peer.site, "dispatcher: request lane closed");
    }
}

async fn send_reply(peer: &PeerConnection, req_id: u64, result: Result<Vec<u8>>) {
    let reply = match result {
        Ok(payload) => RallyMessage::RpcResponse { req_id, payload },
        Err(e) => {
            tracing::debug!(site = peer.site, req_id, "dispatcher: replying with fault: {e}");
            RallyMessage::RpcFault {
                req_id,
                kind: e.fault_kind() as u8,
                reason: e.to_string(),
            }
        }
    };
    if let Err(e) = peer.send_message(&reply, Priority::Realtime).await {
        tracing::warn!(site = peer.site, req_id, "dispatcher: failed to send reply: {e}");
    }
}
