mod bootstrap;
mod shutdown;

pub use shutdown::LocalityState;

use crate::collective::remote::communicator_handlers;
use crate::config::RallyConfig;
use crate::error::{FaultKind, RallyError, Result};
use crate::naming::{ComponentRegistry, SymbolTable};
use crate::protocol::RallyMessage;
use crate::rpc::dispatcher::InflightRequests;
use crate::rpc::{RpcDispatcher, RpcHandler, RpcRegistry, SHUTDOWN};
use crate::transport::{PeerConnection, PeerRouter};
use crate::types::{ActionId, Priority, Site};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{RwLock, watch};
use tokio::task::JoinHandle;

type ShutdownHook = Box<dyn FnOnce() + Send>;

/// One participating process of a rally cluster.
///
/// Holds the connections to every other locality, the per-peer routers that
/// demultiplex incoming frames, the action registry serving remote calls,
/// and the symbol table where communicators hosted here are registered.
///
/// # Example
///
/// ```no_run
/// use rally::locality::Locality;
///
/// # async fn example() -> rally::error::Result<()> {
/// let localities = Locality::bootstrap_local(4).await?;
/// assert_eq!(localities[2].site(), 2);
/// assert_eq!(localities[2].num_sites(), 4);
/// # Ok(())
/// # }
/// ```
pub struct Locality {
    site: Site,
    num_sites: u32,
    config: Arc<RallyConfig>,
    peers: HashMap<Site, Arc<PeerConnection>>,
    routers: HashMap<Site, Arc<PeerRouter>>,
    rpc_registry: Arc<RwLock<RpcRegistry>>,
    rpc_req_id: AtomicU64,
    dispatcher: Arc<RpcDispatcher>,
    inflight: Arc<InflightRequests>,
    dispatches: AtomicU64,
    symbols: SymbolTable,
    components: ComponentRegistry,
    state: watch::Sender<LocalityState>,
    /// Router and request-serving loops.
    background: Mutex<Vec<JoinHandle<()>>>,
    endpoint: Mutex<Option<quinn::Endpoint>>,
    shutdown_hooks: Mutex<Vec<ShutdownHook>>,
}

impl Locality {
    /// Create a locality from pre-established peer connections.
    ///
    /// Spawns one router and one request-serving loop per peer, so this
    /// must be called inside a tokio runtime.
    pub fn new(
        site: Site,
        num_sites: u32,
        peers: HashMap<Site, PeerConnection>,
        config: RallyConfig,
    ) -> Result<Arc<Self>> {
        let components = ComponentRegistry::from_config(&config)?;
        let config = Arc::new(config);

        Ok(Arc::new_cyclic(|this| {
            let mut registry = RpcRegistry::new();
            for (action, handler) in communicator_handlers(this.clone(), site) {
                registry.register(action, handler);
            }
            registry.register(SHUTDOWN, shutdown::shutdown_handler(this.clone(), site));
            let rpc_registry = Arc::new(RwLock::new(registry));

            let inflight = Arc::new(InflightRequests::new(site));
            let dispatcher = Arc::new(RpcDispatcher::new(
                Arc::clone(&rpc_registry),
                Arc::clone(&inflight),
            ));

            let mut peer_arcs = HashMap::new();
            let mut routers = HashMap::new();
            let mut background = Vec::new();
            for (peer_site, peer) in peers {
                let (router, handle) = PeerRouter::spawn(peer_site, peer.conn.clone());
                let peer = Arc::new(peer);
                let router = Arc::new(router);
                background.push(handle);
                background.push(tokio::spawn(
                    Arc::clone(&dispatcher).serve(Arc::clone(&peer), Arc::clone(&router)),
                ));
                peer_arcs.insert(peer_site, peer);
                routers.insert(peer_site, router);
            }

            let (state, _) = watch::channel(LocalityState::Running);
            Self {
                site,
                num_sites,
                config,
                peers: peer_arcs,
                routers,
                rpc_registry,
                rpc_req_id: AtomicU64::new(0),
                dispatcher,
                inflight,
                dispatches: AtomicU64::new(0),
                symbols: SymbolTable::new(site),
                components,
                state,
                background: Mutex::new(background),
                endpoint: Mutex::new(None),
                shutdown_hooks: Mutex::new(Vec::new()),
            }
        }))
    }

    pub fn site(&self) -> Site {
        self.site
    }

    pub fn num_sites(&self) -> u32 {
        self.num_sites
    }

    pub fn config(&self) -> &RallyConfig {
        &self.config
    }

    /// Names registered on this locality.
    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn components(&self) -> &ComponentRegistry {
        &self.components
    }

    /// Number of actions dispatched through `invoke` so far, local or remote.
    pub fn dispatch_count(&self) -> u64 {
        self.dispatches.load(Ordering::Relaxed)
    }

    /// Number of remote requests currently being served.
    pub fn inflight_requests(&self) -> usize {
        self.inflight.len()
    }

    pub fn peer(&self, site: Site) -> Result<&Arc<PeerConnection>> {
        self.peers.get(&site).ok_or(RallyError::UnknownPeer { site })
    }

    /// Register (or replace) the handler for `action`.
    pub async fn register_action(&self, action: ActionId, handler: RpcHandler) {
        self.rpc_registry.write().await.register(action, handler);
    }

    /// Keep the QUIC endpoint this locality's connections run on; it is
    /// closed together with them.
    pub fn attach_endpoint(&self, endpoint: quinn::Endpoint) {
        if let Ok(mut slot) = self.endpoint.lock() {
            *slot = Some(endpoint);
        }
    }

    /// Run `action` on `target` with a serialized payload.
    ///
    /// A call addressed to this locality runs the handler in the calling
    /// task without touching the network.
    pub async fn invoke(&self, target: Site, action: ActionId, payload: Vec<u8>) -> Result<Vec<u8>> {
        self.dispatches.fetch_add(1, Ordering::Relaxed);
        if target == self.site {
            if !self.inflight.is_accepting() {
                return Err(RallyError::ShuttingDown { site: self.site });
            }
            return self.dispatcher.dispatch(action, payload).await;
        }
        self.rpc(target, action, payload).await
    }

    async fn rpc(&self, target: Site, action: ActionId, payload: Vec<u8>) -> Result<Vec<u8>> {
        let req_id = self.rpc_req_id.fetch_add(1, Ordering::Relaxed);
        let router = self
            .routers
            .get(&target)
            .ok_or(RallyError::UnknownPeer { site: target })?;
        let peer = self.peer(target)?;

        let rx = router.register_rpc_waiter(req_id).await;
        let request = RallyMessage::Rpc {
            req_id,
            action,
            payload,
        };
        if let Err(e) = peer.send_message(&request, Priority::Realtime).await {
            router.remove_rpc_waiter(req_id).await;
            return Err(e);
        }

        let reply = match self.config.rpc_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, rx).await {
                Ok(reply) => reply,
                Err(_) => {
                    router.remove_rpc_waiter(req_id).await;
                    return Err(RallyError::RpcFailed {
                        site: target,
                        reason: format!(
                            "action {action} timed out after {}ms",
                            timeout.as_millis()
                        ),
                    });
                }
            },
            None => rx.await,
        };

        match reply {
            Ok(RallyMessage::RpcResponse { payload, .. }) => Ok(payload),
            Ok(RallyMessage::RpcFault { kind, reason, .. }) => Err(RallyError::from_fault(
                target,
                FaultKind::from_u8(kind),
                reason,
            )),
            Ok(other) => Err(RallyError::RpcFailed {
                site: target,
                reason: format!("expected a reply, got {other:?}"),
            }),
            Err(_) => Err(RallyError::PeerDisconnected { site: target }),
        }
    }

    /// Close every connection and the endpoint right away.
    ///
    /// Calls still waiting on a peer fail with a transport fault. Unlike
    /// `shutdown`, nothing is drained.
    pub fn close(&self) {
        for peer in self.peers.values() {
            peer.close("locality closed");
        }
        if let Ok(mut endpoint) = self.endpoint.lock() {
            if let Some(endpoint) = endpoint.take() {
                endpoint.close(0u32.into(), b"locality closed");
            }
        }
        tracing::info!(site = self.site, "locality: connections closed");
    }

    fn abort_background(&self) {
        if let Ok(mut tasks) = self.background.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
    }
}

impl Drop for Locality {
    fn drop(&mut self) {
        self.abort_background();
        for peer in self.peers.values() {
            peer.close("locality dropped");
        }
    }
}

impl std::fmt::Debug for Locality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Locality")
            .field("site", &self.site)
            .field("num_sites", &self.num_sites)
            .field("state", &*self.state.borrow())
            .finish()
    }
}
