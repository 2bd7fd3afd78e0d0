use crate::error::Result;
use crate::types::ActionId;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// An action handler: receives the serialized arguments and resolves to the
/// serialized result.
///
/// Handlers are asynchronous because a rendezvous may park the request until
/// the other participants arrive.
pub type RpcHandler = Arc<dyn Fn(Vec<u8>) -> BoxFuture<'static, Result<Vec<u8>>> + Send + Sync>;

/// Wrap an async closure as an `RpcHandler`.
pub fn rpc_handler<F, Fut>(f: F) -> RpcHandler
where
    F: Fn(Vec<u8>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<u8>>> + Send + 'static,
{
    Arc::new(move |args: Vec<u8>| -> BoxFuture<'static, Result<Vec<u8>>> { Box::pin(f(args)) })
}

/// Registry mapping action IDs to handlers.
pub struct RpcRegistry {
    handlers: HashMap<ActionId, RpcHandler>,
}

impl RpcRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler, replacing any previous one for `action`.
    pub fn register(&mut self, action: ActionId, handler: RpcHandler) {
        self.handlers.insert(action, handler);
    }

    pub fn get(&self, action: ActionId) -> Option<&RpcHandler> {
        self.handlers.get(&action)
    }

    pub fn contains(&self, action: ActionId) -> bool {
        self.handlers.contains_key(&action)
    }
}

impl Default for RpcRegistry {
    fn default() -> Self {
        Self::new()
    }
}
