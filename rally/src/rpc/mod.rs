pub(crate) mod dispatcher;
pub(crate) mod registry;

use crate::types::ActionId;

pub use dispatcher::RpcDispatcher;
pub use registry::{RpcHandler, RpcRegistry, rpc_handler};

/// Retrieve a share from a communicator.
pub const COMMUNICATOR_GET: ActionId = 1;
/// Contribute values to a communicator and retrieve the caller's share.
pub const COMMUNICATOR_SET: ActionId = 2;
/// Ask a locality to shut down.
pub const SHUTDOWN: ActionId = 3;
