pub mod collective;
pub mod config;
pub mod error;
pub mod locality;
pub mod naming;
pub mod payload;
pub mod protocol;
pub mod rpc;
pub mod transport;
pub mod types;

pub use collective::{
    CollectiveGroup, CollectiveHandle, Communicator, HierarchicalCommunicator, NumSites, RootSite,
    ThisSite, create_communicator, create_hierarchical_communicator, create_local_communicator,
    scatter_from, scatter_from_basename, scatter_from_hierarchically, scatter_to,
    scatter_to_basename, scatter_to_hierarchically,
};
pub use config::RallyConfig;
pub use error::{RallyError, Result};
pub use locality::{Locality, LocalityState};
pub use payload::Payload;
pub use protocol::RallyMessage;
pub use transport::{PeerConnection, TransportListener};
pub use types::{ActionId, Generation, Priority, Site};
