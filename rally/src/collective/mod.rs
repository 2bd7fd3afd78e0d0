//! Collective operations over named, generation-versioned communicators.

pub mod args;
mod communicator;
mod handle;
pub mod hierarchical;
pub(crate) mod remote;
mod scatter;
pub mod server;

pub use args::{CallSite, IntoCallSite, NumSites, RootSite, ThisSite};
pub use communicator::{Communicator, create_communicator, create_local_communicator};
pub use handle::{CollectiveGroup, CollectiveHandle};
pub use hierarchical::{
    HierarchicalCommunicator, LevelRole, LevelShape, TreeLevel, create_hierarchical_communicator,
    scatter_from_hierarchically, scatter_to_hierarchically,
};
pub use remote::Operation;
pub use scatter::{scatter_from, scatter_from_basename, scatter_to, scatter_to_basename};
pub use server::{CommunicatorFactory, CommunicatorServer, SlotState, StepFn};
