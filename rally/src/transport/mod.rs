mod connection;
mod listener;
pub mod router;
pub(crate) mod tls;

pub use connection::PeerConnection;
pub use listener::TransportListener;
pub use router::PeerRouter;
