use crate::types::Site;

pub type Result<T> = std::result::Result<T, RallyError>;

#[derive(Debug, thiserror::Error)]
pub enum RallyError {
    #[error("{operation}: the generation number shouldn't be zero")]
    InvalidGeneration { operation: &'static str },

    #[error("invalid site {site}: number of sites is {num_sites}")]
    InvalidSite { site: Site, num_sites: u32 },

    #[error("{operation}: site {site} is the root and must not use the pure-consumer entry point")]
    RootIsCaller { operation: &'static str, site: Site },

    #[error("{operation}: site {site} is not the root (site {root})")]
    NotRoot {
        operation: &'static str,
        site: Site,
        root: Site,
    },

    #[error("invalid arity {arity}: a hierarchical communicator needs at least 2 children per node")]
    InvalidArity { arity: u32 },

    #[error("value count mismatch: expected {expected} values, got {actual}")]
    ValueCountMismatch { expected: usize, actual: usize },

    #[error("{operation} rendezvous failed (generation {generation}): {reason}")]
    Protocol {
        operation: String,
        generation: u64,
        reason: String,
    },

    #[error("unknown communication operation '{name}'")]
    UnknownOperation { name: String },

    #[error("the given base name was already registered: {name}")]
    NameAlreadyRegistered { name: String },

    #[error("name '{name}' was not registered within {timeout_ms}ms")]
    NameResolveTimeout { name: String, timeout_ms: u64 },

    #[error("component '{name}' is registered with a different shape: {reason}")]
    ComponentMismatch { name: String, reason: String },

    #[error("no factory installed for component type '{type_name}'")]
    UnknownComponent { type_name: String },

    #[error("peer {site} disconnected unexpectedly")]
    PeerDisconnected { site: Site },

    #[error("site {site} not found in cluster")]
    UnknownPeer { site: Site },

    #[error("message decode failed: {0}")]
    DecodeFailed(String),

    #[error("message encode failed: {0}")]
    EncodeFailed(String),

    #[error("QUIC transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("TLS configuration error: {0}")]
    Tls(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("RPC handler not registered for action {action}")]
    RpcNotRegistered { action: u16 },

    #[error("RPC call to site {site} failed: {reason}")]
    RpcFailed { site: Site, reason: String },

    #[error("rendezvous fault on site {site}: {reason}")]
    RemoteProtocol { site: Site, reason: String },

    #[error("remote site {site} reported: {reason}")]
    Remote { site: Site, reason: String },

    #[error("locality {site} is shutting down")]
    ShuttingDown { site: Site },

    #[error("collective task failed: {0}")]
    TaskFailed(String),

    #[error("collective did not complete within {timeout_ms}ms")]
    WaitTimeout { timeout_ms: u64 },

    #[error("internal lock poisoned: {0}")]
    LockPoisoned(&'static str),
}

impl RallyError {
    /// Create a `Transport` error with just a message.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport {
            message: msg.into(),
            source: None,
        }
    }

    /// Create a `Transport` error with a message and a source error.
    pub fn transport_with_source(
        msg: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Transport {
            message: msg.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a `Protocol` fault for a rendezvous on `operation`.
    pub fn protocol(operation: &str, generation: u64, reason: impl Into<String>) -> Self {
        Self::Protocol {
            operation: operation.to_owned(),
            generation,
            reason: reason.into(),
        }
    }

    /// Faults detected locally before any communication takes place.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(
            self,
            Self::InvalidGeneration { .. }
                | Self::InvalidSite { .. }
                | Self::RootIsCaller { .. }
                | Self::NotRoot { .. }
                | Self::InvalidArity { .. }
                | Self::ValueCountMismatch { .. }
        )
    }

    /// Faults raised by a communicator's rendezvous bookkeeping or by name
    /// resolution on the hosting site.
    pub fn is_protocol_fault(&self) -> bool {
        matches!(
            self,
            Self::Protocol { .. }
                | Self::RemoteProtocol { .. }
                | Self::UnknownOperation { .. }
                | Self::NameAlreadyRegistered { .. }
                | Self::NameResolveTimeout { .. }
                | Self::ComponentMismatch { .. }
                | Self::UnknownComponent { .. }
        )
    }

    /// Wire class used when a fault raised on a hosting site is sent back
    /// to the caller.
    pub(crate) fn fault_kind(&self) -> FaultKind {
        if self.is_invalid_argument() {
            FaultKind::InvalidArgument
        } else if self.is_protocol_fault() {
            FaultKind::Protocol
        } else if matches!(self, Self::ShuttingDown { .. }) {
            FaultKind::ShuttingDown
        } else {
            FaultKind::Remote
        }
    }

    /// Rebuild a fault reply received from `site` as a local error of the
    /// same class.
    pub(crate) fn from_fault(site: Site, kind: FaultKind, reason: String) -> Self {
        match kind {
            FaultKind::InvalidArgument | FaultKind::Protocol => {
                Self::RemoteProtocol { site, reason }
            }
            FaultKind::ShuttingDown => Self::ShuttingDown { site },
            FaultKind::Remote => Self::Remote { site, reason },
        }
    }
}

/// Class of a fault carried in an `RpcFault` reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum FaultKind {
    InvalidArgument = 0,
    Protocol = 1,
    ShuttingDown = 2,
    Remote = 3,
}

impl FaultKind {
    pub(crate) fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::InvalidArgument,
            1 => Self::Protocol,
            2 => Self::ShuttingDown,
            _ => Self::Remote,
        }
    }
}
