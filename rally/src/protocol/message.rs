use crate::protocol::header::MessageType;
use crate::types::{ActionId, Site};

/// Frames exchanged between localities.
///
/// Collective values never appear here directly: they travel inside the
/// opaque `payload` of an action, encoded by the collective layer.
#[derive(rkyv::Archive, rkyv::Serialize, rkyv::Deserialize, Debug, Clone, PartialEq)]
pub enum RallyMessage {
    /// First frame on a freshly established connection, identifying the
    /// connecting site.
    Hello { protocol_version: u16, site: Site },

    /// Sent before a locality closes its connections.
    Goodbye { site: Site },

    /// Action invocation.
    Rpc {
        req_id: u64,
        action: ActionId,
        payload: Vec<u8>,
    },

    /// Successful reply to an `Rpc`.
    RpcResponse { req_id: u64, payload: Vec<u8> },

    /// Failed reply to an `Rpc`. `kind` classifies the fault.
    RpcFault {
        req_id: u64,
        kind: u8,
        reason: String,
    },
}

impl RallyMessage {
    pub fn message_type(&self) -> MessageType {
        match self {
            RallyMessage::Hello { .. } | RallyMessage::Goodbye { .. } => MessageType::Control,
            RallyMessage::Rpc { .. }
            | RallyMessage::RpcResponse { .. }
            | RallyMessage::RpcFault { .. } => MessageType::Action,
        }
    }
}
