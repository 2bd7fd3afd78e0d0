use crate::error::{RallyError, Result};
use crate::types::{PROTOCOL_VERSION, Priority};

/// Size of the frame header in bytes.
pub const HEADER_SIZE: usize = 8;

/// Kind of message carried by a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    /// Connection-level control (hello, goodbye).
    Control = 0,
    /// Action invocation or its reply.
    Action = 1,
}

impl TryFrom<u8> for MessageType {
    type Error = RallyError;

    fn try_from(v: u8) -> Result<Self> {
        match v {
            0 => Ok(MessageType::Control),
            1 => Ok(MessageType::Action),
            other => Err(RallyError::DecodeFailed(format!("unknown message type {other}"))),
        }
    }
}

/// Header in front of every frame.
///
/// ```text
/// [0..4] payload_length: u32 LE
/// [4]    priority: u8 (`Priority`)
/// [5]    message_type: u8
/// [6..8] protocol version: u16 LE
/// ```
///
/// Frames stamped with another protocol version are rejected on decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub payload_length: u32,
    pub priority: Priority,
    pub message_type: MessageType,
}

impl Header {
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.payload_length.to_le_bytes());
        buf[4] = self.priority as u8;
        buf[5] = self.message_type as u8;
        buf[6..8].copy_from_slice(&PROTOCOL_VERSION.to_le_bytes());
        buf
    }

    pub fn decode(buf: &[u8; HEADER_SIZE]) -> Result<Self> {
        let version = u16::from_le_bytes([buf[6], buf[7]]);
        if version != PROTOCOL_VERSION {
            return Err(RallyError::DecodeFailed(format!(
                "frame has protocol version {version}, expected {PROTOCOL_VERSION}"
            )));
        }
        Ok(Header {
            payload_length: u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
            priority: Priority::try_from(buf[4])?,
            message_type: MessageType::try_from(buf[5])?,
        })
    }
}
