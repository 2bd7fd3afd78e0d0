use crate::error::{RallyError, Result};
use crate::protocol::header::{HEADER_SIZE, Header};
use crate::protocol::message::RallyMessage;
use crate::types::Priority;

/// Encode a `RallyMessage` into a framed byte buffer: `[header][rkyv payload]`.
pub fn encode_message(msg: &RallyMessage, priority: Priority) -> Result<Vec<u8>> {
    let payload = rkyv::to_bytes::<rkyv::rancor::Error>(msg)
        .map_err(|e| RallyError::EncodeFailed(e.to_string()))?;

    let payload_length = u32::try_from(payload.len()).map_err(|_| {
        RallyError::EncodeFailed(format!(
            "payload too large for framed header: {} bytes",
            payload.len()
        ))
    })?;

    let header = Header {
        payload_length,
        priority,
        message_type: msg.message_type(),
    };

    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(&payload);
    Ok(buf)
}

/// Decode a framed byte buffer back into a `(Header, RallyMessage)`.
///
/// The payload is copied into an aligned buffer before validation since
/// stream reads give no alignment guarantee.
pub fn decode_message(buf: &[u8]) -> Result<(Header, RallyMessage)> {
    if buf.len() < HEADER_SIZE {
        return Err(RallyError::DecodeFailed(format!(
            "buffer too short: {} < {HEADER_SIZE}",
            buf.len()
        )));
    }

    let header_bytes: &[u8; HEADER_SIZE] = buf[..HEADER_SIZE]
        .try_into()
        .map_err(|_| RallyError::DecodeFailed("header slice length mismatch".into()))?;

    let header = Header::decode(header_bytes)?;

    let payload_end = HEADER_SIZE + header.payload_length as usize;
    if buf.len() < payload_end {
        return Err(RallyError::DecodeFailed(format!(
            "buffer too short for payload: {} < {payload_end}",
            buf.len()
        )));
    }

    let mut aligned = rkyv::util::AlignedVec::<16>::with_capacity(header.payload_length as usize);
    aligned.extend_from_slice(&buf[HEADER_SIZE..payload_end]);
    let msg = rkyv::from_bytes::<RallyMessage, rkyv::rancor::Error>(&aligned)
        .map_err(|e| RallyError::DecodeFailed(e.to_string()))?;

    if msg.message_type() != header.message_type {
        return Err(RallyError::DecodeFailed(format!(
            "header says {:?} but payload is {:?}",
            header.message_type,
            msg.message_type()
        )));
    }

    Ok((header, msg))
}
