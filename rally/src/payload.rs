//! Wire encoding for collective values.
//!
//! Values are encoded little-endian; variable-length values carry a `u32`
//! length prefix. A share at an interior tree level (`Vec<T>`) and at the
//! leaf level (`T`) go through the same trait.

use crate::error::{RallyError, Result};

/// A value that can be carried by a collective operation.
pub trait Payload: Sized + Send + 'static {
    /// Append the encoding of `self` to `buf`.
    fn encode(&self, buf: &mut Vec<u8>);

    /// Decode one value from the front of `buf`, advancing it.
    fn decode(buf: &mut &[u8]) -> Result<Self>;
}

/// Encode a single value into a fresh buffer.
pub fn to_bytes<T: Payload>(value: &T) -> Vec<u8> {
    let mut buf = Vec::new();
    value.encode(&mut buf);
    buf
}

/// Decode a single value, rejecting trailing bytes.
pub fn from_bytes<T: Payload>(mut bytes: &[u8]) -> Result<T> {
    let value = T::decode(&mut bytes)?;
    if !bytes.is_empty() {
        return Err(RallyError::DecodeFailed(format!(
            "{} trailing bytes after value",
            bytes.len()
        )));
    }
    Ok(value)
}

fn take<'a>(buf: &mut &'a [u8], n: usize) -> Result<&'a [u8]> {
    if buf.len() < n {
        return Err(RallyError::DecodeFailed(format!(
            "value truncated: need {n} bytes, have {}",
            buf.len()
        )));
    }
    let (head, tail) = buf.split_at(n);
    *buf = tail;
    Ok(head)
}

fn decode_len(buf: &mut &[u8]) -> Result<usize> {
    Ok(u32::decode(buf)? as usize)
}

fn encode_len(len: usize, buf: &mut Vec<u8>) {
    // Collective values are bounded by the frame size, well below u32::MAX.
    (len as u32).encode(buf);
}

macro_rules! impl_payload_for_number {
    ($($ty:ty),*) => {
        $(
            impl Payload for $ty {
                fn encode(&self, buf: &mut Vec<u8>) {
                    buf.extend_from_slice(&self.to_le_bytes());
                }

                fn decode(buf: &mut &[u8]) -> Result<Self> {
                    let bytes = take(buf, std::mem::size_of::<$ty>())?;
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(bytes);
                    Ok(<$ty>::from_le_bytes(raw))
                }
            }
        )*
    };
}

impl_payload_for_number!(u8, u16, u32, u64, i8, i16, i32, i64, f32, f64);

impl Payload for bool {
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(u8::from(*self));
    }

    fn decode(buf: &mut &[u8]) -> Result<Self> {
        match take(buf, 1)?[0] {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(RallyError::DecodeFailed(format!(
                "invalid bool byte {other}"
            ))),
        }
    }
}

impl Payload for String {
    fn encode(&self, buf: &mut Vec<u8>) {
        encode_len(self.len(), buf);
        buf.extend_from_slice(self.as_bytes());
    }

    fn decode(buf: &mut &[u8]) -> Result<Self> {
        let len = decode_len(buf)?;
        let bytes = take(buf, len)?;
        String::from_utf8(bytes.to_vec()).map_err(|e| RallyError::DecodeFailed(e.to_string()))
    }
}

impl<T: Payload> Payload for Vec<T> {
    fn encode(&self, buf: &mut Vec<u8>) {
        encode_len(self.len(), buf);
        for item in self {
            item.encode(buf);
        }
    }

    fn decode(buf: &mut &[u8]) -> Result<Self> {
        let len = decode_len(buf)?;
        // Cap the preallocation; a corrupt length must not reserve gigabytes.
        let mut out = Vec::with_capacity(len.min(buf.len()));
        for _ in 0..len {
            out.push(T::decode(buf)?);
        }
        Ok(out)
    }
}

impl<A: Payload, B: Payload> Payload for (A, B) {
    fn encode(&self, buf: &mut Vec<u8>) {
        self.0.encode(buf);
        self.1.encode(buf);
    }

    fn decode(buf: &mut &[u8]) -> Result<Self> {
        let a = A::decode(buf)?;
        let b = B::decode(buf)?;
        Ok((a, b))
    }
}
