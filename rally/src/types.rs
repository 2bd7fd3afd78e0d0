use crate::error::{RallyError, Result};

/// Index of a participant (site / locality) in a collective operation.
pub type Site = u32;

/// Identifier of a remotely invocable action.
pub type ActionId = u16;

/// Generational counter disambiguating repeated invocations of a collective
/// operating on the same base name.
///
/// Generation `0` is reserved; any collective called with it fails before
/// communicating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Generation(u64);

impl Generation {
    /// The first valid generation.
    pub const FIRST: Generation = Generation(1);

    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }

    /// The generation following this one.
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl From<u64> for Generation {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Scheduling class of a frame, recorded in its header.
///
/// `Hello` and `Goodbye` travel as `Critical`, actions and their replies as
/// `Realtime`. The sender maps the class onto the QUIC stream priority so
/// control frames are not queued behind large action payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Priority {
    Critical = 0,
    Realtime = 1,
}

impl Priority {
    /// QUIC send priority; streams with a higher value are sent first.
    pub fn stream_priority(self) -> i32 {
        match self {
            Priority::Critical => 1,
            Priority::Realtime => 0,
        }
    }
}

impl TryFrom<u8> for Priority {
    type Error = RallyError;

    fn try_from(v: u8) -> Result<Self> {
        match v {
            0 => Ok(Priority::Critical),
            1 => Ok(Priority::Realtime),
            other => Err(RallyError::DecodeFailed(format!("unknown priority {other}"))),
        }
    }
}

/// Current protocol version.
pub const PROTOCOL_VERSION: u16 = 1;
