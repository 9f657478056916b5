use once_cell::sync::Lazy;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

const COUNTER_MASK: u32 = 0x00FF_FFFF;
const HEX_LENGTH: usize = 24;

static PROCESS_UNIQUE: Lazy<[u8; 5]> = Lazy::new(|| {
    let bytes = Uuid::new_v4().into_bytes();
    [bytes[0], bytes[1], bytes[2], bytes[3], bytes[4]]
});

static COUNTER: Lazy<AtomicU32> = Lazy::new(|| {
    let bytes = Uuid::new_v4().into_bytes();
    AtomicU32::new(u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]]))
});

/// Opaque 12-byte identifier rendered as 24 lowercase hex characters.
///
/// Layout: 4-byte big-endian seconds since the epoch, 5 process-unique
/// bytes, 3-byte wrapping counter.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 12]);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectIdError {
    InvalidLength(usize),
    InvalidHex(String),
}

impl Display for ObjectIdError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidLength(length) => {
                write!(f, "object id must be {HEX_LENGTH} hex characters, got {length}")
            }
            Self::InvalidHex(value) => write!(f, "object id `{value}` is not valid hex"),
        }
    }
}

impl Error for ObjectIdError {}

impl ObjectId {
    pub fn new() -> Self {
        let seconds = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs() as u32)
            .unwrap_or(0);
        let counter = COUNTER.fetch_add(1, Ordering::Relaxed) & COUNTER_MASK;

        let mut bytes = [0u8; 12];
        bytes[..4].copy_from_slice(&seconds.to_be_bytes());
        bytes[4..9].copy_from_slice(&*PROCESS_UNIQUE);
        bytes[9..].copy_from_slice(&counter.to_be_bytes()[1..]);
        Self(bytes)
    }

    pub const fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    pub const fn bytes(&self) -> [u8; 12] {
        self.0
    }

    /// Creation time in seconds since the epoch.
    pub fn timestamp(&self) -> u32 {
        u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }

    /// Parses a 24-character hex string. Upper and lower case are accepted.
    pub fn parse_str(value: &str) -> Result<Self, ObjectIdError> {
        if value.len() != HEX_LENGTH {
            return Err(ObjectIdError::InvalidLength(value.len()));
        }
        let mut bytes = [0u8; 12];
        hex::decode_to_slice(value, &mut bytes)
            .map_err(|_| ObjectIdError::InvalidHex(value.to_string()))?;
        Ok(Self(bytes))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for ObjectId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Debug for ObjectId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "ObjectId({})", self.to_hex())
    }
}

impl std::str::FromStr for ObjectId {
    type Err = ObjectIdError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse_str(value)
    }
}
