//! Store configuration.
//!
//! # Responsibility
//! - Describe where a backend persists and how its connection behaves.
//! - Carry the session backend's HiLo and request-budget settings.
//!
//! # Invariants
//! - A validated config has a non-empty alphanumeric node tag, a non-zero
//!   HiLo capacity and a non-zero request budget.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default collection names, one per entity type.
pub const KNOWN_COLLECTIONS: [&str; 5] = ["authors", "books", "categories", "publishers", "members"];

pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_NODE_TAG: &str = "A";
pub const DEFAULT_HILO_CAPACITY: u64 = 32;
pub const DEFAULT_MAX_REQUESTS_PER_SESSION: usize = 5000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    Memory,
    File(PathBuf),
}

impl StoreLocation {
    /// Short label used in log events.
    pub fn mode(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::File(_) => "file",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    EmptyNodeTag,
    InvalidNodeTag(String),
    ZeroHiLoCapacity,
    ZeroRequestBudget,
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyNodeTag => write!(f, "node tag cannot be empty"),
            Self::InvalidNodeTag(tag) => {
                write!(f, "node tag `{tag}` must contain only ASCII letters and digits")
            }
            Self::ZeroHiLoCapacity => write!(f, "hilo capacity must be at least 1"),
            Self::ZeroRequestBudget => write!(f, "max requests per session must be at least 1"),
        }
    }
}

impl Error for ConfigError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub location: StoreLocation,
    pub busy_timeout: Duration,
    pub node_tag: String,
    pub hilo_capacity: u64,
    pub max_requests_per_session: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            location: StoreLocation::Memory,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            node_tag: DEFAULT_NODE_TAG.to_string(),
            hilo_capacity: DEFAULT_HILO_CAPACITY,
            max_requests_per_session: DEFAULT_MAX_REQUESTS_PER_SESSION,
        }
    }
}

impl StoreConfig {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn file(path: impl AsRef<Path>) -> Self {
        Self {
            location: StoreLocation::File(path.as_ref().to_path_buf()),
            ..Self::default()
        }
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn with_node_tag(mut self, tag: impl Into<String>) -> Self {
        self.node_tag = tag.into();
        self
    }

    pub fn with_hilo_capacity(mut self, capacity: u64) -> Self {
        self.hilo_capacity = capacity;
        self
    }

    pub fn with_max_requests_per_session(mut self, limit: usize) -> Self {
        self.max_requests_per_session = limit;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node_tag.is_empty() {
            return Err(ConfigError::EmptyNodeTag);
        }
        if !self.node_tag.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ConfigError::InvalidNodeTag(self.node_tag.clone()));
        }
        if self.hilo_capacity == 0 {
            return Err(ConfigError::ZeroHiLoCapacity);
        }
        if self.max_requests_per_session == 0 {
            return Err(ConfigError::ZeroRequestBudget);
        }
        Ok(())
    }
}
