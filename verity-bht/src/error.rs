//! Error types for the block hash tree

use thiserror::Error;

use crate::entry::EntryState;

/// Result type alias using [`BhtError`]
pub type Result<T> = std::result::Result<T, BhtError>;

/// Errors reported by tree creation, population, verification and configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BhtError {
    /// Zero block count, malformed hex, wrong-length digest, out-of-range block
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Unrecognised hash algorithm name
    #[error("Unknown hash algorithm '{0}'")]
    BadAlgorithm(String),

    /// Digest exceeds the static cap or leaves fewer than two digests per page
    #[error("Digest size {0} is unsupported")]
    DigestTooLarge(usize),

    /// Geometry arithmetic exceeded the index or sector range
    #[error("Tree geometry overflow: {0}")]
    Overflow(String),

    /// An entry buffer could not be allocated during population
    #[error("Failed to allocate entry buffer")]
    NoMem,

    /// The read callback reported failure for an entry on the path
    #[error("I/O error on hash entry (level {level}, index {index})")]
    Io { level: usize, index: u64 },

    /// A computed digest did not equal its expected value
    #[error("Digest mismatch at hash entry (level {level}, index {index})")]
    Mismatch { level: usize, index: u64 },

    /// `verify` was called before every entry on the path was loaded
    #[error("Block {0} is not populated")]
    NotPopulated(u64),

    /// A configuration value was read before it was set
    #[error("{0} is not set")]
    NotSet(&'static str),

    /// Output buffer cannot hold the requested value
    #[error("Buffer too short: need {needed} bytes, got {available}")]
    ShortBuffer { needed: usize, available: usize },

    /// Producer-side hash store failure
    #[error("Storage error: {0}")]
    Storage(String),
}

impl BhtError {
    /// Create an invalid argument error
    pub fn invalid(msg: impl Into<String>) -> Self {
        BhtError::InvalidArgument(msg.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        BhtError::Storage(msg.into())
    }

    /// Map a terminal entry state to the error it poisons its paths with
    pub(crate) fn from_state(state: EntryState, level: usize, index: u64) -> Option<Self> {
        match state {
            EntryState::IoError => Some(BhtError::Io { level, index }),
            EntryState::Mismatch => Some(BhtError::Mismatch { level, index }),
            _ => None,
        }
    }

    /// True for the errors that mark the block as corrupt or unreadable
    pub fn is_integrity_failure(&self) -> bool {
        matches!(self, BhtError::Io { .. } | BhtError::Mismatch { .. })
    }
}

impl From<std::io::Error> for BhtError {
    fn from(e: std::io::Error) -> Self {
        BhtError::Storage(e.to_string())
    }
}
