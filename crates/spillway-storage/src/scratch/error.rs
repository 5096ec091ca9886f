//! Error types for the scratch engines.

use thiserror::Error;

use spillway_common::SpillwayError;

/// Result type for scratch engine operations.
pub type ScratchResult<T> = Result<T, ScratchError>;

/// Errors that can occur in scratch engine operations.
#[derive(Debug, Error)]
pub enum ScratchError {
    /// The engine was closed.
    #[error("scratch engine is closed")]
    Closed,

    /// Key is too large.
    #[error("key too large: {size} bytes (max: {max})")]
    KeyTooLarge {
        /// Actual size of the key.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Value is too large.
    #[error("value too large: {size} bytes (max: {max})")]
    ValueTooLarge {
        /// Actual size of the value.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// A record read back from the scratch file did not match its index.
    #[error("corrupted scratch record at offset {offset}: {reason}")]
    Corrupted {
        /// File offset of the record.
        offset: u64,
        /// Description of the mismatch.
        reason: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScratchError {
    /// Creates a new corrupted record error.
    pub fn corrupted(offset: u64, reason: impl Into<String>) -> Self {
        Self::Corrupted {
            offset,
            reason: reason.into(),
        }
    }
}

impl From<ScratchError> for SpillwayError {
    fn from(e: ScratchError) -> Self {
        match e {
            ScratchError::Io(source) => SpillwayError::Io { source },
            e @ (ScratchError::KeyTooLarge { .. } | ScratchError::ValueTooLarge { .. }) => {
                SpillwayError::encoding(e.to_string())
            }
            other => SpillwayError::iterator(other.to_string()),
        }
    }
}
