//! Container error types.
//!
//! Every failure a row container, a scratch engine, or a resource monitor
//! can surface is one of these variants.

use std::fmt;
use thiserror::Error;

use crate::monitor::ResourceKind;

/// Error codes for categorizing errors.
///
/// These codes can be used for programmatic error handling and
/// are stable across versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    // General errors (0x0000 - 0x00FF)
    /// Internal error (bug).
    Internal = 0x0001,
    /// Invalid configuration or initialization arguments.
    InvalidConfig = 0x0003,

    // I/O errors (0x0100 - 0x01FF)
    /// General I/O error.
    Io = 0x0100,
    /// Disk budget exhausted.
    DiskFull = 0x0103,

    // Resource errors (0x0200 - 0x02FF)
    /// A budget reservation was rejected.
    BudgetExceeded = 0x0200,
    /// Migration to disk did not complete.
    SpillFailed = 0x0201,

    // Container errors (0x0300 - 0x03FF)
    /// Backing store failed during a scan.
    IteratorFailed = 0x0300,
    /// Row or key encoding failed.
    Encoding = 0x0301,
    /// Row handle belongs to a previous store.
    StaleHandle = 0x0302,
    /// Marks were used before being reserved.
    MarksNotReserved = 0x0303,
    /// Container was left unusable by an earlier fatal error.
    ContainerUnusable = 0x0304,
    /// Container was closed.
    Closed = 0x0305,
}

impl ErrorCode {
    /// Returns the numeric code.
    #[inline]
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Returns the error category name.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match (*self as u16) >> 8 {
            0x00 => "General",
            0x01 => "I/O",
            0x02 => "Resource",
            0x03 => "Container",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// The main error type for Spillway.
///
/// # Example
///
/// ```rust
/// use spillway_common::error::{ErrorCode, SpillwayError};
///
/// let err = SpillwayError::DiskFull { requested: 128, available: 0 };
/// assert_eq!(err.code(), ErrorCode::DiskFull);
/// assert!(err.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum SpillwayError {
    // ==========================================================================
    // General Errors
    // ==========================================================================
    /// Internal error - this indicates a bug.
    #[error("internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },

    /// Malformed initialization arguments or configuration.
    #[error("invalid configuration: {message}")]
    Config {
        /// Error message.
        message: String,
    },

    /// I/O error from the underlying system.
    #[error("I/O error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    // ==========================================================================
    // Resource Errors
    // ==========================================================================
    /// A monitor rejected a reservation.
    #[error("{resource} budget exceeded: requested {requested} bytes, {available} available")]
    BudgetExceeded {
        /// Which resource was exhausted.
        resource: ResourceKind,
        /// Bytes requested.
        requested: u64,
        /// Bytes still available when the request was made.
        available: u64,
    },

    /// The disk budget rejected a row on the normal insert path.
    ///
    /// The row was not added; previously stored rows are intact.
    #[error("disk budget exhausted: requested {requested} bytes, {available} available")]
    DiskFull {
        /// Bytes requested.
        requested: u64,
        /// Bytes still available.
        available: u64,
    },

    /// Migration of in-memory rows to disk failed part-way.
    #[error("spill to disk failed: {reason}")]
    SpillFailed {
        /// Why the migration stopped.
        reason: String,
    },

    // ==========================================================================
    // Container Errors
    // ==========================================================================
    /// The backing store failed while a scan was in progress.
    #[error("iterator error: {message}")]
    Iterator {
        /// Error message.
        message: String,
    },

    /// Row or key encoding failed.
    #[error("encoding error: {message}")]
    Encoding {
        /// Error message.
        message: String,
    },

    /// A row handle from an earlier store was used after a spill or reset.
    #[error("row handle is stale: obtained from epoch {handle_epoch}, store is at epoch {store_epoch}")]
    StaleHandle {
        /// Epoch stamped into the handle.
        handle_epoch: u64,
        /// Epoch of the active store.
        store_epoch: u64,
    },

    /// Marking was requested before marks were enabled and reserved.
    #[error("row marks are not reserved for this container")]
    MarksNotReserved,

    /// An earlier fatal error left the container unusable.
    #[error("container is unusable after a failed spill")]
    ContainerUnusable,

    /// The container was closed.
    #[error("container is closed")]
    Closed,
}

impl SpillwayError {
    /// Returns the error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Internal { .. } => ErrorCode::Internal,
            Self::Config { .. } => ErrorCode::InvalidConfig,
            Self::Io { .. } => ErrorCode::Io,
            Self::BudgetExceeded { .. } => ErrorCode::BudgetExceeded,
            Self::DiskFull { .. } => ErrorCode::DiskFull,
            Self::SpillFailed { .. } => ErrorCode::SpillFailed,
            Self::Iterator { .. } => ErrorCode::IteratorFailed,
            Self::Encoding { .. } => ErrorCode::Encoding,
            Self::StaleHandle { .. } => ErrorCode::StaleHandle,
            Self::MarksNotReserved => ErrorCode::MarksNotReserved,
            Self::ContainerUnusable => ErrorCode::ContainerUnusable,
            Self::Closed => ErrorCode::Closed,
        }
    }

    /// Returns true if the caller may keep using the container.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::BudgetExceeded { .. } | Self::DiskFull { .. })
    }

    /// Returns true if this is a memory budget rejection.
    #[must_use]
    pub const fn is_memory_budget_exceeded(&self) -> bool {
        matches!(
            self,
            Self::BudgetExceeded {
                resource: ResourceKind::Memory,
                ..
            }
        )
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an encoding error.
    #[must_use]
    pub fn encoding(message: impl Into<String>) -> Self {
        Self::Encoding {
            message: message.into(),
        }
    }

    /// Creates an iterator error.
    #[must_use]
    pub fn iterator(message: impl Into<String>) -> Self {
        Self::Iterator {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        let err = SpillwayError::SpillFailed {
            reason: "disk budget".to_string(),
        };
        assert_eq!(err.code(), ErrorCode::SpillFailed);
        assert_eq!(err.code().category(), "Resource");
        assert_eq!(ErrorCode::DiskFull.category(), "I/O");
    }

    #[test]
    fn test_error_display() {
        let err = SpillwayError::BudgetExceeded {
            resource: ResourceKind::Disk,
            requested: 10,
            available: 3,
        };
        assert_eq!(
            err.to_string(),
            "disk budget exceeded: requested 10 bytes, 3 available"
        );
    }

    #[test]
    fn test_recoverable() {
        assert!(SpillwayError::DiskFull {
            requested: 1,
            available: 0
        }
        .is_recoverable());
        assert!(!SpillwayError::ContainerUnusable.is_recoverable());
        assert!(!SpillwayError::SpillFailed {
            reason: String::new()
        }
        .is_recoverable());
    }

    #[test]
    fn test_memory_budget_exceeded() {
        let mem = SpillwayError::BudgetExceeded {
            resource: ResourceKind::Memory,
            requested: 1,
            available: 0,
        };
        let disk = SpillwayError::BudgetExceeded {
            resource: ResourceKind::Disk,
            requested: 1,
            available: 0,
        };
        assert!(mem.is_memory_budget_exceeded());
        assert!(!disk.is_memory_budget_exceeded());
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let err: SpillwayError = io_err.into();
        assert_eq!(err.code(), ErrorCode::Io);
    }
}
