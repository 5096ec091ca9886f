//! Error handling for Spillway.
//!
//! This module provides a unified error type and result alias used
//! across all Spillway components.

mod container;

pub use container::{ErrorCode, SpillwayError};

/// Result type alias for Spillway operations.
pub type SpillwayResult<T> = std::result::Result<T, SpillwayError>;
