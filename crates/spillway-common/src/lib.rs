//! # spillway-common
//!
//! Common types, errors, and resource accounting for Spillway.
//!
//! This crate provides the foundational pieces shared by the scratch storage
//! engines and the execution-time row containers:
//!
//! - **Types**: byte-string `Key` and `Value` wrappers
//! - **Errors**: unified error handling with `SpillwayError`
//! - **Config**: execution and temp-storage configuration
//! - **Monitor**: budgeted memory/disk resource monitors and bound accounts
//! - **Constants**: accounting overheads and limits
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use spillway_common::monitor::{BoundAccount, ResourceKind, ResourceMonitor};
//!
//! let monitor = Arc::new(ResourceMonitor::new("query-mem", ResourceKind::Memory, 1024));
//! let mut account = BoundAccount::new(Arc::clone(&monitor));
//! account.grow(512).unwrap();
//! assert_eq!(monitor.allocated(), 512);
//! drop(account);
//! assert_eq!(monitor.allocated(), 0);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod constants;
pub mod error;
pub mod monitor;
pub mod types;

pub use constants::*;
pub use error::{ErrorCode, SpillwayError, SpillwayResult};
pub use monitor::{BoundAccount, ResourceKind, ResourceMonitor};
pub use types::{Key, Value};
