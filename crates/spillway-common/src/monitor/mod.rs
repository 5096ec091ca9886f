//! Resource accounting for Spillway.
//!
//! Two monitors exist per query, one for memory and one for scratch disk.
//! They are created by the caller and injected into every container, so
//! sibling containers draw from the same budget:
//!
//! - **`ResourceMonitor`**: the shared, atomically updated budget
//! - **`BoundAccount`**: one store's share of a monitor, released on drop

mod account;
mod resource;

pub use account::BoundAccount;
pub use resource::{ResourceKind, ResourceMonitor};
