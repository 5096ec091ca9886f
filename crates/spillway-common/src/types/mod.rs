//! Type definitions for Spillway.

mod keys;

pub use keys::{Key, Value};
