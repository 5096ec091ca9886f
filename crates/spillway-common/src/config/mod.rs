//! Configuration for Spillway.

mod execution;

pub use execution::{ExecutionConfig, TempStorageConfig};
