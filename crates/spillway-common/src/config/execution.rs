//! Execution-time configuration structures.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::constants::{DEFAULT_DISK_BUDGET, DEFAULT_MEMORY_BUDGET};
use crate::error::{SpillwayError, SpillwayResult};

/// Configuration shared by every row container of one query.
///
/// # Example
///
/// ```rust
/// use spillway_common::config::{ExecutionConfig, TempStorageConfig};
///
/// let config = ExecutionConfig::default()
///     .with_memory_budget(1 << 20)
///     .with_temp_storage(TempStorageConfig::InMemory);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Memory budget in bytes shared by all containers.
    /// Default: 64 MB
    pub memory_budget: u64,

    /// Scratch disk budget in bytes shared by all containers.
    /// Default: 16 GB
    pub disk_budget: u64,

    /// Where spilled rows are written.
    pub temp_storage: TempStorageConfig,

    /// Flush scratch file writes before acknowledging them.
    /// Default: false
    pub sync_scratch_writes: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            memory_budget: DEFAULT_MEMORY_BUDGET,
            disk_budget: DEFAULT_DISK_BUDGET,
            temp_storage: TempStorageConfig::default(),
            sync_scratch_writes: false,
        }
    }
}

impl ExecutionConfig {
    /// Creates a minimal configuration for testing.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            memory_budget: 64 * 1024,
            disk_budget: 64 * 1024 * 1024,
            temp_storage: TempStorageConfig::InMemory,
            sync_scratch_writes: false,
        }
    }

    /// Sets the memory budget.
    #[must_use]
    pub fn with_memory_budget(mut self, bytes: u64) -> Self {
        self.memory_budget = bytes;
        self
    }

    /// Sets the disk budget.
    #[must_use]
    pub fn with_disk_budget(mut self, bytes: u64) -> Self {
        self.disk_budget = bytes;
        self
    }

    /// Sets the scratch storage location.
    #[must_use]
    pub fn with_temp_storage(mut self, temp_storage: TempStorageConfig) -> Self {
        self.temp_storage = temp_storage;
        self
    }

    /// Sets whether scratch writes are synced.
    #[must_use]
    pub fn with_sync_scratch_writes(mut self, sync: bool) -> Self {
        self.sync_scratch_writes = sync;
        self
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> SpillwayResult<()> {
        if self.disk_budget == 0 {
            return Err(SpillwayError::config("disk_budget must be greater than 0"));
        }

        if let TempStorageConfig::Directory(dir) = &self.temp_storage {
            if dir.as_os_str().is_empty() {
                return Err(SpillwayError::config(
                    "temp_storage directory must not be empty",
                ));
            }
        }

        Ok(())
    }
}

/// Location of the scratch engine created on first spill.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TempStorageConfig {
    /// Keep spilled rows in an in-process ordered map.
    #[default]
    InMemory,
    /// Write spilled rows to a temporary file inside this directory.
    Directory(PathBuf),
}

impl TempStorageConfig {
    /// Returns true if spilled rows go to a file.
    #[must_use]
    pub const fn is_file_backed(&self) -> bool {
        matches!(self, Self::Directory(_))
    }
}
