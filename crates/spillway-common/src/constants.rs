//! System-wide constants for Spillway.
//!
//! Accounting overheads are estimates: they only need to be stable so that a
//! store releases exactly what it reserved.

// =============================================================================
// Budget Defaults
// =============================================================================

/// Default memory budget for one execution context (64 MB).
pub const DEFAULT_MEMORY_BUDGET: u64 = 64 * 1024 * 1024;

/// Default disk budget for one execution context (16 GB).
///
/// Disk budgets are provisioned well above memory budgets so that a spill
/// can always absorb everything the memory store held.
pub const DEFAULT_DISK_BUDGET: u64 = 16 * 1024 * 1024 * 1024;

// =============================================================================
// Accounting Overheads
// =============================================================================

/// Bytes charged per stored mark.
pub const MARK_SIZE: u64 = 1;

/// Fixed per-row bookkeeping charged by the in-memory store.
///
/// Covers the row slot and its position inside the bucket index.
pub const MEM_ROW_OVERHEAD: u64 = 32;

/// Fixed per-bucket bookkeeping charged by the in-memory store when a new
/// equality key is first seen.
pub const MEM_BUCKET_OVERHEAD: u64 = 48;

/// Length of the big-endian sequence suffix appended to disk keys.
pub const SEQUENCE_SUFFIX_LEN: usize = 8;

// =============================================================================
// Key and Value Limits
// =============================================================================

/// Maximum key size accepted by the scratch engines.
///
/// Scratch records frame lengths as `u32`, so this is the only limit; any
/// equality key the memory store accepts must also fit on disk.
pub const MAX_KEY_SIZE: usize = u32::MAX as usize;

/// Maximum value size accepted by the scratch engines.
pub const MAX_VALUE_SIZE: usize = u32::MAX as usize;
