//! Per-store accounts against a shared monitor.

use std::sync::Arc;

use crate::error::SpillwayResult;

use super::ResourceMonitor;

/// Tracks what one store has reserved from a shared [`ResourceMonitor`].
///
/// Whatever is still held when the account is dropped goes back to the
/// monitor, so a store that is discarded on any path leaves the monitor
/// where it found it.
#[derive(Debug)]
pub struct BoundAccount {
    monitor: Arc<ResourceMonitor>,
    used: u64,
}

impl BoundAccount {
    /// Opens an empty account.
    #[must_use]
    pub fn new(monitor: Arc<ResourceMonitor>) -> Self {
        Self { monitor, used: 0 }
    }

    /// Returns the bytes held by this account.
    #[inline]
    #[must_use]
    pub const fn used(&self) -> u64 {
        self.used
    }

    /// Returns the monitor this account draws from.
    #[inline]
    #[must_use]
    pub fn monitor(&self) -> &Arc<ResourceMonitor> {
        &self.monitor
    }

    /// Reserves `bytes` more from the monitor.
    pub fn grow(&mut self, bytes: u64) -> SpillwayResult<()> {
        self.monitor.reserve(bytes)?;
        self.used += bytes;
        Ok(())
    }

    /// Returns up to `bytes` to the monitor.
    pub fn shrink(&mut self, bytes: u64) {
        let bytes = bytes.min(self.used);
        self.monitor.release(bytes);
        self.used -= bytes;
    }

    /// Returns everything this account holds.
    pub fn clear(&mut self) {
        self.monitor.release(self.used);
        self.used = 0;
    }
}

impl Drop for BoundAccount {
    fn drop(&mut self) {
        self.clear();
    }
}
