//! Budgeted resource monitors.
//!
//! A `ResourceMonitor` tracks how many bytes of one resource (memory or
//! disk) are reserved against a budget. Monitors are shared by every
//! container of a query, so reservation is a single atomic
//! compare-and-update on the allocation counter: a request either fits
//! entirely and is applied, or is rejected without side effect.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::{SpillwayError, SpillwayResult};

/// The resource a monitor budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    /// Process memory.
    Memory,
    /// Scratch disk space.
    Disk,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::Disk => write!(f, "disk"),
        }
    }
}

/// A named budget for one resource.
///
/// # Example
///
/// ```rust
/// use spillway_common::monitor::{ResourceKind, ResourceMonitor};
///
/// let monitor = ResourceMonitor::new("join-disk", ResourceKind::Disk, 100);
/// monitor.reserve(60).unwrap();
/// assert!(monitor.reserve(60).is_err());
/// assert_eq!(monitor.allocated(), 60);
/// monitor.release(60);
/// assert_eq!(monitor.allocated(), 0);
/// ```
pub struct ResourceMonitor {
    /// Name used in logs.
    name: String,
    /// Which resource this monitor tracks.
    kind: ResourceKind,
    /// Maximum number of bytes that may be allocated.
    budget: AtomicU64,
    /// Currently allocated bytes.
    allocated: AtomicU64,
    /// High-water mark of `allocated`.
    peak: AtomicU64,
}

impl ResourceMonitor {
    /// Creates a monitor with the given budget in bytes.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: ResourceKind, budget: u64) -> Self {
        Self {
            name: name.into(),
            kind,
            budget: AtomicU64::new(budget),
            allocated: AtomicU64::new(0),
            peak: AtomicU64::new(0),
        }
    }

    /// Creates a monitor whose budget never rejects a request.
    #[must_use]
    pub fn unbounded(name: impl Into<String>, kind: ResourceKind) -> Self {
        Self::new(name, kind, u64::MAX)
    }

    /// Returns the monitor name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the monitored resource.
    #[inline]
    #[must_use]
    pub const fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Returns the current budget.
    #[inline]
    #[must_use]
    pub fn budget(&self) -> u64 {
        self.budget.load(Ordering::Acquire)
    }

    /// Replaces the budget.
    ///
    /// Lowering the budget below the current allocation does not revoke
    /// anything; it only rejects further reservations.
    pub fn set_budget(&self, budget: u64) {
        self.budget.store(budget, Ordering::Release);
    }

    /// Returns the currently allocated bytes.
    #[inline]
    #[must_use]
    pub fn allocated(&self) -> u64 {
        self.allocated.load(Ordering::Acquire)
    }

    /// Returns the bytes still available under the budget.
    #[must_use]
    pub fn available(&self) -> u64 {
        self.budget().saturating_sub(self.allocated())
    }

    /// Returns the largest allocation observed.
    #[must_use]
    pub fn peak(&self) -> u64 {
        self.peak.load(Ordering::Relaxed)
    }

    /// Reserves `bytes` if they fit within the budget.
    ///
    /// Fails with [`SpillwayError::BudgetExceeded`] and leaves the
    /// allocation unchanged otherwise.
    pub fn reserve(&self, bytes: u64) -> SpillwayResult<()> {
        if bytes == 0 {
            return Ok(());
        }
        let budget = self.budget();
        let previous = self
            .allocated
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                used.checked_add(bytes).filter(|next| *next <= budget)
            })
            .map_err(|used| SpillwayError::BudgetExceeded {
                resource: self.kind,
                requested: bytes,
                available: budget.saturating_sub(used),
            })?;
        self.peak.fetch_max(previous + bytes, Ordering::Relaxed);
        Ok(())
    }

    /// Returns `bytes` to the budget.
    ///
    /// Callers pair every release with an earlier reservation; an
    /// unmatched release is clamped at zero and logged.
    pub fn release(&self, bytes: u64) {
        if bytes == 0 {
            return;
        }
        let result = self
            .allocated
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                Some(used.saturating_sub(bytes))
            });
        if let Ok(previous) = result {
            if previous < bytes {
                tracing::warn!(
                    monitor = %self.name,
                    released = bytes,
                    allocated = previous,
                    "released more than was reserved"
                );
            }
        }
    }
}

impl fmt::Debug for ResourceMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceMonitor")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("budget", &self.budget())
            .field("allocated", &self.allocated())
            .finish()
    }
}
