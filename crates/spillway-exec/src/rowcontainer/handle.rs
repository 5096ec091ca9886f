//! Row handles.

use spillway_common::types::Key;
use spillway_common::{SpillwayError, SpillwayResult};

/// Identifies one stored row for marking.
///
/// A handle is only meaningful to the store that issued it. Each store is
/// stamped with an epoch that changes on spill and reset, so a handle
/// obtained before either is rejected instead of addressing another row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RowHandle {
    epoch: u64,
    slot: Slot,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum Slot {
    Memory(usize),
    Disk(Key),
}

impl RowHandle {
    pub(crate) fn memory(epoch: u64, index: usize) -> Self {
        Self {
            epoch,
            slot: Slot::Memory(index),
        }
    }

    pub(crate) fn disk(epoch: u64, key: Key) -> Self {
        Self {
            epoch,
            slot: Slot::Disk(key),
        }
    }

    /// Epoch of the store that issued this handle.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Returns the slot if the handle was issued by a store at `epoch`.
    pub(crate) fn slot_at(&self, epoch: u64) -> SpillwayResult<&Slot> {
        if self.epoch != epoch {
            return Err(SpillwayError::StaleHandle {
                handle_epoch: self.epoch,
                store_epoch: epoch,
            });
        }
        Ok(&self.slot)
    }
}
