//! Disk-backed row store.
//!
//! Rows live in a scratch engine under `equality_key ++ sequence`, where the
//! sequence is a big-endian counter. Rows of one bucket are therefore
//! contiguous and keep their insertion order. The stored value is the
//! serialized row followed by one mark byte.

use std::sync::Arc;

use bytes::{BufMut, BytesMut};
use tracing::debug;

use spillway_common::types::{Key, Value as ByteValue};
use spillway_common::{
    BoundAccount, ResourceKind, ResourceMonitor, SpillwayError, SpillwayResult,
};
use spillway_storage::scratch::{KeyRange, ScratchCursor, TempEngine};

use super::handle::{RowHandle, Slot};
use super::iter::DiskRowIter;
use super::schema::ContainerSchema;
use super::stored_key;
use crate::encoding::{encode_row, KeyEncoder};
use crate::types::Row;

const MARK_UNSET: u8 = 0;
const MARK_SET: u8 = 1;

/// Serializes `row` with its trailing mark byte.
pub(crate) fn disk_value(row: &Row, marked: bool) -> ByteValue {
    let mut buf = BytesMut::with_capacity(64);
    encode_row(row, &mut buf);
    buf.put_u8(if marked { MARK_SET } else { MARK_UNSET });
    ByteValue::from(buf.freeze())
}

/// Splits a stored value into its row bytes and mark.
pub(crate) fn split_mark(value: &[u8]) -> SpillwayResult<(&[u8], bool)> {
    match value.split_last() {
        Some((&MARK_UNSET, row)) => Ok((row, false)),
        Some((&MARK_SET, row)) => Ok((row, true)),
        Some((other, _)) => Err(SpillwayError::encoding(format!(
            "invalid mark byte: {}",
            other
        ))),
        None => Err(SpillwayError::encoding("empty stored row")),
    }
}

/// Returns `value` with its mark byte replaced.
pub(crate) fn with_mark(value: &ByteValue, marked: bool) -> SpillwayResult<ByteValue> {
    let (row, _) = split_mark(value.as_bytes())?;
    let mut buf = BytesMut::with_capacity(value.len());
    buf.put_slice(row);
    buf.put_u8(if marked { MARK_SET } else { MARK_UNSET });
    Ok(ByteValue::from(buf.freeze()))
}

/// Charges `cost` bytes of a mark rewrite to `account`. A disk budget
/// rejection is reported as `DiskFull`.
pub(crate) fn charge_rewrite(account: &mut BoundAccount, cost: u64) -> SpillwayResult<()> {
    if cost == 0 {
        return Ok(());
    }
    account.grow(cost).map_err(|e| match e {
        SpillwayError::BudgetExceeded {
            resource: ResourceKind::Disk,
            requested,
            available,
        } => SpillwayError::DiskFull {
            requested,
            available,
        },
        other => other,
    })
}

/// Rows persisted in a scratch engine, bounded by the disk monitor.
#[derive(Debug)]
pub struct DiskRowStore {
    schema: Arc<ContainerSchema>,
    encoder: Arc<dyn KeyEncoder>,
    engine: Arc<dyn TempEngine>,
    account: BoundAccount,
    next_seq: u64,
    rows: usize,
    marks_reserved: bool,
    epoch: u64,
}

impl DiskRowStore {
    /// Creates an empty store writing to `engine`.
    pub fn new(
        schema: Arc<ContainerSchema>,
        encoder: Arc<dyn KeyEncoder>,
        engine: Arc<dyn TempEngine>,
        monitor: Arc<ResourceMonitor>,
        epoch: u64,
    ) -> Self {
        Self {
            schema,
            encoder,
            engine,
            account: BoundAccount::new(monitor),
            next_seq: 0,
            rows: 0,
            marks_reserved: false,
            epoch,
        }
    }

    /// Number of stored rows.
    pub fn len(&self) -> usize {
        self.rows
    }

    /// Returns true if no rows are stored.
    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Epoch stamped into handles from this store.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Bytes reserved from the disk monitor.
    pub fn reserved_bytes(&self) -> u64 {
        self.account.used()
    }

    /// Returns true once marking is allowed.
    pub fn marks_reserved(&self) -> bool {
        self.marks_reserved
    }

    /// Allows marking. Every stored row already carries its mark byte.
    pub fn enable_marks(&mut self) {
        self.marks_reserved = true;
    }

    /// Adds a row. Fails with a disk `BudgetExceeded` without writing
    /// anything if the disk budget cannot absorb it.
    pub fn add_row(&mut self, row: &Row) -> SpillwayResult<()> {
        let key = stored_key(self.encoder.as_ref(), &self.schema, row)?;
        self.insert(&key, row, false)
    }

    pub(crate) fn insert(&mut self, key: &Key, row: &Row, marked: bool) -> SpillwayResult<()> {
        let full_key = key.with_sequence(self.next_seq);
        let value = disk_value(row, marked);
        let bytes = (full_key.len() + value.len()) as u64;

        self.account.grow(bytes)?;
        if let Err(e) = self.engine.put(full_key, value) {
            self.account.shrink(bytes);
            return Err(e.into());
        }
        self.next_seq += 1;
        self.rows += 1;
        Ok(())
    }

    /// Iterates every row in key order.
    pub fn iter_all(&mut self, skip_marked: bool) -> SpillwayResult<DiskRowIter<'_>> {
        let cursor = ScratchCursor::open(Arc::clone(&self.engine), KeyRange::all())?;
        Ok(DiskRowIter::new(
            cursor,
            &mut self.account,
            self.marks_reserved,
            skip_marked,
            self.epoch,
        ))
    }

    /// Iterates the rows whose equality key is `key`.
    pub fn iter_bucket(&mut self, key: &Key) -> SpillwayResult<DiskRowIter<'_>> {
        let range = KeyRange::prefix(key.clone());
        let cursor = ScratchCursor::open(Arc::clone(&self.engine), range)?;
        Ok(DiskRowIter::new(
            cursor,
            &mut self.account,
            self.marks_reserved,
            false,
            self.epoch,
        ))
    }

    fn lookup(&self, handle: &RowHandle) -> SpillwayResult<(Key, ByteValue)> {
        let Slot::Disk(key) = handle.slot_at(self.epoch)? else {
            return Err(SpillwayError::internal("memory handle used on disk store"));
        };
        match self.engine.get(key)? {
            Some(value) => Ok((key.clone(), value)),
            None => Err(SpillwayError::internal(format!(
                "no stored row under {:?}",
                key
            ))),
        }
    }

    /// Sets the mark of the row behind `handle`.
    ///
    /// Storage an engine adds for the rewrite is charged to the disk
    /// monitor; if the budget cannot absorb it the mark is left unchanged
    /// and `DiskFull` is returned.
    pub fn mark(&mut self, handle: &RowHandle, marked: bool) -> SpillwayResult<()> {
        let (key, value) = self.lookup(handle)?;
        if !self.marks_reserved {
            return Err(SpillwayError::MarksNotReserved);
        }
        let (_, current) = split_mark(value.as_bytes())?;
        if current == marked {
            return Ok(());
        }
        let value = with_mark(&value, marked)?;
        let cost = self.engine.rewrite_cost(&key, &value);
        charge_rewrite(&mut self.account, cost)?;
        if let Err(e) = self.engine.put(key, value) {
            self.account.shrink(cost);
            return Err(e.into());
        }
        Ok(())
    }

    /// Returns the mark of the row behind `handle`.
    pub fn is_marked(&self, handle: &RowHandle) -> SpillwayResult<bool> {
        let (_, value) = self.lookup(handle)?;
        Ok(split_mark(value.as_bytes())?.1)
    }
}

impl Drop for DiskRowStore {
    fn drop(&mut self) {
        if self.rows > 0 {
            debug!(
                rows = self.rows,
                bytes = self.account.used(),
                "releasing disk row store"
            );
        }
    }
}
