//! Row iterators.
//!
//! Iterators follow a cursor protocol: a fresh iterator is unpositioned
//! until [`RowIterator::rewind`], then [`RowIterator::valid`] and
//! [`RowIterator::next`] walk it. Every iterator holds an exclusive borrow
//! of its store, so the store cannot change while it is open.

use std::collections::btree_map;
use std::collections::BTreeMap;

use spillway_common::types::{Key, Value as ByteValue};
use spillway_common::{BoundAccount, SpillwayError, SpillwayResult};
use spillway_storage::scratch::ScratchCursor;

use super::disk::{charge_rewrite, split_mark, with_mark};
use super::handle::RowHandle;
use crate::encoding::decode_row;
use crate::types::Row;

/// Cursor-style access to stored rows.
pub trait RowIterator {
    /// Positions the iterator on its first row.
    fn rewind(&mut self) -> SpillwayResult<()>;

    /// Returns true if the iterator is positioned on a row.
    fn valid(&self) -> bool;

    /// Advances to the next row.
    fn next(&mut self) -> SpillwayResult<()>;

    /// Returns the current row.
    fn row(&self) -> SpillwayResult<&Row>;

    /// Returns a handle to the current row.
    fn handle(&self) -> SpillwayResult<RowHandle>;

    /// Returns the mark of the current row.
    fn is_marked(&self) -> SpillwayResult<bool>;

    /// Sets the mark of the current row.
    fn mark(&mut self, marked: bool) -> SpillwayResult<()>;

    /// Releases the iterator. Idempotent.
    fn close(&mut self);
}

fn not_positioned() -> SpillwayError {
    SpillwayError::iterator("iterator is not positioned on a row")
}

#[derive(Debug, Clone, Copy)]
enum MemScope<'a> {
    All(&'a BTreeMap<Key, Vec<usize>>),
    Bucket(&'a [usize]),
}

/// Iterator over the memory store.
#[derive(Debug)]
pub struct MemRowIter<'a> {
    scope: MemScope<'a>,
    outer: Option<btree_map::Values<'a, Key, Vec<usize>>>,
    current: &'a [usize],
    pos: usize,
    rows: &'a [Row],
    marks: &'a mut [bool],
    marks_reserved: bool,
    skip_marked: bool,
    epoch: u64,
    closed: bool,
}

impl<'a> MemRowIter<'a> {
    pub(crate) fn all(
        buckets: &'a BTreeMap<Key, Vec<usize>>,
        rows: &'a [Row],
        marks: &'a mut [bool],
        marks_reserved: bool,
        skip_marked: bool,
        epoch: u64,
    ) -> Self {
        Self::with_scope(
            MemScope::All(buckets),
            rows,
            marks,
            marks_reserved,
            skip_marked,
            epoch,
        )
    }

    pub(crate) fn bucket(
        bucket: &'a [usize],
        rows: &'a [Row],
        marks: &'a mut [bool],
        marks_reserved: bool,
        epoch: u64,
    ) -> Self {
        Self::with_scope(
            MemScope::Bucket(bucket),
            rows,
            marks,
            marks_reserved,
            false,
            epoch,
        )
    }

    fn with_scope(
        scope: MemScope<'a>,
        rows: &'a [Row],
        marks: &'a mut [bool],
        marks_reserved: bool,
        skip_marked: bool,
        epoch: u64,
    ) -> Self {
        Self {
            scope,
            outer: None,
            current: &[],
            pos: 0,
            rows,
            marks,
            marks_reserved,
            skip_marked,
            epoch,
            closed: false,
        }
    }

    fn index(&self) -> SpillwayResult<usize> {
        if self.closed {
            return Err(not_positioned());
        }
        self.current
            .get(self.pos)
            .copied()
            .ok_or_else(not_positioned)
    }

    // Moves forward to the first row at or after `pos` that is not skipped.
    fn settle(&mut self) {
        loop {
            if let Some(&idx) = self.current.get(self.pos) {
                if self.skip_marked && self.marks[idx] {
                    self.pos += 1;
                    continue;
                }
                return;
            }
            match self.outer.as_mut().and_then(Iterator::next) {
                Some(bucket) => {
                    self.current = bucket.as_slice();
                    self.pos = 0;
                }
                None => return,
            }
        }
    }
}

impl RowIterator for MemRowIter<'_> {
    fn rewind(&mut self) -> SpillwayResult<()> {
        if self.closed {
            return Err(SpillwayError::iterator("iterator is closed"));
        }
        match self.scope {
            MemScope::All(buckets) => {
                self.outer = Some(buckets.values());
                self.current = &[];
            }
            MemScope::Bucket(bucket) => {
                self.outer = None;
                self.current = bucket;
            }
        }
        self.pos = 0;
        self.settle();
        Ok(())
    }

    fn valid(&self) -> bool {
        !self.closed && self.pos < self.current.len()
    }

    fn next(&mut self) -> SpillwayResult<()> {
        if self.valid() {
            self.pos += 1;
            self.settle();
        }
        Ok(())
    }

    fn row(&self) -> SpillwayResult<&Row> {
        let idx = self.index()?;
        Ok(&self.rows[idx])
    }

    fn handle(&self) -> SpillwayResult<RowHandle> {
        Ok(RowHandle::memory(self.epoch, self.index()?))
    }

    fn is_marked(&self) -> SpillwayResult<bool> {
        Ok(self.marks[self.index()?])
    }

    fn mark(&mut self, marked: bool) -> SpillwayResult<()> {
        if !self.marks_reserved {
            return Err(SpillwayError::MarksNotReserved);
        }
        let idx = self.index()?;
        self.marks[idx] = marked;
        Ok(())
    }

    fn close(&mut self) {
        self.closed = true;
        self.outer = None;
        self.current = &[];
    }
}

#[derive(Debug)]
struct DiskEntry {
    key: Key,
    raw: ByteValue,
    row: Row,
    marked: bool,
}

/// Iterator over the disk store.
///
/// Borrows the store's disk account so mark rewrites are charged to it.
#[derive(Debug)]
pub struct DiskRowIter<'a> {
    cursor: ScratchCursor,
    account: &'a mut BoundAccount,
    current: Option<DiskEntry>,
    marks_reserved: bool,
    skip_marked: bool,
    epoch: u64,
    closed: bool,
}

impl<'a> DiskRowIter<'a> {
    pub(crate) fn new(
        cursor: ScratchCursor,
        account: &'a mut BoundAccount,
        marks_reserved: bool,
        skip_marked: bool,
        epoch: u64,
    ) -> Self {
        Self {
            cursor,
            account,
            current: None,
            marks_reserved,
            skip_marked,
            epoch,
            closed: false,
        }
    }

    fn entry(&self) -> SpillwayResult<&DiskEntry> {
        self.current.as_ref().ok_or_else(not_positioned)
    }

    // Decodes the cursor entry, skipping marked rows when asked to.
    fn settle(&mut self) -> SpillwayResult<()> {
        loop {
            let Some(entry) = self.cursor.entry() else {
                self.current = None;
                return Ok(());
            };
            let (row_bytes, marked) = split_mark(entry.value.as_bytes())?;
            if self.skip_marked && marked {
                self.cursor.next()?;
                continue;
            }
            let row = decode_row(row_bytes)?;
            self.current = Some(DiskEntry {
                key: entry.key.clone(),
                raw: entry.value.clone(),
                row,
                marked,
            });
            return Ok(());
        }
    }
}

impl RowIterator for DiskRowIter<'_> {
    fn rewind(&mut self) -> SpillwayResult<()> {
        if self.closed {
            return Err(SpillwayError::iterator("iterator is closed"));
        }
        self.cursor.rewind()?;
        self.settle()
    }

    fn valid(&self) -> bool {
        !self.closed && self.current.is_some()
    }

    fn next(&mut self) -> SpillwayResult<()> {
        if self.valid() {
            self.cursor.next()?;
            self.settle()?;
        }
        Ok(())
    }

    fn row(&self) -> SpillwayResult<&Row> {
        Ok(&self.entry()?.row)
    }

    fn handle(&self) -> SpillwayResult<RowHandle> {
        Ok(RowHandle::disk(self.epoch, self.entry()?.key.clone()))
    }

    fn is_marked(&self) -> SpillwayResult<bool> {
        Ok(self.entry()?.marked)
    }

    fn mark(&mut self, marked: bool) -> SpillwayResult<()> {
        if !self.marks_reserved {
            return Err(SpillwayError::MarksNotReserved);
        }
        let entry = self.current.as_mut().ok_or_else(not_positioned)?;
        if entry.marked == marked {
            return Ok(());
        }
        let raw = with_mark(&entry.raw, marked)?;
        let cost = self.cursor.rewrite_cost(&raw);
        charge_rewrite(self.account, cost)?;
        if let Err(e) = self.cursor.replace_value(raw.clone()) {
            self.account.shrink(cost);
            return Err(e.into());
        }
        entry.raw = raw;
        entry.marked = marked;
        Ok(())
    }

    fn close(&mut self) {
        self.closed = true;
        self.current = None;
        self.cursor.close();
    }
}

/// Iterator returned by a container, over whichever store is active.
#[derive(Debug)]
pub enum ContainerIter<'a> {
    /// Rows held in memory.
    Memory(MemRowIter<'a>),
    /// Rows spilled to disk.
    Disk(DiskRowIter<'a>),
    /// A lookup that can match nothing.
    Empty,
}

impl RowIterator for ContainerIter<'_> {
    fn rewind(&mut self) -> SpillwayResult<()> {
        match self {
            ContainerIter::Memory(it) => it.rewind(),
            ContainerIter::Disk(it) => it.rewind(),
            ContainerIter::Empty => Ok(()),
        }
    }

    fn valid(&self) -> bool {
        match self {
            ContainerIter::Memory(it) => it.valid(),
            ContainerIter::Disk(it) => it.valid(),
            ContainerIter::Empty => false,
        }
    }

    fn next(&mut self) -> SpillwayResult<()> {
        match self {
            ContainerIter::Memory(it) => it.next(),
            ContainerIter::Disk(it) => it.next(),
            ContainerIter::Empty => Ok(()),
        }
    }

    fn row(&self) -> SpillwayResult<&Row> {
        match self {
            ContainerIter::Memory(it) => it.row(),
            ContainerIter::Disk(it) => it.row(),
            ContainerIter::Empty => Err(not_positioned()),
        }
    }

    fn handle(&self) -> SpillwayResult<RowHandle> {
        match self {
            ContainerIter::Memory(it) => it.handle(),
            ContainerIter::Disk(it) => it.handle(),
            ContainerIter::Empty => Err(not_positioned()),
        }
    }

    fn is_marked(&self) -> SpillwayResult<bool> {
        match self {
            ContainerIter::Memory(it) => it.is_marked(),
            ContainerIter::Disk(it) => it.is_marked(),
            ContainerIter::Empty => Err(not_positioned()),
        }
    }

    fn mark(&mut self, marked: bool) -> SpillwayResult<()> {
        match self {
            ContainerIter::Memory(it) => it.mark(marked),
            ContainerIter::Disk(it) => it.mark(marked),
            ContainerIter::Empty => Err(not_positioned()),
        }
    }

    fn close(&mut self) {
        match self {
            ContainerIter::Memory(it) => it.close(),
            ContainerIter::Disk(it) => it.close(),
            ContainerIter::Empty => {}
        }
    }
}
