//! In-memory row store.

use std::collections::BTreeMap;
use std::sync::Arc;

use spillway_common::types::Key;
use spillway_common::{
    BoundAccount, ResourceMonitor, SpillwayError, SpillwayResult, MARK_SIZE, MEM_BUCKET_OVERHEAD,
    MEM_ROW_OVERHEAD,
};

use super::handle::{RowHandle, Slot};
use super::iter::MemRowIter;
use super::schema::ContainerSchema;
use super::stored_key;
use crate::encoding::KeyEncoder;
use crate::types::Row;

/// Rows held in process memory, bounded by the memory monitor.
///
/// Rows are appended to a vector; an ordered map from equality key to row
/// indices defines the buckets and the scan order.
#[derive(Debug)]
pub struct MemRowStore {
    schema: Arc<ContainerSchema>,
    encoder: Arc<dyn KeyEncoder>,
    buckets: BTreeMap<Key, Vec<usize>>,
    rows: Vec<Row>,
    marks: Vec<bool>,
    marks_reserved: bool,
    account: BoundAccount,
    epoch: u64,
}

impl MemRowStore {
    /// Creates an empty store.
    pub fn new(
        schema: Arc<ContainerSchema>,
        encoder: Arc<dyn KeyEncoder>,
        monitor: Arc<ResourceMonitor>,
        epoch: u64,
    ) -> Self {
        Self {
            schema,
            encoder,
            buckets: BTreeMap::new(),
            rows: Vec::new(),
            marks: Vec::new(),
            marks_reserved: false,
            account: BoundAccount::new(monitor),
            epoch,
        }
    }

    /// Number of stored rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if no rows are stored.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of distinct equality keys.
    pub fn num_buckets(&self) -> usize {
        self.buckets.len()
    }

    /// Epoch stamped into handles from this store.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Bytes reserved from the memory monitor.
    pub fn reserved_bytes(&self) -> u64 {
        self.account.used()
    }

    /// Returns true once mark memory has been reserved.
    pub fn marks_reserved(&self) -> bool {
        self.marks_reserved
    }

    /// Reserves one mark per stored row. Idempotent.
    ///
    /// Rows added afterwards reserve their own mark.
    pub fn reserve_marks(&mut self) -> SpillwayResult<()> {
        if self.marks_reserved {
            return Ok(());
        }
        self.account.grow(self.rows.len() as u64 * MARK_SIZE)?;
        self.marks_reserved = true;
        Ok(())
    }

    /// Adds a row. Fails with a memory `BudgetExceeded`, storing nothing,
    /// if the memory budget cannot absorb it.
    pub fn add_row(&mut self, row: &Row) -> SpillwayResult<()> {
        let key = stored_key(self.encoder.as_ref(), &self.schema, row)?;

        let mut bytes = row.estimated_size() + MEM_ROW_OVERHEAD;
        if !self.has_bucket(&key) {
            bytes += key.len() as u64 + MEM_BUCKET_OVERHEAD;
        }
        if self.marks_reserved {
            bytes += MARK_SIZE;
        }
        self.account.grow(bytes)?;

        let idx = self.rows.len();
        self.rows.push(row.clone());
        self.marks.push(false);
        self.push_to_bucket(key, idx);
        Ok(())
    }

    // Ordered input mostly lands in the greatest bucket.
    fn has_bucket(&self, key: &Key) -> bool {
        if !self.schema.ordering().is_empty()
            && self.buckets.last_key_value().is_some_and(|(k, _)| k == key)
        {
            return true;
        }
        self.buckets.contains_key(key)
    }

    fn push_to_bucket(&mut self, key: Key, idx: usize) {
        if !self.schema.ordering().is_empty() {
            if let Some(mut last) = self.buckets.last_entry() {
                if *last.key() == key {
                    last.get_mut().push(idx);
                    return;
                }
            }
        }
        self.buckets.entry(key).or_default().push(idx);
    }

    /// Iterates every row in key order, insertion order within a bucket.
    pub fn iter_all(&mut self, skip_marked: bool) -> MemRowIter<'_> {
        MemRowIter::all(
            &self.buckets,
            &self.rows,
            &mut self.marks,
            self.marks_reserved,
            skip_marked,
            self.epoch,
        )
    }

    /// Iterates the rows whose equality key is `key`.
    pub fn iter_bucket(&mut self, key: &Key) -> MemRowIter<'_> {
        let bucket = self.buckets.get(key).map_or(&[][..], Vec::as_slice);
        MemRowIter::bucket(
            bucket,
            &self.rows,
            &mut self.marks,
            self.marks_reserved,
            self.epoch,
        )
    }

    /// Every row with its equality key and mark, in scan order.
    pub fn export_all(&self) -> impl Iterator<Item = (&Key, &Row, bool)> + '_ {
        let rows = &self.rows;
        let marks = &self.marks;
        self.buckets
            .iter()
            .flat_map(move |(key, idxs)| idxs.iter().map(move |&i| (key, &rows[i], marks[i])))
    }

    fn index(&self, handle: &RowHandle) -> SpillwayResult<usize> {
        match handle.slot_at(self.epoch)? {
            Slot::Memory(idx) if *idx < self.rows.len() => Ok(*idx),
            Slot::Memory(idx) => Err(SpillwayError::internal(format!(
                "row index {} out of range",
                idx
            ))),
            Slot::Disk(_) => Err(SpillwayError::internal("disk handle used on memory store")),
        }
    }

    /// Sets the mark of the row behind `handle`.
    ///
    /// A handle from another epoch is stale whether or not marks are
    /// reserved.
    pub fn mark(&mut self, handle: &RowHandle, marked: bool) -> SpillwayResult<()> {
        let idx = self.index(handle)?;
        if !self.marks_reserved {
            return Err(SpillwayError::MarksNotReserved);
        }
        self.marks[idx] = marked;
        Ok(())
    }

    /// Returns the mark of the row behind `handle`.
    pub fn is_marked(&self, handle: &RowHandle) -> SpillwayResult<bool> {
        Ok(self.marks[self.index(handle)?])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::OrderedKeyEncoder;
    use crate::rowcontainer::iter::RowIterator;
    use crate::types::ColumnType;
    use spillway_common::ResourceKind;

    fn store_with(schema: ContainerSchema, budget: u64) -> (MemRowStore, Arc<ResourceMonitor>) {
        let monitor = Arc::new(ResourceMonitor::new("mem", ResourceKind::Memory, budget));
        let store = MemRowStore::new(
            Arc::new(schema),
            Arc::new(OrderedKeyEncoder::new()),
            Arc::clone(&monitor),
            0,
        );
        (store, monitor)
    }

    fn store(budget: u64) -> (MemRowStore, Arc<ResourceMonitor>) {
        let schema = ContainerSchema::new(vec![ColumnType::Int, ColumnType::Int], vec![0]);
        store_with(schema, budget)
    }

    #[test]
    fn test_add_row_accounting() {
        let (mut store, monitor) = store(u64::MAX);
        store.add_row(&Row::ints(&[1, 1])).unwrap();
        let first = monitor.allocated();
        assert!(first > 0);

        // Same bucket: no key or bucket overhead.
        store.add_row(&Row::ints(&[1, 2])).unwrap();
        let second = monitor.allocated() - first;
        assert!(second < first);

        assert_eq!(store.len(), 2);
        assert_eq!(store.num_buckets(), 1);
        assert_eq!(store.reserved_bytes(), monitor.allocated());

        drop(store);
        assert_eq!(monitor.allocated(), 0);
    }

    #[test]
    fn test_budget_rejection_stores_nothing() {
        let (mut store, monitor) = store(1);
        let err = store.add_row(&Row::ints(&[1, 1])).unwrap_err();
        assert!(err.is_memory_budget_exceeded());
        assert!(store.is_empty());
        assert_eq!(store.num_buckets(), 0);
        assert_eq!(monitor.allocated(), 0);
    }

    #[test]
    fn test_export_order() {
        let (mut store, _monitor) = store(u64::MAX);
        for (a, b) in [(3, 0), (1, 1), (3, 2), (1, 3)] {
            store.add_row(&Row::ints(&[a, b])).unwrap();
        }
        let exported: Vec<Row> = store.export_all().map(|(_, row, _)| row.clone()).collect();
        assert_eq!(
            exported,
            vec![
                Row::ints(&[1, 1]),
                Row::ints(&[1, 3]),
                Row::ints(&[3, 0]),
                Row::ints(&[3, 2])
            ]
        );
    }

    #[test]
    fn test_reserve_marks() {
        let (mut store, monitor) = store(u64::MAX);
        store.add_row(&Row::ints(&[1, 1])).unwrap();
        store.add_row(&Row::ints(&[2, 1])).unwrap();
        let before = monitor.allocated();

        store.reserve_marks().unwrap();
        store.reserve_marks().unwrap();
        assert_eq!(monitor.allocated(), before + 2 * MARK_SIZE);
        assert!(store.marks_reserved());
    }

    #[test]
    fn test_mark_by_handle() {
        let (mut store, _monitor) = store(u64::MAX);
        store.add_row(&Row::ints(&[1, 1])).unwrap();
        store.add_row(&Row::ints(&[2, 1])).unwrap();

        let key = stored_key(&OrderedKeyEncoder::new(), &store.schema, &Row::ints(&[2, 0])).unwrap();
        let handle = {
            let mut it = store.iter_bucket(&key);
            it.rewind().unwrap();
            it.handle().unwrap()
        };
        assert!(matches!(
            store.mark(&handle, true),
            Err(SpillwayError::MarksNotReserved)
        ));

        store.reserve_marks().unwrap();
        store.mark(&handle, true).unwrap();
        assert!(store.is_marked(&handle).unwrap());

        let marked: Vec<bool> = store.export_all().map(|(_, _, m)| m).collect();
        assert_eq!(marked, vec![false, true]);
    }

    #[test]
    fn test_stale_handle_wins_over_unreserved_marks() {
        let (mut store, _monitor) = store(u64::MAX);
        store.add_row(&Row::ints(&[1, 1])).unwrap();

        let stale = RowHandle::memory(7, 0);
        assert!(matches!(
            store.mark(&stale, true),
            Err(SpillwayError::StaleHandle {
                handle_epoch: 7,
                store_epoch: 0
            })
        ));
    }

    #[test]
    fn test_missing_bucket_is_empty() {
        let (mut store, _monitor) = store(u64::MAX);
        store.add_row(&Row::ints(&[1, 1])).unwrap();
        let mut it = store.iter_bucket(&Key::from_bytes(b"nope"));
        it.rewind().unwrap();
        assert!(!it.valid());
    }

    #[test]
    fn test_ordering_hint_groups_rows() {
        let schema = ContainerSchema::new(vec![ColumnType::Int, ColumnType::Int], vec![0])
            .with_ordering(vec![0]);
        let (mut store, _monitor) = store_with(schema, u64::MAX);
        for (a, b) in [(1, 0), (1, 1), (2, 2), (2, 3), (0, 4)] {
            store.add_row(&Row::ints(&[a, b])).unwrap();
        }
        assert_eq!(store.num_buckets(), 3);

        let tags: Vec<i32> = store
            .export_all()
            .map(|(_, row, _)| match row.get(1) {
                Some(crate::types::Value::Int(v)) => *v,
                _ => -1,
            })
            .collect();
        assert_eq!(tags, vec![4, 0, 1, 2, 3]);
    }
}
