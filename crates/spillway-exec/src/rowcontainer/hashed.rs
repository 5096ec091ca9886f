//! The composite container.
//!
//! A [`HashedRowContainer`] starts every generation in memory. When the
//! memory monitor rejects a row it migrates everything, marks included, to
//! a disk store and keeps going there until reset or closed:
//!
//! ```text
//!            new / unsafe_reset
//!                   │
//!                   ▼
//!   ┌──────────┐  memory budget   ┌──────────┐
//!   │  Memory  │ ───────────────▶ │   Disk   │
//!   └──────────┘     exceeded     └──────────┘
//!        │                          │      │
//!        │ close          close     │      │ spill failed
//!        ▼                          ▼      ▼
//!   ┌──────────┐               ┌──────────┐
//!   │  Closed  │               │  Failed  │
//!   └──────────┘               └──────────┘
//! ```
//!
//! A disk rejection during normal inserts is reported as `DiskFull` and
//! leaves the container usable. A disk rejection while migrating is
//! reported as `SpillFailed`: the container releases everything it holds
//! and refuses further use. Rows already copied to the scratch engine are
//! not rolled back one by one; closing the engine discards them.

use std::sync::Arc;

use tracing::{debug, info, warn};

use spillway_common::config::TempStorageConfig;
use spillway_common::{ResourceKind, ResourceMonitor, SpillwayError, SpillwayResult};
use spillway_storage::scratch::{open_temp_engine, TempEngine};

use super::disk::DiskRowStore;
use super::handle::RowHandle;
use super::iter::ContainerIter;
use super::mem::MemRowStore;
use super::lookup_key;
use super::schema::ContainerSchema;
use crate::encoding::{KeyEncoder, OrderedKeyEncoder};
use crate::types::Row;

/// Monitors and scratch storage a container draws on.
#[derive(Debug, Clone)]
pub struct ContainerResources {
    /// Shared memory monitor.
    pub memory: Arc<ResourceMonitor>,
    /// Shared disk monitor.
    pub disk: Arc<ResourceMonitor>,
    /// Where the scratch engine is created on first spill.
    pub temp_storage: TempStorageConfig,
    /// Flush scratch file writes before acknowledging them.
    pub sync_scratch_writes: bool,
}

impl ContainerResources {
    /// Uses the given monitors with an in-memory scratch engine.
    pub fn new(memory: Arc<ResourceMonitor>, disk: Arc<ResourceMonitor>) -> Self {
        Self {
            memory,
            disk,
            temp_storage: TempStorageConfig::InMemory,
            sync_scratch_writes: false,
        }
    }

    /// Sets the scratch storage location.
    pub fn with_temp_storage(mut self, temp_storage: TempStorageConfig) -> Self {
        self.temp_storage = temp_storage;
        self
    }

    /// Sets whether scratch writes are synced.
    pub fn with_sync_scratch_writes(mut self, sync: bool) -> Self {
        self.sync_scratch_writes = sync;
        self
    }
}

/// A point-in-time snapshot of a container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContainerStats {
    /// Rows in the current generation.
    pub rows: usize,
    /// Spills over the container's lifetime.
    pub spills: u64,
    /// Disk bytes written by those spills.
    pub bytes_spilled: u64,
    /// Bytes currently reserved from the memory monitor.
    pub memory_reserved: u64,
    /// Bytes currently reserved from the disk monitor.
    pub disk_reserved: u64,
    /// Whether rows currently live on disk.
    pub using_disk: bool,
}

#[derive(Debug)]
enum StoreState {
    Memory(MemRowStore),
    Disk(DiskRowStore),
    Failed,
    Closed,
}

/// Rows bucketed by equality columns, spilling from memory to disk.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use spillway_common::{ResourceKind, ResourceMonitor};
/// use spillway_exec::rowcontainer::{
///     ContainerResources, ContainerSchema, HashedRowContainer, RowIterator,
/// };
/// use spillway_exec::types::{ColumnType, Row};
///
/// let memory = Arc::new(ResourceMonitor::unbounded("mem", ResourceKind::Memory));
/// let disk = Arc::new(ResourceMonitor::unbounded("disk", ResourceKind::Disk));
/// let schema = ContainerSchema::new(vec![ColumnType::Int, ColumnType::Int], vec![0]);
///
/// let mut container =
///     HashedRowContainer::new(schema, ContainerResources::new(memory, disk)).unwrap();
/// container.add_row(&Row::ints(&[2, 3])).unwrap();
/// container.add_row(&Row::ints(&[2, 6])).unwrap();
/// container.spill_to_disk().unwrap();
///
/// let mut it = container.new_bucket_iterator(&Row::ints(&[2]), &[0]).unwrap();
/// it.rewind().unwrap();
/// let mut matches = 0;
/// while it.valid() {
///     matches += 1;
///     it.next().unwrap();
/// }
/// assert_eq!(matches, 2);
/// ```
#[derive(Debug)]
pub struct HashedRowContainer {
    schema: Arc<ContainerSchema>,
    encoder: Arc<dyn KeyEncoder>,
    resources: ContainerResources,
    engine: Option<Arc<dyn TempEngine>>,
    state: StoreState,
    epoch: u64,
    marks_reserved: bool,
    spills: u64,
    bytes_spilled: u64,
}

impl HashedRowContainer {
    /// Validates `schema` and creates an empty, memory-backed container.
    pub fn new(schema: ContainerSchema, resources: ContainerResources) -> SpillwayResult<Self> {
        Self::with_encoder(schema, resources, Arc::new(OrderedKeyEncoder::new()))
    }

    /// Like [`HashedRowContainer::new`] with a custom key encoder.
    pub fn with_encoder(
        schema: ContainerSchema,
        resources: ContainerResources,
        encoder: Arc<dyn KeyEncoder>,
    ) -> SpillwayResult<Self> {
        schema.validate()?;
        let schema = Arc::new(schema);
        let memory = MemRowStore::new(
            Arc::clone(&schema),
            Arc::clone(&encoder),
            Arc::clone(&resources.memory),
            0,
        );
        Ok(Self {
            schema,
            encoder,
            resources,
            engine: None,
            state: StoreState::Memory(memory),
            epoch: 0,
            marks_reserved: false,
            spills: 0,
            bytes_spilled: 0,
        })
    }

    /// The container schema.
    pub fn schema(&self) -> &ContainerSchema {
        &self.schema
    }

    /// The encoder that builds this container's bucket keys.
    pub fn key_encoder(&self) -> &dyn KeyEncoder {
        self.encoder.as_ref()
    }

    /// Returns true if rows currently live on disk.
    pub fn using_disk(&self) -> bool {
        matches!(self.state, StoreState::Disk(_))
    }

    /// Number of rows in the current generation.
    pub fn len(&self) -> usize {
        match &self.state {
            StoreState::Memory(mem) => mem.len(),
            StoreState::Disk(disk) => disk.len(),
            StoreState::Failed | StoreState::Closed => 0,
        }
    }

    /// Returns true if the current generation holds no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a snapshot of the container's counters.
    pub fn stats(&self) -> ContainerStats {
        let (memory_reserved, disk_reserved) = match &self.state {
            StoreState::Memory(mem) => (mem.reserved_bytes(), 0),
            StoreState::Disk(disk) => (0, disk.reserved_bytes()),
            StoreState::Failed | StoreState::Closed => (0, 0),
        };
        ContainerStats {
            rows: self.len(),
            spills: self.spills,
            bytes_spilled: self.bytes_spilled,
            memory_reserved,
            disk_reserved,
            using_disk: self.using_disk(),
        }
    }

    fn ensure_usable(&self) -> SpillwayResult<()> {
        match self.state {
            StoreState::Memory(_) | StoreState::Disk(_) => Ok(()),
            StoreState::Failed => Err(SpillwayError::ContainerUnusable),
            StoreState::Closed => Err(SpillwayError::Closed),
        }
    }

    /// Adds a row, spilling to disk first if memory is exhausted.
    ///
    /// Fails with `DiskFull` if the disk budget cannot absorb the row; the
    /// container stays usable. Fails with `SpillFailed` if the spill itself
    /// could not complete.
    pub fn add_row(&mut self, row: &Row) -> SpillwayResult<()> {
        self.ensure_usable()?;
        self.schema.check_row(row)?;

        let spill = match &mut self.state {
            StoreState::Memory(mem) => match mem.add_row(row) {
                Ok(()) => return Ok(()),
                Err(e) if e.is_memory_budget_exceeded() => true,
                Err(e) => return Err(e),
            },
            _ => false,
        };
        if spill {
            debug!(
                rows = self.len(),
                memory_allocated = self.resources.memory.allocated(),
                "memory budget exhausted"
            );
            self.spill_to_disk()?;
        }

        let StoreState::Disk(disk) = &mut self.state else {
            return Err(SpillwayError::internal("container is not disk-backed after spill"));
        };
        disk.add_row(row).map_err(|e| match e {
            SpillwayError::BudgetExceeded {
                resource: ResourceKind::Disk,
                requested,
                available,
            } => {
                warn!(requested, available, rows = disk.len(), "disk budget exhausted");
                SpillwayError::DiskFull {
                    requested,
                    available,
                }
            }
            other => other,
        })
    }

    fn scratch_engine(&mut self) -> SpillwayResult<Arc<dyn TempEngine>> {
        if let Some(engine) = &self.engine {
            return Ok(Arc::clone(engine));
        }
        let engine = open_temp_engine(
            &self.resources.temp_storage,
            self.resources.sync_scratch_writes,
        )?;
        debug!(engine = engine.name(), "opened scratch engine");
        self.engine = Some(Arc::clone(&engine));
        Ok(engine)
    }

    /// Closes and forgets the scratch engine. The engine is dropped even if
    /// closing it fails.
    fn teardown_engine(&mut self) -> SpillwayResult<()> {
        match self.engine.take() {
            Some(engine) => engine.close().map_err(SpillwayError::from),
            None => Ok(()),
        }
    }

    /// Moves every row and mark to disk. A no-op if already on disk.
    pub fn spill_to_disk(&mut self) -> SpillwayResult<()> {
        let mem = match std::mem::replace(&mut self.state, StoreState::Failed) {
            StoreState::Memory(mem) => mem,
            StoreState::Disk(disk) => {
                self.state = StoreState::Disk(disk);
                return Ok(());
            }
            StoreState::Failed => return Err(SpillwayError::ContainerUnusable),
            StoreState::Closed => {
                self.state = StoreState::Closed;
                return Err(SpillwayError::Closed);
            }
        };

        let engine = match self.scratch_engine() {
            Ok(engine) => engine,
            Err(e) => {
                self.state = StoreState::Memory(mem);
                return Err(e);
            }
        };

        let epoch = self.epoch + 1;
        let mut disk = DiskRowStore::new(
            Arc::clone(&self.schema),
            Arc::clone(&self.encoder),
            engine,
            Arc::clone(&self.resources.disk),
            epoch,
        );
        if self.marks_reserved {
            disk.enable_marks();
        }

        let rows = mem.len();
        let memory_bytes = mem.reserved_bytes();
        let migrated = mem
            .export_all()
            .try_for_each(|(key, row, marked)| disk.insert(key, row, marked));

        if let Err(e) = migrated {
            warn!(
                rows,
                migrated = disk.len(),
                error = %e,
                "spill to disk failed, container is unusable"
            );
            drop(disk);
            drop(mem);
            let mut reason = e.to_string();
            if let Err(close_err) = self.teardown_engine() {
                warn!(error = %close_err, "failed to close scratch engine after failed spill");
                reason = format!("{}; closing scratch engine failed: {}", reason, close_err);
            }
            return Err(SpillwayError::SpillFailed { reason });
        }

        drop(mem);
        let disk_bytes = disk.reserved_bytes();
        self.spills += 1;
        self.bytes_spilled += disk_bytes;
        self.epoch = epoch;
        self.state = StoreState::Disk(disk);
        info!(rows, memory_bytes, disk_bytes, "row container spilled to disk");
        Ok(())
    }

    /// Iterates every row in ascending equality-key order.
    pub fn new_iterator(&mut self) -> SpillwayResult<ContainerIter<'_>> {
        self.iter_all(false)
    }

    /// Iterates every row whose mark is not set.
    pub fn new_unmarked_iterator(&mut self) -> SpillwayResult<ContainerIter<'_>> {
        self.iter_all(true)
    }

    fn iter_all(&mut self, skip_marked: bool) -> SpillwayResult<ContainerIter<'_>> {
        match &mut self.state {
            StoreState::Memory(mem) => Ok(ContainerIter::Memory(mem.iter_all(skip_marked))),
            StoreState::Disk(disk) => Ok(ContainerIter::Disk(disk.iter_all(skip_marked)?)),
            StoreState::Failed => Err(SpillwayError::ContainerUnusable),
            StoreState::Closed => Err(SpillwayError::Closed),
        }
    }

    /// Iterates the bucket matching `row`.
    ///
    /// `lookup_columns` name the columns of `row` that hold the equality
    /// values, in the same order as the container's equality columns.
    pub fn new_bucket_iterator(
        &mut self,
        row: &Row,
        lookup_columns: &[usize],
    ) -> SpillwayResult<ContainerIter<'_>> {
        self.ensure_usable()?;
        let Some(key) = lookup_key(self.encoder.as_ref(), &self.schema, row, lookup_columns)? else {
            return Ok(ContainerIter::Empty);
        };
        match &mut self.state {
            StoreState::Memory(mem) => Ok(ContainerIter::Memory(mem.iter_bucket(&key))),
            StoreState::Disk(disk) => Ok(ContainerIter::Disk(disk.iter_bucket(&key)?)),
            StoreState::Failed => Err(SpillwayError::ContainerUnusable),
            StoreState::Closed => Err(SpillwayError::Closed),
        }
    }

    /// Reserves memory for one mark per row so marking is allowed.
    ///
    /// Idempotent and a no-op when marks are disabled. If memory cannot
    /// hold the marks the container spills instead.
    pub fn reserve_mark_memory_maybe(&mut self) -> SpillwayResult<()> {
        self.ensure_usable()?;
        if !self.schema.marks_enabled() || self.marks_reserved {
            return Ok(());
        }

        let spill = match &mut self.state {
            StoreState::Memory(mem) => match mem.reserve_marks() {
                Ok(()) => false,
                Err(e) if e.is_memory_budget_exceeded() => true,
                Err(e) => return Err(e),
            },
            StoreState::Disk(disk) => {
                disk.enable_marks();
                false
            }
            StoreState::Failed | StoreState::Closed => false,
        };
        self.marks_reserved = true;
        if spill {
            debug!(rows = self.len(), "no memory for marks");
            self.spill_to_disk()?;
        }
        Ok(())
    }

    /// Sets the mark of the row behind `handle`.
    pub fn mark(&mut self, handle: &RowHandle, marked: bool) -> SpillwayResult<()> {
        match &mut self.state {
            StoreState::Memory(mem) => mem.mark(handle, marked),
            StoreState::Disk(disk) => disk.mark(handle, marked),
            StoreState::Failed => Err(SpillwayError::ContainerUnusable),
            StoreState::Closed => Err(SpillwayError::Closed),
        }
    }

    /// Returns the mark of the row behind `handle`.
    pub fn is_marked(&self, handle: &RowHandle) -> SpillwayResult<bool> {
        match &self.state {
            StoreState::Memory(mem) => mem.is_marked(handle),
            StoreState::Disk(disk) => disk.is_marked(handle),
            StoreState::Failed => Err(SpillwayError::ContainerUnusable),
            StoreState::Closed => Err(SpillwayError::Closed),
        }
    }

    /// Discards every row and mark and starts a new in-memory generation.
    ///
    /// Reservations are returned to both monitors before the scratch engine
    /// is cleared, so an engine error never leaks budget.
    pub fn unsafe_reset(&mut self) -> SpillwayResult<()> {
        self.ensure_usable()?;
        let was_disk = self.using_disk();
        let rows = self.len();

        self.epoch += 1;
        self.marks_reserved = false;
        self.state = StoreState::Memory(MemRowStore::new(
            Arc::clone(&self.schema),
            Arc::clone(&self.encoder),
            Arc::clone(&self.resources.memory),
            self.epoch,
        ));
        debug!(rows, was_disk, "row container reset");

        if was_disk {
            let cleared = self.engine.as_ref().map(|engine| engine.clear()).transpose();
            if let Err(e) = cleared {
                warn!(error = %e, "failed to clear scratch engine, discarding it");
                if let Err(close_err) = self.teardown_engine() {
                    warn!(error = %close_err, "failed to close discarded scratch engine");
                }
                return Err(e.into());
            }
        }
        Ok(())
    }

    /// Releases every reservation and the scratch engine. Idempotent.
    pub fn close(&mut self) -> SpillwayResult<()> {
        if matches!(self.state, StoreState::Closed) {
            return Ok(());
        }
        let stats = self.stats();
        self.state = StoreState::Closed;
        self.marks_reserved = false;
        let result = self.teardown_engine();
        debug!(rows = stats.rows, spills = stats.spills, "row container closed");
        result
    }
}

impl Drop for HashedRowContainer {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "error closing row container on drop");
        }
    }
}
