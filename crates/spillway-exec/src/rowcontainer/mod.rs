//! Hash-bucketed, disk-backed row containers.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                  HashedRowContainer                    │
//! │     add_row / iterators / marks / reset / close        │
//! ├───────────────────────────┬────────────────────────────┤
//! │        MemRowStore        │        DiskRowStore        │
//! │  BTreeMap<key, row ids>   │  scratch engine, keyed by  │
//! │  memory monitor account   │  key ++ seq, disk account  │
//! └───────────────────────────┴────────────────────────────┘
//!          │   spill (memory budget exceeded)   ▲
//!          └────────────────────────────────────┘
//! ```
//!
//! Both stores bucket rows by the same encoded equality key, so the
//! iteration order and bucket membership survive a spill unchanged.

mod disk;
mod handle;
mod hashed;
mod iter;
mod mem;
mod schema;

pub use disk::DiskRowStore;
pub use handle::RowHandle;
pub use hashed::{ContainerResources, ContainerStats, HashedRowContainer};
pub use iter::{ContainerIter, DiskRowIter, MemRowIter, RowIterator};
pub use mem::MemRowStore;
pub use schema::ContainerSchema;

use spillway_common::types::Key;
use spillway_common::{SpillwayError, SpillwayResult};

use crate::encoding::KeyEncoder;
use crate::types::Row;

/// Key a row is stored under. NULLs are always encoded so every row can be
/// stored; whether they match is decided at lookup time.
pub(crate) fn stored_key(
    encoder: &dyn KeyEncoder,
    schema: &ContainerSchema,
    row: &Row,
) -> SpillwayResult<Key> {
    encoder
        .encode(row, schema.eq_columns(), true)?
        .ok_or_else(|| SpillwayError::internal("key encoder dropped a NULL-encoding row"))
}

/// Key a lookup row searches for, or `None` if it cannot match anything.
pub(crate) fn lookup_key(
    encoder: &dyn KeyEncoder,
    schema: &ContainerSchema,
    row: &Row,
    lookup_columns: &[usize],
) -> SpillwayResult<Option<Key>> {
    if lookup_columns.len() != schema.eq_columns().len() {
        return Err(SpillwayError::config(format!(
            "lookup uses {} columns, container buckets by {}",
            lookup_columns.len(),
            schema.eq_columns().len()
        )));
    }
    encoder.encode(row, lookup_columns, schema.encode_null())
}
