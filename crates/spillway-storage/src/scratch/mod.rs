//! Scratch ordered key-value engines.
//!
//! A scratch engine stores byte keys in sorted order and supports point
//! writes, point reads and forward range scans through [`ScratchCursor`].
//! It is a temporary store: clearing or closing it discards everything.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              dyn TempEngine                 │
//! │   put / get / next_entry / clear / close    │
//! ├──────────────────────┬──────────────────────┤
//! │    MemTempEngine     │    FileTempEngine    │
//! │  BTreeMap<Key,Value> │ BTreeMap<Key,offset> │
//! │                      │ + append-only file   │
//! └──────────────────────┴──────────────────────┘
//! ```
//!
//! Cursors hold an `Arc` of their engine and resume each step strictly
//! after the last key they returned, so writes made while a cursor is open
//! (such as rewriting the current value) never invalidate it.

mod cursor;
mod error;
mod file;
mod memory;
mod range;

use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use spillway_common::config::TempStorageConfig;
use spillway_common::types::{Key, Value};
use spillway_common::{MAX_KEY_SIZE, MAX_VALUE_SIZE};

pub use cursor::{CursorEntry, ScratchCursor};
pub use error::{ScratchError, ScratchResult};
pub use file::FileTempEngine;
pub use memory::MemTempEngine;
pub use range::KeyRange;

/// A temporary ordered key-value engine.
///
/// Implementations use interior mutability so one engine can be shared
/// between its owning store and the cursors opened on it.
pub trait TempEngine: Send + Sync + fmt::Debug {
    /// Short engine name used in logs.
    fn name(&self) -> &'static str;

    /// Inserts or replaces the value stored under `key`.
    fn put(&self, key: Key, value: Value) -> ScratchResult<()>;

    /// Returns the value stored under `key`.
    fn get(&self, key: &Key) -> ScratchResult<Option<Value>>;

    /// Returns the first entry of `range` that sorts strictly after `after`,
    /// or the first entry of `range` when `after` is `None`.
    fn next_entry(&self, range: &KeyRange, after: Option<&Key>)
        -> ScratchResult<Option<CursorEntry>>;

    /// Bytes of backing storage a [`TempEngine::put`] replacing the value
    /// under `key` with `value` adds. Engines that overwrite in place
    /// return 0.
    fn rewrite_cost(&self, _key: &Key, _value: &Value) -> u64 {
        0
    }

    /// Removes every entry.
    fn clear(&self) -> ScratchResult<()>;

    /// Closes the engine and releases its backing storage. Idempotent.
    fn close(&self) -> ScratchResult<()>;

    /// Number of live entries.
    fn len(&self) -> usize;

    /// Returns true if the engine holds no entries.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Shared lifecycle state.
    fn state(&self) -> &EngineState;

    /// Returns true once [`TempEngine::close`] has been called.
    fn is_closed(&self) -> bool {
        self.state().is_closed()
    }

    /// Number of cursors currently open on this engine.
    fn open_cursors(&self) -> usize {
        self.state().open_cursors()
    }
}

/// Lifecycle state common to every engine.
#[derive(Debug, Default)]
pub struct EngineState {
    closed: AtomicBool,
    open_cursors: AtomicUsize,
}

impl EngineState {
    /// Creates the state of a freshly opened engine.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true once the engine is closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Marks the engine closed. Returns false if it already was.
    pub fn mark_closed(&self) -> bool {
        !self.closed.swap(true, Ordering::AcqRel)
    }

    /// Fails with [`ScratchError::Closed`] if the engine is closed.
    pub fn ensure_open(&self) -> ScratchResult<()> {
        if self.is_closed() {
            return Err(ScratchError::Closed);
        }
        Ok(())
    }

    /// Number of open cursors.
    pub fn open_cursors(&self) -> usize {
        self.open_cursors.load(Ordering::Acquire)
    }

    pub(crate) fn cursor_opened(&self) {
        self.open_cursors.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn cursor_closed(&self) {
        let _ = self
            .open_cursors
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }
}

/// Rejects keys and values above the engine limits.
pub(crate) fn check_entry_size(key: &Key, value: &Value) -> ScratchResult<()> {
    if key.len() > MAX_KEY_SIZE {
        return Err(ScratchError::KeyTooLarge {
            size: key.len(),
            max: MAX_KEY_SIZE,
        });
    }
    if value.len() > MAX_VALUE_SIZE {
        return Err(ScratchError::ValueTooLarge {
            size: value.len(),
            max: MAX_VALUE_SIZE,
        });
    }
    Ok(())
}

/// Opens the scratch engine described by `config`.
///
/// A directory-backed engine creates the directory if needed and writes to
/// a uniquely named temporary file inside it.
pub fn open_temp_engine(
    config: &TempStorageConfig,
    sync_writes: bool,
) -> ScratchResult<Arc<dyn TempEngine>> {
    match config {
        TempStorageConfig::InMemory => Ok(Arc::new(MemTempEngine::new())),
        TempStorageConfig::Directory(dir) => {
            let engine = open_file_engine(dir, sync_writes)?;
            Ok(Arc::new(engine))
        }
    }
}

fn open_file_engine(dir: &Path, sync_writes: bool) -> ScratchResult<FileTempEngine> {
    std::fs::create_dir_all(dir)?;
    FileTempEngine::create(dir, sync_writes)
}
