//! Range cursors over a scratch engine.

use std::sync::Arc;

use spillway_common::types::{Key, Value};

use super::error::ScratchResult;
use super::range::KeyRange;
use super::TempEngine;

/// An entry returned by a cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorEntry {
    /// The key.
    pub key: Key,
    /// The value.
    pub value: Value,
}

impl CursorEntry {
    /// Creates a new cursor entry.
    pub fn new(key: Key, value: Value) -> Self {
        Self { key, value }
    }
}

/// A forward cursor over one key range of a scratch engine.
///
/// The cursor is unpositioned until [`ScratchCursor::rewind`] is called.
/// It counts as open on its engine until closed or dropped.
#[derive(Debug)]
pub struct ScratchCursor {
    engine: Arc<dyn TempEngine>,
    range: KeyRange,
    current: Option<CursorEntry>,
    closed: bool,
}

impl ScratchCursor {
    /// Opens a cursor over `range`.
    pub fn open(engine: Arc<dyn TempEngine>, range: KeyRange) -> ScratchResult<Self> {
        engine.state().ensure_open()?;
        engine.state().cursor_opened();
        Ok(Self {
            engine,
            range,
            current: None,
            closed: false,
        })
    }

    /// Positions the cursor on the first entry of its range.
    pub fn rewind(&mut self) -> ScratchResult<()> {
        self.current = self.engine.next_entry(&self.range, None)?;
        Ok(())
    }

    /// Returns true if the cursor is positioned on an entry.
    pub fn valid(&self) -> bool {
        self.current.is_some()
    }

    /// Advances to the next entry. A no-op when not positioned.
    pub fn next(&mut self) -> ScratchResult<()> {
        if let Some(entry) = self.current.take() {
            self.current = self.engine.next_entry(&self.range, Some(&entry.key))?;
        }
        Ok(())
    }

    /// Returns the current entry.
    pub fn entry(&self) -> Option<&CursorEntry> {
        self.current.as_ref()
    }

    /// Overwrites the value of the current entry in the engine.
    ///
    /// Returns false if the cursor is not positioned.
    pub fn replace_value(&mut self, value: Value) -> ScratchResult<bool> {
        let Some(entry) = self.current.as_mut() else {
            return Ok(false);
        };
        self.engine.put(entry.key.clone(), value.clone())?;
        entry.value = value;
        Ok(true)
    }

    /// Bytes [`ScratchCursor::replace_value`] with `value` would add to the
    /// engine's backing storage. 0 when not positioned.
    pub fn rewrite_cost(&self, value: &Value) -> u64 {
        self.current
            .as_ref()
            .map_or(0, |entry| self.engine.rewrite_cost(&entry.key, value))
    }

    /// Releases the cursor. Idempotent.
    pub fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.current = None;
            self.engine.state().cursor_closed();
        }
    }
}

impl Drop for ScratchCursor {
    fn drop(&mut self) {
        self.close();
    }
}
