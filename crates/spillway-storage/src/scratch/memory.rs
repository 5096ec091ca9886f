//! In-process scratch engine.

use std::collections::BTreeMap;
use std::fmt;

use parking_lot::RwLock;
use tracing::debug;

use spillway_common::types::{Key, Value};

use super::cursor::CursorEntry;
use super::error::ScratchResult;
use super::range::KeyRange;
use super::{check_entry_size, EngineState, TempEngine};

/// A scratch engine backed by an ordered map in process memory.
pub struct MemTempEngine {
    entries: RwLock<BTreeMap<Key, Value>>,
    state: EngineState,
}

impl MemTempEngine {
    /// Creates an empty engine.
    pub fn new() -> Self {
        debug!("opened in-memory scratch engine");
        Self {
            entries: RwLock::new(BTreeMap::new()),
            state: EngineState::new(),
        }
    }
}

impl Default for MemTempEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemTempEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemTempEngine")
            .field("entries", &self.entries.read().len())
            .field("closed", &self.state.is_closed())
            .finish()
    }
}

impl TempEngine for MemTempEngine {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn put(&self, key: Key, value: Value) -> ScratchResult<()> {
        self.state.ensure_open()?;
        check_entry_size(&key, &value)?;
        self.entries.write().insert(key, value);
        Ok(())
    }

    fn get(&self, key: &Key) -> ScratchResult<Option<Value>> {
        self.state.ensure_open()?;
        Ok(self.entries.read().get(key).cloned())
    }

    fn next_entry(
        &self,
        range: &KeyRange,
        after: Option<&Key>,
    ) -> ScratchResult<Option<CursorEntry>> {
        self.state.ensure_open()?;
        let Some(bounds) = range.resume_bounds(after) else {
            return Ok(None);
        };
        let entries = self.entries.read();
        Ok(entries
            .range(bounds)
            .next()
            .map(|(k, v)| CursorEntry::new(k.clone(), v.clone())))
    }

    fn clear(&self) -> ScratchResult<()> {
        self.state.ensure_open()?;
        self.entries.write().clear();
        Ok(())
    }

    fn close(&self) -> ScratchResult<()> {
        if self.state.mark_closed() {
            let mut entries = self.entries.write();
            debug!(entries = entries.len(), "closed in-memory scratch engine");
            entries.clear();
        }
        Ok(())
    }

    fn len(&self) -> usize {
        self.entries.read().len()
    }

    fn state(&self) -> &EngineState {
        &self.state
    }
}
