//! File-backed scratch engine.
//!
//! Records are appended to a temporary file in the layout
//!
//! ```text
//! ┌──────────────┬──────────────┬─────────┬───────────┐
//! │ key_len (u32)│ val_len (u32)│   key   │   value   │
//! └──────────────┴──────────────┴─────────┴───────────┘
//! ```
//!
//! and an ordered in-memory index maps each live key to the offset of its
//! newest record. Rewriting a key appends a new record; the old one stays
//! in the file until [`TempEngine::clear`] truncates it.

use std::collections::BTreeMap;
use std::fmt;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use spillway_common::types::{Key, Value};

use super::cursor::CursorEntry;
use super::error::{ScratchError, ScratchResult};
use super::range::KeyRange;
use super::{check_entry_size, EngineState, TempEngine};

const RECORD_HEADER_SIZE: u64 = 8;

#[derive(Debug, Clone, Copy)]
struct RecordLocation {
    offset: u64,
    key_len: u32,
    value_len: u32,
}

/// A scratch engine that appends records to a temporary file.
///
/// The file is deleted when the engine is closed or dropped.
pub struct FileTempEngine {
    path: PathBuf,
    file: Mutex<Option<NamedTempFile>>,
    index: RwLock<BTreeMap<Key, RecordLocation>>,
    write_pos: AtomicU64,
    sync_writes: bool,
    state: EngineState,
}

impl FileTempEngine {
    /// Creates a new scratch file inside `dir`.
    pub fn create(dir: &Path, sync_writes: bool) -> ScratchResult<Self> {
        let file = tempfile::Builder::new()
            .prefix("spillway-")
            .suffix(".scratch")
            .tempfile_in(dir)?;
        let path = file.path().to_path_buf();
        debug!(path = %path.display(), "created scratch file");

        Ok(Self {
            path,
            file: Mutex::new(Some(file)),
            index: RwLock::new(BTreeMap::new()),
            write_pos: AtomicU64::new(0),
            sync_writes,
            state: EngineState::new(),
        })
    }

    /// Path of the scratch file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes written to the file since creation or the last clear.
    pub fn file_size(&self) -> u64 {
        self.write_pos.load(Ordering::Acquire)
    }

    fn read_record(&self, loc: RecordLocation) -> ScratchResult<Value> {
        let mut guard = self.file.lock();
        let file = guard.as_mut().ok_or(ScratchError::Closed)?.as_file_mut();

        file.seek(SeekFrom::Start(loc.offset))?;
        let mut header = [0u8; RECORD_HEADER_SIZE as usize];
        file.read_exact(&mut header)?;
        let key_len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
        let value_len = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
        if key_len != loc.key_len || value_len != loc.value_len {
            return Err(ScratchError::corrupted(
                loc.offset,
                format!(
                    "header ({key_len}, {value_len}) does not match index ({}, {})",
                    loc.key_len, loc.value_len
                ),
            ));
        }

        file.seek(SeekFrom::Current(i64::from(key_len)))?;
        let mut value = vec![0u8; value_len as usize];
        file.read_exact(&mut value)?;
        Ok(Value::from_vec(value))
    }
}

impl fmt::Debug for FileTempEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileTempEngine")
            .field("path", &self.path)
            .field("entries", &self.index.read().len())
            .field("file_size", &self.file_size())
            .field("closed", &self.state.is_closed())
            .finish()
    }
}

impl TempEngine for FileTempEngine {
    fn name(&self) -> &'static str {
        "file"
    }

    fn put(&self, key: Key, value: Value) -> ScratchResult<()> {
        self.state.ensure_open()?;
        check_entry_size(&key, &value)?;

        // Size limits keep both lengths inside u32.
        let key_len = key.len() as u32;
        let value_len = value.len() as u32;

        let mut guard = self.file.lock();
        let file = guard.as_mut().ok_or(ScratchError::Closed)?.as_file_mut();

        let offset = self.write_pos.load(Ordering::Acquire);
        let mut record = Vec::with_capacity(RECORD_HEADER_SIZE as usize + key.len() + value.len());
        record.extend_from_slice(&key_len.to_be_bytes());
        record.extend_from_slice(&value_len.to_be_bytes());
        record.extend_from_slice(key.as_bytes());
        record.extend_from_slice(value.as_bytes());

        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&record)?;
        if self.sync_writes {
            file.sync_data()?;
        }
        self.write_pos
            .store(offset + record.len() as u64, Ordering::Release);

        self.index.write().insert(
            key,
            RecordLocation {
                offset,
                key_len,
                value_len,
            },
        );
        Ok(())
    }

    // Rewrites append a fresh record; the old one stays until clear.
    fn rewrite_cost(&self, key: &Key, value: &Value) -> u64 {
        (key.len() + value.len()) as u64
    }

    fn get(&self, key: &Key) -> ScratchResult<Option<Value>> {
        self.state.ensure_open()?;
        let loc = self.index.read().get(key).copied();
        match loc {
            Some(loc) => self.read_record(loc).map(Some),
            None => Ok(None),
        }
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
        let found = self
            .index
            .read()
            .range(bounds)
            .next()
            .map(|(k, loc)| (k.clone(), *loc));

        match found {
            Some((key, loc)) => {
                let value = self.read_record(loc)?;
                Ok(Some(CursorEntry::new(key, value)))
            }
            None => Ok(None),
        }
    }

    fn clear(&self) -> ScratchResult<()> {
        self.state.ensure_open()?;
        let mut guard = self.file.lock();
        let file = guard.as_mut().ok_or(ScratchError::Closed)?.as_file_mut();
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        self.write_pos.store(0, Ordering::Release);
        self.index.write().clear();
        Ok(())
    }

    fn close(&self) -> ScratchResult<()> {
        if !self.state.mark_closed() {
            return Ok(());
        }
        if self.state.open_cursors() > 0 {
            warn!(
                path = %self.path.display(),
                cursors = self.state.open_cursors(),
                "closing scratch file with open cursors"
            );
        }

        self.index.write().clear();
        let file = self.file.lock().take();
        if let Some(file) = file {
            file.close()?;
            debug!(path = %self.path.display(), "removed scratch file");
        }
        Ok(())
    }

    fn len(&self) -> usize {
        self.index.read().len()
    }

    fn state(&self) -> &EngineState {
        &self.state
    }
}
