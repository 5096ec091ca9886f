//! Integration tests for the hashed, disk-backed row container.
//!
//! These drive the container through the public API only and check the
//! properties operators rely on: spills keep content, order and marks, disk
//! exhaustion is recoverable, and every reserved byte goes back to the
//! monitors.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

use spillway_common::config::{ExecutionConfig, TempStorageConfig};
use spillway_common::{BoundAccount, ErrorCode, ResourceKind, ResourceMonitor, SpillwayError};
use spillway_exec::context::ExecutionContext;
use spillway_exec::rowcontainer::{
    ContainerIter, ContainerResources, ContainerSchema, HashedRowContainer, RowIterator,
};
use spillway_exec::types::{ColumnType, Row, Value};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn monitors(memory: u64, disk: u64) -> (Arc<ResourceMonitor>, Arc<ResourceMonitor>) {
    (
        Arc::new(ResourceMonitor::new("test-mem", ResourceKind::Memory, memory)),
        Arc::new(ResourceMonitor::new("test-disk", ResourceKind::Disk, disk)),
    )
}

fn container(
    schema: ContainerSchema,
    memory: &Arc<ResourceMonitor>,
    disk: &Arc<ResourceMonitor>,
) -> HashedRowContainer {
    let resources = ContainerResources::new(Arc::clone(memory), Arc::clone(disk));
    HashedRowContainer::new(schema, resources).unwrap()
}

fn drain(it: &mut ContainerIter<'_>) -> Vec<Row> {
    let mut rows = Vec::new();
    it.rewind().unwrap();
    while it.valid() {
        rows.push(it.row().unwrap().clone());
        it.next().unwrap();
    }
    it.close();
    rows
}

fn scan_all(container: &mut HashedRowContainer) -> Vec<Row> {
    drain(&mut container.new_iterator().unwrap())
}

fn scan_unmarked(container: &mut HashedRowContainer) -> Vec<Row> {
    drain(&mut container.new_unmarked_iterator().unwrap())
}

fn mixed_schema() -> ContainerSchema {
    ContainerSchema::new(
        vec![ColumnType::Int, ColumnType::String, ColumnType::BigInt],
        vec![0, 1],
    )
}

fn random_rows(rng: &mut StdRng, n: usize) -> Vec<Row> {
    const WORDS: [&str; 5] = ["", "a", "ab", "a\0b", "zz"];
    (0..n)
        .map(|i| {
            let first = if rng.gen_range(0..10) == 0 {
                Value::Null
            } else {
                Value::Int(rng.gen_range(-5..5))
            };
            let word = WORDS[rng.gen_range(0..WORDS.len())];
            Row::new(vec![
                first,
                Value::String(word.to_string()),
                Value::BigInt(i as i64),
            ])
        })
        .collect()
}

/// Rows in equality-key order, insertion order within a key.
fn key_ordered(rows: &[Row]) -> Vec<Row> {
    let mut sorted = rows.to_vec();
    sorted.sort_by(|a, b| a.values()[..2].cmp(&b.values()[..2]));
    sorted
}

#[test]
fn test_normal_run() {
    init_tracing();
    let (memory, disk) = monitors(u64::MAX, u64::MAX);
    let mut rng = StdRng::seed_from_u64(7);
    let rows = random_rows(&mut rng, 100);

    let mut c = container(mixed_schema(), &memory, &disk);
    for row in &rows {
        c.add_row(row).unwrap();
    }
    assert!(!c.using_disk());
    assert_eq!(c.len(), rows.len());
    assert_eq!(scan_unmarked(&mut c), key_ordered(&rows));
    assert_eq!(disk.allocated(), 0);
}

#[test]
fn test_spill_preserves_content() {
    init_tracing();
    let mut rng = StdRng::seed_from_u64(42);
    let rows = random_rows(&mut rng, 300);

    let (memory, disk) = monitors(u64::MAX, u64::MAX);
    let unbounded = {
        let mut c = container(mixed_schema(), &memory, &disk);
        for row in &rows {
            c.add_row(row).unwrap();
        }
        scan_unmarked(&mut c)
    };
    let peak = memory.peak();

    let (memory, disk) = monitors(peak / 2, u64::MAX);
    let mut c = container(mixed_schema(), &memory, &disk);
    for row in &rows {
        c.add_row(row).unwrap();
    }
    assert!(c.using_disk());
    assert_eq!(memory.allocated(), 0);
    assert!(disk.allocated() > 0);

    let spilled = scan_unmarked(&mut c);
    assert_eq!(spilled, unbounded);
    assert_eq!(spilled, key_ordered(&rows));
}

#[test]
fn test_marks_preserved_across_spill() {
    init_tracing();
    let (memory, disk) = monitors(u64::MAX, u64::MAX);
    let schema = ContainerSchema::new(vec![ColumnType::Int, ColumnType::Int], vec![0]).with_marks(true);
    let mut c = container(schema, &memory, &disk);
    for i in 0..60 {
        c.add_row(&Row::ints(&[i % 7, i])).unwrap();
    }
    c.reserve_mark_memory_maybe().unwrap();

    let in_set = |row: &Row| matches!(row.get(1), Some(Value::Int(v)) if v % 3 == 0);

    {
        let mut it = c.new_iterator().unwrap();
        it.rewind().unwrap();
        while it.valid() {
            if in_set(it.row().unwrap()) {
                it.mark(true).unwrap();
            }
            it.next().unwrap();
        }
        it.close();
    }

    let check = |c: &mut HashedRowContainer| {
        let mut seen = 0;
        {
            let mut it = c.new_iterator().unwrap();
            it.rewind().unwrap();
            while it.valid() {
                let expected = in_set(it.row().unwrap());
                assert_eq!(it.is_marked().unwrap(), expected);
                seen += 1;
                it.next().unwrap();
            }
            it.close();
        }
        assert_eq!(seen, 60);

        let unmarked = scan_unmarked(c);
        assert_eq!(unmarked.len(), 40);
        assert!(unmarked.iter().all(|row| !in_set(row)));
    };

    check(&mut c);
    c.spill_to_disk().unwrap();
    assert!(c.using_disk());
    check(&mut c);
}

#[test]
fn test_using_disk_is_monotonic() {
    init_tracing();
    let (memory, disk) = monitors(2_000, u64::MAX);
    let schema = ContainerSchema::new(vec![ColumnType::Int], vec![0]);
    let mut c = container(schema, &memory, &disk);
    assert!(!c.using_disk());

    let mut flips = 0;
    let mut previous = false;
    for i in 0..200 {
        c.add_row(&Row::ints(&[i])).unwrap();
        let now = c.using_disk();
        assert!(now || !previous, "left disk without a reset");
        if now != previous {
            flips += 1;
        }
        previous = now;
    }
    assert_eq!(flips, 1);
    assert_eq!(c.stats().spills, 1);

    c.unsafe_reset().unwrap();
    assert!(!c.using_disk());
    assert!(c.is_empty());
}

#[test]
fn test_add_row_out_of_mem() {
    init_tracing();
    let (memory, disk) = monitors(1, u64::MAX);
    let schema = ContainerSchema::new(vec![ColumnType::Int], vec![0]);
    let mut c = container(schema, &memory, &disk);

    c.add_row(&Row::ints(&[0])).unwrap();
    assert!(c.using_disk());
    assert!(disk.allocated() > 0);
    assert_eq!(memory.allocated(), 0);
}

#[test]
fn test_add_row_out_of_disk() {
    init_tracing();
    let (memory, disk) = monitors(1, 1);
    let schema = ContainerSchema::new(vec![ColumnType::Int], vec![0]);
    let mut c = container(schema, &memory, &disk);

    let err = c.add_row(&Row::ints(&[0])).unwrap_err();
    assert!(matches!(err, SpillwayError::DiskFull { .. }));
    assert!(c.using_disk());
    assert_eq!(disk.allocated(), 0);
    assert_eq!(memory.allocated(), 0);

    let before = disk.allocated();
    assert!(c.add_row(&Row::ints(&[1])).is_err());
    assert_eq!(disk.allocated(), before);

    disk.set_budget(u64::MAX);
    c.add_row(&Row::ints(&[2])).unwrap();
    assert_eq!(scan_all(&mut c), vec![Row::ints(&[2])]);
}

#[test]
fn test_bucket_iteration_memory_and_disk() {
    init_tracing();
    let (memory, disk) = monitors(u64::MAX, u64::MAX);
    let schema = ContainerSchema::new(vec![ColumnType::Int, ColumnType::Int], vec![0, 1]);
    let mut c = container(schema, &memory, &disk);
    for (a, b) in [(2, 3), (5, 6), (2, 3), (5, 6), (2, 6), (3, 5), (2, 9)] {
        c.add_row(&Row::ints(&[a, b])).unwrap();
    }

    for spilled in [false, true] {
        if spilled {
            c.spill_to_disk().unwrap();
        }
        assert_eq!(c.using_disk(), spilled);

        let bucket = drain(&mut c.new_bucket_iterator(&Row::ints(&[2, 3]), &[0, 1]).unwrap());
        assert_eq!(bucket, vec![Row::ints(&[2, 3]), Row::ints(&[2, 3])]);

        // Equality values at other positions of the lookup row.
        let lookup = Row::ints(&[0, 3, 2]);
        let bucket = drain(&mut c.new_bucket_iterator(&lookup, &[2, 1]).unwrap());
        assert_eq!(bucket.len(), 2);

        let missing = drain(&mut c.new_bucket_iterator(&Row::ints(&[9, 9]), &[0, 1]).unwrap());
        assert!(missing.is_empty());

        let mut distinct = scan_all(&mut c);
        distinct.dedup();
        assert_eq!(
            distinct,
            vec![
                Row::ints(&[2, 3]),
                Row::ints(&[2, 6]),
                Row::ints(&[2, 9]),
                Row::ints(&[3, 5]),
                Row::ints(&[5, 6]),
            ]
        );
    }
}

#[test]
fn test_monitors_return_to_baseline() {
    init_tracing();
    let (memory, disk) = monitors(4_000, 1 << 20);
    let mut other_mem = BoundAccount::new(Arc::clone(&memory));
    let mut other_disk = BoundAccount::new(Arc::clone(&disk));
    other_mem.grow(100).unwrap();
    other_disk.grow(100).unwrap();

    let mut rng = StdRng::seed_from_u64(1234);
    let schema = mixed_schema().with_marks(true);
    let mut c = container(schema, &memory, &disk);
    for row in random_rows(&mut rng, 400) {
        match rng.gen_range(0..40) {
            0 => c.unsafe_reset().unwrap(),
            1 => c.spill_to_disk().unwrap(),
            2 => c.reserve_mark_memory_maybe().unwrap(),
            _ => {}
        }
        c.add_row(&row).unwrap();
    }
    c.close().unwrap();

    assert_eq!(memory.allocated(), 100);
    assert_eq!(disk.allocated(), 100);
}

#[test]
fn test_reset_reusability() {
    init_tracing();
    let (memory, disk) = monitors(u64::MAX, u64::MAX);
    let schema = ContainerSchema::new(vec![ColumnType::Int, ColumnType::Int], vec![0]).with_marks(true);
    let mut c = container(schema, &memory, &disk);
    for i in 0..10 {
        c.add_row(&Row::ints(&[i, i])).unwrap();
    }
    c.reserve_mark_memory_maybe().unwrap();
    {
        let mut it = c.new_iterator().unwrap();
        it.rewind().unwrap();
        it.mark(true).unwrap();
    }
    c.spill_to_disk().unwrap();

    c.unsafe_reset().unwrap();
    assert!(!c.using_disk());
    assert!(scan_all(&mut c).is_empty());
    assert_eq!(disk.allocated(), 0);

    c.add_row(&Row::ints(&[0, 100])).unwrap();
    c.add_row(&Row::ints(&[1, 101])).unwrap();
    assert_eq!(
        scan_all(&mut c),
        vec![Row::ints(&[0, 100]), Row::ints(&[1, 101])]
    );

    {
        let mut it = c.new_iterator().unwrap();
        it.rewind().unwrap();
        assert!(matches!(it.mark(true), Err(SpillwayError::MarksNotReserved)));
    }
    c.reserve_mark_memory_maybe().unwrap();
    assert_eq!(scan_unmarked(&mut c).len(), 2);
}

#[test]
fn test_spill_failure_leaves_container_unusable() {
    init_tracing();
    let config = ExecutionConfig::for_testing()
        .with_memory_budget(1 << 20)
        .with_disk_budget(16);
    let ctx = ExecutionContext::new(config).unwrap();
    let schema = ContainerSchema::new(vec![ColumnType::Int], vec![0]);
    let mut c = ctx.create_container(schema).unwrap();
    for i in 0..20 {
        c.add_row(&Row::ints(&[i])).unwrap();
    }

    let err = c.spill_to_disk().unwrap_err();
    assert_eq!(err.code(), ErrorCode::SpillFailed);
    assert_ne!(err.code(), ErrorCode::DiskFull);
    assert_eq!(ctx.memory_monitor().allocated(), 0);
    assert_eq!(ctx.disk_monitor().allocated(), 0);

    let err = c.add_row(&Row::ints(&[0])).unwrap_err();
    assert_eq!(err.code(), ErrorCode::ContainerUnusable);
    c.close().unwrap();
}

#[test]
fn test_stale_handles_after_spill_and_reset() {
    init_tracing();
    let (memory, disk) = monitors(u64::MAX, u64::MAX);
    let schema = ContainerSchema::new(vec![ColumnType::Int], vec![0]).with_marks(true);
    let mut c = container(schema, &memory, &disk);
    c.add_row(&Row::ints(&[1])).unwrap();
    c.reserve_mark_memory_maybe().unwrap();

    let first_handle = |c: &mut HashedRowContainer| {
        let mut it = c.new_iterator().unwrap();
        it.rewind().unwrap();
        it.handle().unwrap()
    };

    let memory_handle = first_handle(&mut c);
    c.spill_to_disk().unwrap();
    let err = c.is_marked(&memory_handle).unwrap_err();
    assert_eq!(err.code(), ErrorCode::StaleHandle);

    let disk_handle = first_handle(&mut c);
    c.mark(&disk_handle, true).unwrap();
    assert!(c.is_marked(&disk_handle).unwrap());

    c.unsafe_reset().unwrap();
    c.add_row(&Row::ints(&[1])).unwrap();
    let err = c.mark(&disk_handle, true).unwrap_err();
    assert_eq!(err.code(), ErrorCode::StaleHandle);
}

#[test]
fn test_file_backed_spill() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let config = ExecutionConfig::for_testing()
        .with_memory_budget(0)
        .with_temp_storage(TempStorageConfig::Directory(dir.path().to_path_buf()))
        .with_sync_scratch_writes(true);
    let ctx = ExecutionContext::new(config).unwrap();

    let schema = ContainerSchema::new(vec![ColumnType::Int, ColumnType::String], vec![0]).with_marks(true);
    let mut c = ctx.create_container(schema).unwrap();
    let rows: Vec<Row> = (0..50)
        .map(|i| Row::new(vec![Value::Int(i % 5), Value::String(format!("row-{i}"))]))
        .collect();
    for row in &rows {
        c.add_row(row).unwrap();
    }
    assert!(c.using_disk());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);

    c.reserve_mark_memory_maybe().unwrap();
    {
        let mut it = c.new_bucket_iterator(&Row::new(vec![Value::Int(3)]), &[0]).unwrap();
        it.rewind().unwrap();
        while it.valid() {
            it.mark(true).unwrap();
            it.next().unwrap();
        }
        it.close();
    }
    let unmarked = scan_unmarked(&mut c);
    assert_eq!(unmarked.len(), 40);
    assert!(unmarked.iter().all(|row| row.get(0) != Some(&Value::Int(3))));

    c.close().unwrap();
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    assert_eq!(ctx.disk_monitor().allocated(), 0);
}

fn file_backed(dir: &TempDir, memory_budget: u64) -> ExecutionContext {
    let config = ExecutionConfig::for_testing()
        .with_memory_budget(memory_budget)
        .with_temp_storage(TempStorageConfig::Directory(dir.path().to_path_buf()));
    ExecutionContext::new(config).unwrap()
}

fn remove_scratch_files(dir: &TempDir) {
    for entry in std::fs::read_dir(dir.path()).unwrap() {
        std::fs::remove_file(entry.unwrap().path()).unwrap();
    }
}

#[test]
fn test_long_string_keys_spill() {
    init_tracing();
    let long = Row::new(vec![Value::String("x".repeat(20_000))]);
    let short = Row::new(vec![Value::String("y".to_string())]);
    let schema = ContainerSchema::new(vec![ColumnType::String], vec![0]);

    let (memory, disk) = monitors(u64::MAX, u64::MAX);
    let mut c = container(schema.clone(), &memory, &disk);
    c.add_row(&long).unwrap();
    c.add_row(&short).unwrap();
    c.spill_to_disk().unwrap();
    assert!(c.using_disk());
    let bucket = drain(&mut c.new_bucket_iterator(&long, &[0]).unwrap());
    assert_eq!(bucket, vec![long.clone()]);
    assert_eq!(scan_all(&mut c).len(), 2);

    // Rows added while already on disk, through a scratch file.
    let dir = TempDir::new().unwrap();
    let ctx = file_backed(&dir, 0);
    let mut c = ctx.create_container(schema).unwrap();
    c.add_row(&short).unwrap();
    c.add_row(&long).unwrap();
    assert!(c.using_disk());
    let bucket = drain(&mut c.new_bucket_iterator(&long, &[0]).unwrap());
    assert_eq!(bucket, vec![long]);
    c.close().unwrap();
}

#[test]
fn test_file_backed_marks_are_charged_to_disk() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let ctx = file_backed(&dir, 0);
    let schema = ContainerSchema::new(vec![ColumnType::Int], vec![0]).with_marks(true);
    let mut c = ctx.create_container(schema).unwrap();
    for i in 0..4 {
        c.add_row(&Row::ints(&[i])).unwrap();
    }
    c.reserve_mark_memory_maybe().unwrap();
    let before = ctx.disk_monitor().allocated();

    {
        let mut it = c.new_iterator().unwrap();
        it.rewind().unwrap();
        it.mark(true).unwrap();
    }
    let after = ctx.disk_monitor().allocated();
    assert!(after > before);
    assert_eq!(c.stats().disk_reserved, after);

    // No room for another rewrite: the mark stays as it was.
    ctx.disk_monitor().set_budget(after);
    {
        let mut it = c.new_iterator().unwrap();
        it.rewind().unwrap();
        it.next().unwrap();
        let err = it.mark(true).unwrap_err();
        assert_eq!(err.code(), ErrorCode::DiskFull);
        assert!(!it.is_marked().unwrap());
    }
    assert_eq!(scan_unmarked(&mut c).len(), 3);

    c.close().unwrap();
    assert_eq!(ctx.disk_monitor().allocated(), 0);
}

#[test]
fn test_close_reports_scratch_engine_error() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let ctx = file_backed(&dir, 0);
    let mut c = ctx
        .create_container(ContainerSchema::new(vec![ColumnType::Int], vec![0]))
        .unwrap();
    c.add_row(&Row::ints(&[1])).unwrap();
    assert!(c.using_disk());
    remove_scratch_files(&dir);

    let err = c.close().unwrap_err();
    assert_eq!(err.code(), ErrorCode::Io);
    c.close().unwrap();
    assert_eq!(ctx.disk_monitor().allocated(), 0);
}

#[test]
fn test_spill_failure_reports_scratch_engine_error() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let ctx = file_backed(&dir, 1 << 20);
    let mut c = ctx
        .create_container(ContainerSchema::new(vec![ColumnType::Int], vec![0]))
        .unwrap();
    c.add_row(&Row::ints(&[0])).unwrap();
    c.spill_to_disk().unwrap();
    c.unsafe_reset().unwrap();
    remove_scratch_files(&dir);

    for i in 0..20 {
        c.add_row(&Row::ints(&[i])).unwrap();
    }
    ctx.disk_monitor().set_budget(16);
    let err = c.spill_to_disk().unwrap_err();
    assert_eq!(err.code(), ErrorCode::SpillFailed);
    assert!(err.to_string().contains("closing scratch engine failed"));
    assert_eq!(ctx.disk_monitor().allocated(), 0);
    assert_eq!(ctx.memory_monitor().allocated(), 0);
    c.close().unwrap();
}
