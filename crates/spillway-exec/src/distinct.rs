//! DISTINCT over a row stream.
//!
//! Seen rows are kept in a [`HashedRowContainer`] bucketed by the distinct
//! columns, so the operator keeps working once the seen set outgrows the
//! memory budget. When the input is sorted on some of the distinct columns,
//! the seen set only has to cover the current group of equal ordered values
//! and is reset whenever that group changes. Groups are compared by their
//! encoded key, so they follow the container's notion of equality.

use tracing::debug;

use spillway_common::types::Key;
use spillway_common::{SpillwayError, SpillwayResult};

use crate::context::ExecutionContext;
use crate::rowcontainer::{ContainerSchema, ContainerStats, HashedRowContainer, RowIterator};
use crate::types::{ColumnType, Row};

/// Emits each distinct combination of the distinct columns once, in input
/// order.
///
/// # Example
///
/// ```rust
/// use spillway_exec::context::ExecutionContext;
/// use spillway_exec::distinct::Distinct;
/// use spillway_exec::types::{ColumnType, Row};
///
/// let ctx = ExecutionContext::for_testing().unwrap();
/// let mut distinct =
///     Distinct::new(&ctx, vec![ColumnType::Int, ColumnType::Int], &[0, 1], &[]).unwrap();
/// let out = distinct
///     .run(vec![Row::ints(&[2, 3]), Row::ints(&[2, 3]), Row::ints(&[2, 6])])
///     .unwrap();
/// assert_eq!(out, vec![Row::ints(&[2, 3]), Row::ints(&[2, 6])]);
/// ```
#[derive(Debug)]
pub struct Distinct {
    container: HashedRowContainer,
    eq_columns: Vec<usize>,
    ordered_columns: Vec<usize>,
    group: Option<Key>,
    rows_in: u64,
    rows_out: u64,
}

impl Distinct {
    /// Creates the operator.
    ///
    /// `ordered_columns` must be a subset of `distinct_columns`; the input
    /// is assumed to arrive grouped by them.
    pub fn new(
        ctx: &ExecutionContext,
        column_types: Vec<ColumnType>,
        distinct_columns: &[usize],
        ordered_columns: &[usize],
    ) -> SpillwayResult<Self> {
        if let Some(col) = ordered_columns
            .iter()
            .find(|col| !distinct_columns.contains(col))
        {
            return Err(SpillwayError::config(format!(
                "ordered column {} is not a distinct column",
                col
            )));
        }

        // Ordered columns lead the key so they form the ordering prefix.
        let mut eq_columns = ordered_columns.to_vec();
        eq_columns.extend(
            distinct_columns
                .iter()
                .filter(|col| !ordered_columns.contains(col)),
        );

        let schema = ContainerSchema::new(column_types, eq_columns.clone())
            .with_ordering(ordered_columns.to_vec())
            .with_encode_null(true);
        let container = ctx.create_container(schema)?;

        Ok(Self {
            container,
            eq_columns,
            ordered_columns: ordered_columns.to_vec(),
            group: None,
            rows_in: 0,
            rows_out: 0,
        })
    }

    /// Consumes one row and returns true if it should be emitted.
    pub fn push(&mut self, row: &Row) -> SpillwayResult<bool> {
        self.rows_in += 1;

        if !self.ordered_columns.is_empty() {
            let group = self
                .container
                .key_encoder()
                .encode(row, &self.ordered_columns, true)?
                .ok_or_else(|| SpillwayError::internal("key encoder dropped a NULL-encoding row"))?;
            if self.group.as_ref() != Some(&group) {
                if self.group.is_some() {
                    self.container.unsafe_reset()?;
                }
                self.group = Some(group);
            }
        }

        let seen = {
            let mut it = self.container.new_bucket_iterator(row, &self.eq_columns)?;
            it.rewind()?;
            let seen = it.valid();
            it.close();
            seen
        };
        if seen {
            return Ok(false);
        }

        self.container.add_row(row)?;
        self.rows_out += 1;
        Ok(true)
    }

    /// Runs the operator over `input` and returns the emitted rows.
    pub fn run<I>(&mut self, input: I) -> SpillwayResult<Vec<Row>>
    where
        I: IntoIterator<Item = Row>,
    {
        let mut out = Vec::new();
        for row in input {
            if self.push(&row)? {
                out.push(row);
            }
        }
        debug!(
            rows_in = self.rows_in,
            rows_out = self.rows_out,
            spilled = self.container.using_disk(),
            "distinct finished"
        );
        Ok(out)
    }

    /// Counters of the underlying container.
    pub fn stats(&self) -> ContainerStats {
        self.container.stats()
    }

    /// Releases the seen set.
    pub fn close(&mut self) -> SpillwayResult<()> {
        self.group = None;
        self.container.close()
    }
}
