//! Container layout: column types, equality columns and options.

use spillway_common::{SpillwayError, SpillwayResult};

use crate::types::{ColumnType, Row};

/// Describes the rows a container holds and how they are bucketed.
///
/// # Example
///
/// ```rust
/// use spillway_exec::rowcontainer::ContainerSchema;
/// use spillway_exec::types::ColumnType;
///
/// let schema = ContainerSchema::new(vec![ColumnType::Int, ColumnType::String], vec![0])
///     .with_marks(true)
///     .with_encode_null(false);
/// assert!(schema.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSchema {
    column_types: Vec<ColumnType>,
    eq_columns: Vec<usize>,
    ordering: Vec<usize>,
    marks_enabled: bool,
    encode_null: bool,
}

impl ContainerSchema {
    /// Creates a schema bucketing rows of `column_types` by `eq_columns`.
    ///
    /// Marks are disabled and NULLs are encoded (NULL matches NULL).
    pub fn new(column_types: Vec<ColumnType>, eq_columns: Vec<usize>) -> Self {
        Self {
            column_types,
            eq_columns,
            ordering: Vec::new(),
            marks_enabled: false,
            encode_null: true,
        }
    }

    /// Enables or disables per-row marks.
    pub fn with_marks(mut self, enabled: bool) -> Self {
        self.marks_enabled = enabled;
        self
    }

    /// Sets whether NULL equality values can match.
    pub fn with_encode_null(mut self, encode_null: bool) -> Self {
        self.encode_null = encode_null;
        self
    }

    /// Declares that input rows arrive sorted on `columns`.
    ///
    /// The columns must be a prefix of the equality columns.
    pub fn with_ordering(mut self, columns: Vec<usize>) -> Self {
        self.ordering = columns;
        self
    }

    /// Column types.
    pub fn column_types(&self) -> &[ColumnType] {
        &self.column_types
    }

    /// Number of columns per row.
    pub fn arity(&self) -> usize {
        self.column_types.len()
    }

    /// Equality columns.
    pub fn eq_columns(&self) -> &[usize] {
        &self.eq_columns
    }

    /// Declared input ordering.
    pub fn ordering(&self) -> &[usize] {
        &self.ordering
    }

    /// Returns true if marks are enabled.
    pub fn marks_enabled(&self) -> bool {
        self.marks_enabled
    }

    /// Returns true if NULL equality values can match.
    pub fn encode_null(&self) -> bool {
        self.encode_null
    }

    /// Checks the schema and returns a config error if it is malformed.
    pub fn validate(&self) -> SpillwayResult<()> {
        if self.column_types.is_empty() {
            return Err(SpillwayError::config("container needs at least one column"));
        }

        for &col in &self.eq_columns {
            if col >= self.arity() {
                return Err(SpillwayError::config(format!(
                    "equality column {} out of range for {} columns",
                    col,
                    self.arity()
                )));
            }
        }

        if self.ordering.len() > self.eq_columns.len()
            || self.eq_columns[..self.ordering.len()] != self.ordering[..]
        {
            return Err(SpillwayError::config(format!(
                "ordering {:?} is not a prefix of equality columns {:?}",
                self.ordering, self.eq_columns
            )));
        }

        Ok(())
    }

    /// Checks that `row` matches the declared column count and types.
    pub fn check_row(&self, row: &Row) -> SpillwayResult<()> {
        if row.num_columns() != self.arity() {
            return Err(SpillwayError::config(format!(
                "row has {} columns, container expects {}",
                row.num_columns(),
                self.arity()
            )));
        }

        for (idx, (ty, value)) in self.column_types.iter().zip(row.values()).enumerate() {
            if !ty.accepts(value) {
                return Err(SpillwayError::config(format!(
                    "column {} expects {}, got {:?}",
                    idx, ty, value
                )));
            }
        }

        Ok(())
    }
}
