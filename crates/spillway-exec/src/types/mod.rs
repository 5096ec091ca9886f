//! SQL values, column types and rows.

mod row;
mod value;

pub use row::Row;
pub use value::{ColumnType, Value};
