//! # spillway-exec
//!
//! Disk-backed row containers for SQL execution operators.
//!
//! Operators such as DISTINCT, hash joins and hash aggregation need to group
//! rows by the values of some columns and find them again later. This crate
//! provides a container that does so in memory while the memory budget
//! allows, then transparently moves everything to a scratch engine and keeps
//! serving the same iterators from disk.
//!
//! - **Types**: SQL values, column types and rows
//! - **Encoding**: order-preserving equality keys and row serialization
//! - **Row containers**: memory store, disk store and the spilling composite
//! - **Context**: shared memory and disk monitors for one query
//! - **Distinct**: a DISTINCT operator built on the container
//!
//! ## Example
//!
//! ```rust
//! use spillway_common::config::ExecutionConfig;
//! use spillway_exec::context::ExecutionContext;
//! use spillway_exec::rowcontainer::{ContainerSchema, RowIterator};
//! use spillway_exec::types::{ColumnType, Row};
//!
//! let ctx = ExecutionContext::new(ExecutionConfig::for_testing().with_memory_budget(0)).unwrap();
//! let schema = ContainerSchema::new(vec![ColumnType::Int, ColumnType::Int], vec![0]);
//! let mut container = ctx.create_container(schema).unwrap();
//!
//! container.add_row(&Row::ints(&[1, 10])).unwrap();
//! assert!(container.using_disk());
//!
//! let mut it = container.new_iterator().unwrap();
//! it.rewind().unwrap();
//! assert_eq!(it.row().unwrap(), &Row::ints(&[1, 10]));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod context;
pub mod distinct;
pub mod encoding;
pub mod rowcontainer;
pub mod types;

pub use context::ExecutionContext;
pub use distinct::Distinct;
pub use rowcontainer::{
    ContainerIter, ContainerSchema, ContainerStats, HashedRowContainer, RowHandle, RowIterator,
};
pub use types::{ColumnType, Row, Value};
