//! # spillway-storage
//!
//! Scratch storage engines for Spillway.
//!
//! A scratch engine is a temporary ordered byte-key store. Row containers
//! create one the first time they spill and destroy it when they are reset
//! or closed. Nothing written here outlives the process.
//!
//! - **`MemTempEngine`**: an ordered map held in process memory
//! - **`FileTempEngine`**: an append-only temporary file with an ordered
//!   in-memory index of record offsets
//! - **`ScratchCursor`**: a lazily advancing, explicitly closed range cursor

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Scratch engines, key ranges and cursors
pub mod scratch;
