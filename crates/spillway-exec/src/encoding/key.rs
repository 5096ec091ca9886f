//! Order-preserving equality-key encoding.
//!
//! Each encoded column is a type tag followed by a payload whose byte order
//! matches the value order:
//!
//! - integers: big-endian with the sign bit flipped
//! - doubles: IEEE bits with the sign bit flipped (all bits for negatives)
//! - strings and bytes: `0x00` escaped as `0x00 0xFF`, terminated by
//!   `0x00 0x01`
//!
//! The terminator makes every column encoding prefix-free, so two keys are
//! byte-equal exactly when all their columns are equal.

use std::fmt;

use bytes::{BufMut, BytesMut};

use spillway_common::types::Key;
use spillway_common::{SpillwayError, SpillwayResult};

use crate::types::{Row, Value};

const TAG_NULL: u8 = 0x00;
const TAG_BOOLEAN: u8 = 0x10;
const TAG_SMALLINT: u8 = 0x11;
const TAG_INT: u8 = 0x12;
const TAG_BIGINT: u8 = 0x13;
const TAG_DOUBLE: u8 = 0x14;
const TAG_STRING: u8 = 0x15;
const TAG_BYTES: u8 = 0x16;
const TAG_DATE: u8 = 0x17;
const TAG_TIMESTAMP: u8 = 0x18;

const ESCAPE: u8 = 0x00;
const ESCAPED_ZERO: u8 = 0xFF;
const TERMINATOR: u8 = 0x01;

/// Turns a row's equality columns into an ordered byte key.
///
/// Both row stores of a container use the same encoder, so bucket
/// membership and scan order agree between memory and disk.
pub trait KeyEncoder: Send + Sync + fmt::Debug {
    /// Encodes `columns` of `row`.
    ///
    /// Returns `None` when `encode_null` is false and one of the columns is
    /// NULL: such a key can never equal another key.
    fn encode(&self, row: &Row, columns: &[usize], encode_null: bool)
        -> SpillwayResult<Option<Key>>;
}

/// The default [`KeyEncoder`].
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderedKeyEncoder;

impl OrderedKeyEncoder {
    /// Creates the encoder.
    pub fn new() -> Self {
        Self
    }

    fn encode_value(value: &Value, buf: &mut BytesMut) {
        match value {
            Value::Null => buf.put_u8(TAG_NULL),
            Value::Boolean(b) => {
                buf.put_u8(TAG_BOOLEAN);
                buf.put_u8(u8::from(*b));
            }
            Value::SmallInt(i) => {
                buf.put_u8(TAG_SMALLINT);
                buf.put_u16((*i as u16) ^ 0x8000);
            }
            Value::Int(i) => {
                buf.put_u8(TAG_INT);
                buf.put_u32((*i as u32) ^ 0x8000_0000);
            }
            Value::BigInt(i) => {
                buf.put_u8(TAG_BIGINT);
                buf.put_u64((*i as u64) ^ 0x8000_0000_0000_0000);
            }
            Value::Double(f) => {
                buf.put_u8(TAG_DOUBLE);
                buf.put_u64(ordered_f64_bits(*f));
            }
            Value::String(s) => {
                buf.put_u8(TAG_STRING);
                put_escaped(s.as_bytes(), buf);
            }
            Value::Bytes(b) => {
                buf.put_u8(TAG_BYTES);
                put_escaped(b, buf);
            }
            Value::Date(d) => {
                buf.put_u8(TAG_DATE);
                buf.put_u32((*d as u32) ^ 0x8000_0000);
            }
            Value::Timestamp(t) => {
                buf.put_u8(TAG_TIMESTAMP);
                buf.put_u64((*t as u64) ^ 0x8000_0000_0000_0000);
            }
        }
    }
}

impl KeyEncoder for OrderedKeyEncoder {
    fn encode(
        &self,
        row: &Row,
        columns: &[usize],
        encode_null: bool,
    ) -> SpillwayResult<Option<Key>> {
        let mut buf = BytesMut::with_capacity(columns.len() * 9);
        for &idx in columns {
            let value = row.get(idx).ok_or_else(|| {
                SpillwayError::encoding(format!(
                    "equality column {} out of range for row with {} columns",
                    idx,
                    row.num_columns()
                ))
            })?;
            if value.is_null() && !encode_null {
                return Ok(None);
            }
            Self::encode_value(value, &mut buf);
        }
        Ok(Some(Key::from(buf.freeze())))
    }
}

fn ordered_f64_bits(f: f64) -> u64 {
    // 0.0 and -0.0 compare equal in SQL, and all NaNs form one bucket.
    let f = if f == 0.0 {
        0.0
    } else if f.is_nan() {
        f64::NAN
    } else {
        f
    };
    let bits = f.to_bits();
    if bits >> 63 == 1 {
        !bits
    } else {
        bits ^ (1 << 63)
    }
}

fn put_escaped(bytes: &[u8], buf: &mut BytesMut) {
    for &b in bytes {
        if b == ESCAPE {
            buf.put_u8(ESCAPE);
            buf.put_u8(ESCAPED_ZERO);
        } else {
            buf.put_u8(b);
        }
    }
    buf.put_u8(ESCAPE);
    buf.put_u8(TERMINATOR);
}
