//! Binary row serialization for the disk store.
//!
//! ```text
//! ┌──────────────────┬────────────────────────────────────────┐
//! │ num_columns (u32)│ per column: tag (u8) + payload          │
//! └──────────────────┴────────────────────────────────────────┘
//! ```
//!
//! Fixed-width payloads are little-endian; strings and bytes carry a u32
//! length prefix. Values are not order-preserving here: ordering comes from
//! the key.

use bytes::{Buf, BufMut, BytesMut};

use spillway_common::{SpillwayError, SpillwayResult};

use crate::types::{Row, Value};

/// Type tags for row serialization.
#[repr(u8)]
#[derive(Debug, Clone, Copy)]
enum TypeTag {
    Null = 0,
    Boolean = 1,
    SmallInt = 2,
    Int = 3,
    BigInt = 4,
    Double = 5,
    String = 6,
    Bytes = 7,
    Date = 8,
    Timestamp = 9,
}

impl TypeTag {
    fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(TypeTag::Null),
            1 => Some(TypeTag::Boolean),
            2 => Some(TypeTag::SmallInt),
            3 => Some(TypeTag::Int),
            4 => Some(TypeTag::BigInt),
            5 => Some(TypeTag::Double),
            6 => Some(TypeTag::String),
            7 => Some(TypeTag::Bytes),
            8 => Some(TypeTag::Date),
            9 => Some(TypeTag::Timestamp),
            _ => None,
        }
    }
}

/// Appends the serialized form of `row` to `buf`.
pub fn encode_row(row: &Row, buf: &mut BytesMut) {
    buf.put_u32(row.num_columns() as u32);
    for value in row.values() {
        encode_value(value, buf);
    }
}

fn encode_value(value: &Value, buf: &mut BytesMut) {
    match value {
        Value::Null => buf.put_u8(TypeTag::Null as u8),
        Value::Boolean(b) => {
            buf.put_u8(TypeTag::Boolean as u8);
            buf.put_u8(u8::from(*b));
        }
        Value::SmallInt(i) => {
            buf.put_u8(TypeTag::SmallInt as u8);
            buf.put_i16_le(*i);
        }
        Value::Int(i) => {
            buf.put_u8(TypeTag::Int as u8);
            buf.put_i32_le(*i);
        }
        Value::BigInt(i) => {
            buf.put_u8(TypeTag::BigInt as u8);
            buf.put_i64_le(*i);
        }
        Value::Double(f) => {
            buf.put_u8(TypeTag::Double as u8);
            buf.put_f64_le(*f);
        }
        Value::String(s) => {
            buf.put_u8(TypeTag::String as u8);
            buf.put_u32_le(s.len() as u32);
            buf.put_slice(s.as_bytes());
        }
        Value::Bytes(b) => {
            buf.put_u8(TypeTag::Bytes as u8);
            buf.put_u32_le(b.len() as u32);
            buf.put_slice(b);
        }
        Value::Date(d) => {
            buf.put_u8(TypeTag::Date as u8);
            buf.put_i32_le(*d);
        }
        Value::Timestamp(t) => {
            buf.put_u8(TypeTag::Timestamp as u8);
            buf.put_i64_le(*t);
        }
    }
}

/// Decodes a row written by [`encode_row`]. Trailing bytes are rejected.
pub fn decode_row(mut bytes: &[u8]) -> SpillwayResult<Row> {
    ensure(&bytes, 4, "column count")?;
    let num_cols = bytes.get_u32() as usize;

    let mut values = Vec::with_capacity(num_cols.min(1024));
    for _ in 0..num_cols {
        values.push(decode_value(&mut bytes)?);
    }
    if bytes.has_remaining() {
        return Err(SpillwayError::encoding(format!(
            "{} trailing bytes after row",
            bytes.remaining()
        )));
    }
    Ok(Row::new(values))
}

fn decode_value(bytes: &mut &[u8]) -> SpillwayResult<Value> {
    ensure(bytes, 1, "type tag")?;
    let raw = bytes.get_u8();
    let tag = TypeTag::from_u8(raw)
        .ok_or_else(|| SpillwayError::encoding(format!("unknown type tag: {}", raw)))?;

    let value = match tag {
        TypeTag::Null => Value::Null,
        TypeTag::Boolean => {
            ensure(bytes, 1, "boolean")?;
            Value::Boolean(bytes.get_u8() != 0)
        }
        TypeTag::SmallInt => {
            ensure(bytes, 2, "smallint")?;
            Value::SmallInt(bytes.get_i16_le())
        }
        TypeTag::Int => {
            ensure(bytes, 4, "int")?;
            Value::Int(bytes.get_i32_le())
        }
        TypeTag::BigInt => {
            ensure(bytes, 8, "bigint")?;
            Value::BigInt(bytes.get_i64_le())
        }
        TypeTag::Double => {
            ensure(bytes, 8, "double")?;
            Value::Double(bytes.get_f64_le())
        }
        TypeTag::String => {
            let data = take_prefixed(bytes, "string")?;
            let s = String::from_utf8(data)
                .map_err(|e| SpillwayError::encoding(format!("invalid utf-8 string: {}", e)))?;
            Value::String(s)
        }
        TypeTag::Bytes => Value::Bytes(take_prefixed(bytes, "bytes")?),
        TypeTag::Date => {
            ensure(bytes, 4, "date")?;
            Value::Date(bytes.get_i32_le())
        }
        TypeTag::Timestamp => {
            ensure(bytes, 8, "timestamp")?;
            Value::Timestamp(bytes.get_i64_le())
        }
    };
    Ok(value)
}

fn take_prefixed(bytes: &mut &[u8], what: &str) -> SpillwayResult<Vec<u8>> {
    ensure(bytes, 4, what)?;
    let len = bytes.get_u32_le() as usize;
    ensure(bytes, len, what)?;
    let data = bytes[..len].to_vec();
    bytes.advance(len);
    Ok(data)
}

fn ensure(bytes: &&[u8], needed: usize, what: &str) -> SpillwayResult<()> {
    if bytes.len() < needed {
        return Err(SpillwayError::encoding(format!(
            "truncated {}: need {} bytes, have {}",
            what,
            needed,
            bytes.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(row: &Row) -> Row {
        let mut buf = BytesMut::new();
        encode_row(row, &mut buf);
        decode_row(&buf).unwrap()
    }

    #[test]
    fn test_all_types() {
        let row = Row::new(vec![
            Value::Null,
            Value::Boolean(true),
            Value::SmallInt(-1000),
            Value::Int(123_456),
            Value::BigInt(9_876_543_210),
            Value::Double(2.718_28),
            Value::string("hello\0world"),
            Value::Bytes(vec![0, 1, 2, 255]),
            Value::Date(19_000),
            Value::Timestamp(-42),
        ]);
        assert_eq!(roundtrip(&row), row);
    }

    #[test]
    fn test_empty_row() {
        assert!(roundtrip(&Row::new(Vec::new())).is_empty());
    }

    #[test]
    fn test_truncated_input() {
        let mut buf = BytesMut::new();
        encode_row(&Row::new(vec![Value::string("abcdef")]), &mut buf);

        let err = decode_row(&buf[..buf.len() - 2]).unwrap_err();
        assert!(err.to_string().contains("truncated"));
        assert!(decode_row(&[0, 0]).is_err());
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut buf = BytesMut::new();
        encode_row(&Row::ints(&[1]), &mut buf);
        buf.put_u8(0xAA);
        assert!(decode_row(&buf).is_err());
    }

    #[test]
    fn test_unknown_tag() {
        let err = decode_row(&[0, 0, 0, 1, 77]).unwrap_err();
        assert!(err.to_string().contains("unknown type tag"));
    }
}
