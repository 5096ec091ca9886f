//! Key and value byte strings.
//!
//! Both are cheap-to-clone wrappers over `Bytes`. Keys order
//! lexicographically by byte, which is the order every scratch engine and
//! every row store iterates in.

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::ops::Deref;

use crate::constants::SEQUENCE_SUFFIX_LEN;

/// An ordered byte key.
///
/// # Example
///
/// ```rust
/// use spillway_common::types::Key;
///
/// let bucket = Key::from_bytes(b"\x01\x02");
/// let row_key = bucket.with_sequence(7);
/// assert!(row_key.starts_with(bucket.as_bytes()));
/// assert_eq!(row_key.sequence_suffix(), Some(7));
/// ```
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Key(Bytes);

impl Key {
    /// Creates an empty key.
    #[inline]
    #[must_use]
    pub const fn empty() -> Self {
        Self(Bytes::new())
    }

    /// Creates a key from a byte slice.
    #[inline]
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(bytes))
    }

    /// Creates a key from owned bytes.
    #[inline]
    #[must_use]
    pub fn from_vec(vec: Vec<u8>) -> Self {
        Self(Bytes::from(vec))
    }

    /// Returns the length of the key in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the key is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the key as a byte slice.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Checks if this key starts with the given prefix.
    #[inline]
    #[must_use]
    pub fn starts_with(&self, prefix: &[u8]) -> bool {
        self.0.starts_with(prefix)
    }

    /// Returns this key followed by a big-endian sequence number.
    ///
    /// Keys sharing a prefix sort by sequence, so insertion order survives
    /// as the tiebreak inside a bucket.
    #[must_use]
    pub fn with_sequence(&self, seq: u64) -> Self {
        let mut buf = BytesMut::with_capacity(self.0.len() + SEQUENCE_SUFFIX_LEN);
        buf.put_slice(&self.0);
        buf.put_u64(seq);
        Self(buf.freeze())
    }

    /// Reads the trailing sequence number written by [`Key::with_sequence`].
    #[must_use]
    pub fn sequence_suffix(&self) -> Option<u64> {
        let len = self.0.len();
        if len < SEQUENCE_SUFFIX_LEN {
            return None;
        }
        let mut raw = [0u8; SEQUENCE_SUFFIX_LEN];
        raw.copy_from_slice(&self.0[len - SEQUENCE_SUFFIX_LEN..]);
        Some(u64::from_be_bytes(raw))
    }

    /// Returns the smallest key greater than every key with this prefix.
    ///
    /// `None` means the prefix range is unbounded above (empty key or all
    /// bytes `0xFF`).
    #[must_use]
    pub fn prefix_end(&self) -> Option<Self> {
        let mut bytes = self.0.to_vec();
        while let Some(last) = bytes.pop() {
            if last < 0xFF {
                bytes.push(last + 1);
                return Some(Self::from_vec(bytes));
            }
        }
        None
    }
}

impl Deref for Key {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<[u8]> for Key {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Ord for Key {
    #[inline]
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl PartialOrd for Key {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key(0x")?;
        for byte in &self.0[..self.0.len().min(32)] {
            write!(f, "{byte:02x}")?;
        }
        if self.0.len() > 32 {
            write!(f, "...")?;
        }
        write!(f, ")")
    }
}

impl From<Vec<u8>> for Key {
    #[inline]
    fn from(vec: Vec<u8>) -> Self {
        Self::from_vec(vec)
    }
}

impl From<&[u8]> for Key {
    #[inline]
    fn from(bytes: &[u8]) -> Self {
        Self::from_bytes(bytes)
    }
}

impl From<Bytes> for Key {
    #[inline]
    fn from(bytes: Bytes) -> Self {
        Self(bytes)
    }
}

/// A stored value.
///
/// Row stores put a serialized row here, optionally followed by a mark
/// byte.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Value(Bytes);

impl Value {
    /// Creates an empty value.
    #[inline]
    #[must_use]
    pub const fn empty() -> Self {
        Self(Bytes::new())
    }

    /// Creates a value from a byte slice.
    #[inline]
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(bytes))
    }

    /// Creates a value from owned bytes.
    #[inline]
    #[must_use]
    pub fn from_vec(vec: Vec<u8>) -> Self {
        Self(Bytes::from(vec))
    }

    /// Returns the length of the value in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the value is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the value as a byte slice.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl Deref for Value {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<[u8]> for Value {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Value({} bytes)", self.0.len())
    }
}

impl From<Vec<u8>> for Value {
    #[inline]
    fn from(vec: Vec<u8>) -> Self {
        Self::from_vec(vec)
    }
}

impl From<Bytes> for Value {
    #[inline]
    fn from(bytes: Bytes) -> Self {
        Self(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_ordering() {
        let a = Key::from_bytes(b"aaa");
        let b = Key::from_bytes(b"bbb");
        let aa = Key::from_bytes(b"aa");

        assert!(a < b);
        assert!(aa < a);
    }

    #[test]
    fn test_sequence_suffix_orders_within_prefix() {
        let prefix = Key::from_bytes(b"bucket");
        let first = prefix.with_sequence(1);
        let second = prefix.with_sequence(256);

        assert!(first < second);
        assert_eq!(first.len(), prefix.len() + SEQUENCE_SUFFIX_LEN);
        assert_eq!(second.sequence_suffix(), Some(256));
        assert_eq!(Key::from_bytes(b"ab").sequence_suffix(), None);
    }

    #[test]
    fn test_prefix_end() {
        let key = Key::from_bytes(b"abc");
        assert_eq!(key.prefix_end().unwrap().as_bytes(), b"abd");

        let key = Key::from_bytes(&[0x01, 0xFF]);
        assert_eq!(key.prefix_end().unwrap().as_bytes(), &[0x02]);

        assert!(Key::from_bytes(&[0xFF, 0xFF]).prefix_end().is_none());
        assert!(Key::empty().prefix_end().is_none());
    }

    #[test]
    fn test_value_creation() {
        let value = Value::from_bytes(b"hello world");
        assert_eq!(value.len(), 11);
        assert!(!value.is_empty());
        assert!(Value::empty().is_empty());
    }
}
