//! Key and row encodings shared by the memory and disk stores.

mod key;
mod row;

pub use key::{KeyEncoder, OrderedKeyEncoder};
pub use row::{decode_row, encode_row};
