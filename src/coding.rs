//! Little-endian fixed-width and varint helpers shared by the block formats.

use integer_encoding::VarInt;

use crate::error::{Error, Result};

pub fn put_fixed32(dst: &mut Vec<u8>, value: u32) {
    dst.extend_from_slice(&value.to_le_bytes());
}

pub fn decode_fixed32(src: &[u8]) -> u32 {
    u32::from_le_bytes([src[0], src[1], src[2], src[3]])
}

pub fn put_varint<V: VarInt>(dst: &mut Vec<u8>, value: V) {
    let start = dst.len();
    dst.resize(start + value.required_space(), 0);
    value.encode_var(&mut dst[start..]);
}

/// Decode one varint from the front of `src`, returning it and the bytes used.
pub fn get_varint<V: VarInt>(src: &[u8], what: &str) -> Result<(V, usize)> {
    V::decode_var(src).ok_or_else(|| Error::Corruption(format!("bad varint in {what}")))
}
