//! Variable-length integer encoding utilities.
//!
//! Little-endian base-128 varints with a continuation bit, plus zigzag
//! mapping for signed values.

use crate::error::{MemIndexError, Result};

/// Append `value` to `buf` using variable-length encoding.
pub fn write_u64(buf: &mut Vec<u8>, value: u64) {
    let mut val = value;

    loop {
        let mut byte = (val & 0x7F) as u8;
        val >>= 7;

        if val != 0 {
            byte |= 0x80; // Set continuation bit
        }

        buf.push(byte);

        if val == 0 {
            break;
        }
    }
}

pub fn write_u32(buf: &mut Vec<u8>, value: u32) {
    write_u64(buf, value as u64);
}

pub fn write_i32(buf: &mut Vec<u8>, value: i32) {
    write_u64(buf, zigzag_encode(value) as u64);
}

/// Decode a u64 starting at `*offset`, advancing the offset past it.
pub fn read_u64(bytes: &[u8], offset: &mut usize) -> Result<u64> {
    let mut result = 0u64;
    let mut shift = 0;

    while let Some(&byte) = bytes.get(*offset) {
        *offset += 1;

        if shift >= 64 {
            return Err(MemIndexError::feature_store("VarInt overflow"));
        }

        result |= ((byte & 0x7F) as u64) << shift;

        if (byte & 0x80) == 0 {
            return Ok(result);
        }

        shift += 7;
    }

    Err(MemIndexError::feature_store("Incomplete VarInt"))
}

pub fn read_u32(bytes: &[u8], offset: &mut usize) -> Result<u32> {
    let value = read_u64(bytes, offset)?;
    u32::try_from(value)
        .map_err(|_| MemIndexError::feature_store(format!("VarInt {value} exceeds u32")))
}

pub fn read_i32(bytes: &[u8], offset: &mut usize) -> Result<i32> {
    Ok(zigzag_decode(read_u32(bytes, offset)?))
}

fn zigzag_encode(value: i32) -> u32 {
    ((value << 1) ^ (value >> 31)) as u32
}

fn zigzag_decode(value: u32) -> i32 {
    ((value >> 1) as i32) ^ -((value & 1) as i32)
}
