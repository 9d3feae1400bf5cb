//! LEB128 varints and zigzag mapping for TWKB.

use crate::error::{GpkgError, Result};

/// Longest encoding of a `u64` in 7-bit groups.
const MAX_VARINT_LEN: usize = 10;

/// Append `value` as an unsigned LEB128 varint.
pub(crate) fn encode_varint(mut value: u64, buf: &mut Vec<u8>) {
    while value >= 0x80 {
        buf.push((value as u8 & 0x7F) | 0x80);
        value >>= 7;
    }
    buf.push(value as u8);
}

/// Decode an unsigned LEB128 varint starting at `*pos`, advancing `*pos`.
pub(crate) fn decode_varint(buf: &[u8], pos: &mut usize) -> Result<u64> {
    let mut result = 0u64;
    let mut shift = 0u32;
    for i in 0..MAX_VARINT_LEN {
        let Some(&byte) = buf.get(*pos) else {
            return Err(GpkgError::BufferUnderrun {
                needed: 1,
                remaining: 0,
            });
        };
        *pos += 1;
        if i == MAX_VARINT_LEN - 1 && byte > 0x01 {
            break;
        }
        result |= u64::from(byte & 0x7F) << shift;
        if byte & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
    }
    Err(GpkgError::Parse {
        expected: "varint of at most 10 bytes",
        position: *pos,
    })
}

#[inline]
pub(crate) fn zigzag_encode(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

#[inline]
pub(crate) fn zigzag_decode(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}
