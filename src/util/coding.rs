//! Encoding utilities for variable-length integers and byte strings.

use bytes::{Buf, BufMut, BytesMut};

/// Maximum bytes needed to encode a varint64.
pub const MAX_VARINT64_LEN: usize = 10;

/// Encode a 64-bit unsigned integer as a varint.
///
/// Returns the number of bytes written.
pub fn encode_varint64(buf: &mut BytesMut, mut value: u64) -> usize {
    let mut count = 0;
    while value >= 0x80 {
        buf.put_u8((value as u8) | 0x80);
        value >>= 7;
        count += 1;
    }
    buf.put_u8(value as u8);
    count + 1
}

/// Decode a 64-bit varint from a buffer.
///
/// Returns None if the buffer is too short or the varint is malformed.
/// Only the canonical (shortest) encoding of a value is accepted.
pub fn decode_varint64(buf: &mut &[u8]) -> Option<u64> {
    let mut result = 0u64;
    let mut shift = 0;

    for _ in 0..MAX_VARINT64_LEN {
        if buf.is_empty() {
            return None;
        }

        let byte = buf.get_u8();
        // The tenth byte carries bit 63 only.
        if shift == 63 && byte > 1 {
            return None;
        }
        result |= ((byte & 0x7F) as u64) << shift;

        if byte & 0x80 == 0 {
            if byte == 0 && shift > 0 {
                return None; // Trailing zero group
            }
            return Some(result);
        }

        shift += 7;
    }

    None // Varint too long
}

/// Get the number of bytes needed to encode a varint.
pub fn varint_length(value: u64) -> usize {
    let mut len = 1;
    let mut v = value;
    while v >= 0x80 {
        v >>= 7;
        len += 1;
    }
    len
}

/// Encode a length-prefixed byte slice.
pub fn encode_length_prefixed(buf: &mut BytesMut, data: &[u8]) {
    buf.reserve(varint_length(data.len() as u64) + data.len());
    encode_varint64(buf, data.len() as u64);
    buf.put_slice(data);
}

/// Decode a length-prefixed byte slice, borrowing from the input.
///
/// Returns None if the prefix is malformed or claims more bytes than remain.
pub fn decode_length_prefixed<'a>(buf: &mut &'a [u8]) -> Option<&'a [u8]> {
    let len = decode_varint64(buf)?;
    if (buf.len() as u64) < len {
        return None;
    }
    let (data, rest) = buf.split_at(len as usize);
    *buf = rest;
    Some(data)
}
