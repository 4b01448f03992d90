//! Little-endian DXB write helpers, the counterpart of [`crate::cursor::Cursor`].

use crate::opcode::Opcode;

pub fn push_op(buf: &mut Vec<u8>, op: Opcode) {
    buf.push(op as u8);
}

pub fn push_u8(buf: &mut Vec<u8>, value: u8) {
    buf.push(value);
}

pub fn push_u16(buf: &mut Vec<u8>, value: u16) {
    buf.extend_from_slice(&value.to_le_bytes());
}

pub fn push_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

pub fn push_u64(buf: &mut Vec<u8>, value: u64) {
    buf.extend_from_slice(&value.to_le_bytes());
}

pub fn push_i8(buf: &mut Vec<u8>, value: i8) {
    buf.extend_from_slice(&value.to_le_bytes());
}

pub fn push_i16(buf: &mut Vec<u8>, value: i16) {
    buf.extend_from_slice(&value.to_le_bytes());
}

pub fn push_i32(buf: &mut Vec<u8>, value: i32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

pub fn push_i64(buf: &mut Vec<u8>, value: i64) {
    buf.extend_from_slice(&value.to_le_bytes());
}

pub fn push_f64(buf: &mut Vec<u8>, value: f64) {
    buf.extend_from_slice(&value.to_le_bytes());
}

/// Text with a one-byte length prefix. Panics if `text` exceeds 255 bytes.
pub fn push_short_text(buf: &mut Vec<u8>, text: &str) {
    let len = u8::try_from(text.len()).expect("short text is at most 255 bytes");
    buf.push(len);
    buf.extend_from_slice(text.as_bytes());
}

/// Text with a four-byte length prefix.
pub fn push_long_text(buf: &mut Vec<u8>, text: &str) {
    push_long_bytes(buf, text.as_bytes());
}

pub fn push_long_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    push_u32(buf, bytes.len() as u32);
    buf.extend_from_slice(bytes);
}
