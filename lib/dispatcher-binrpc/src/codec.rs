//! BINRPC v1 request encoding
//!
//! Packet layout (big endian):
//!
//! ```text
//! | magic:4 | version:4 | flags:4 | len_size-1:2 | cookie_size-1:2 | body len | cookie | body |
//! ```
//!
//! Each body record starts with a header byte `| S:1 | size:3 | type:4 |`.
//! With `S` clear, `size` is the value length; with `S` set, `size` is the
//! number of bytes holding the value length, which follow the header.

use thiserror::Error;

const MAGIC: u8 = 0xA;
const VERSION: u8 = 1;
const COOKIE_SIZE: usize = 4;

const TYPE_INT: u8 = 0;
const TYPE_STR: u8 = 1;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CodecError {
    #[error("record of {0} bytes is too large")]
    RecordTooLarge(usize),

    #[error("body of {0} bytes is too large")]
    BodyTooLarge(usize),
}

/// Parameter of a BINRPC call
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    Int(i32),
    Str(String),
}

/// Encode a request packet calling `method` with `params`
pub fn encode_request(method: &str, params: &[Value], cookie: u32) -> Result<Vec<u8>, CodecError> {
    let mut body = Vec::new();
    write_str(&mut body, method)?;
    for param in params {
        match param {
            Value::Int(v) => write_int(&mut body, *v),
            Value::Str(s) => write_str(&mut body, s)?,
        }
    }

    let len_size = byte_len(body.len() as u64).max(1);
    if len_size > 4 {
        return Err(CodecError::BodyTooLarge(body.len()));
    }

    let mut packet = Vec::with_capacity(2 + len_size + COOKIE_SIZE + body.len());
    packet.push((MAGIC << 4) | VERSION);
    packet.push((((len_size - 1) as u8) << 2) | (COOKIE_SIZE - 1) as u8);
    push_be(&mut packet, body.len() as u64, len_size);
    push_be(&mut packet, cookie as u64, COOKIE_SIZE);
    packet.extend_from_slice(&body);
    Ok(packet)
}

fn write_str(buf: &mut Vec<u8>, s: &str) -> Result<(), CodecError> {
    // Strings are sent NUL terminated
    let len = s.len() + 1;
    if len < 8 {
        buf.push(((len as u8) << 4) | TYPE_STR);
    } else {
        let size = byte_len(len as u64);
        if size > 4 {
            return Err(CodecError::RecordTooLarge(len));
        }
        buf.push(0x80 | ((size as u8) << 4) | TYPE_STR);
        push_be(buf, len as u64, size);
    }
    buf.extend_from_slice(s.as_bytes());
    buf.push(0);
    Ok(())
}

fn write_int(buf: &mut Vec<u8>, v: i32) {
    let v = v as u32;
    let size = byte_len(v as u64);
    buf.push(((size as u8) << 4) | TYPE_INT);
    push_be(buf, v as u64, size);
}

/// Minimum number of bytes needed to hold `v`; zero for zero
fn byte_len(v: u64) -> usize {
    (64 - v.leading_zeros() as usize).div_ceil(8)
}

fn push_be(buf: &mut Vec<u8>, v: u64, size: usize) {
    buf.extend_from_slice(&v.to_be_bytes()[8 - size..]);
}
