//! Framing for intermediate key-value files.
//!
//! Each pair is written as `u32 key_len | key | u32 value_len | value` with
//! big-endian lengths, so keys and values may contain any bytes.

use std::path::Path;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{Error, KeyValue, Result};

const LEN_PREFIX: usize = std::mem::size_of::<u32>();

/// Append one framed pair to `buf`.
pub fn encode_into(kv: &KeyValue, buf: &mut BytesMut) {
    buf.reserve(2 * LEN_PREFIX + kv.key.len() + kv.value.len());
    buf.put_u32(kv.key.len() as u32);
    buf.put_slice(&kv.key);
    buf.put_u32(kv.value.len() as u32);
    buf.put_slice(&kv.value);
}

/// Decode every pair in `data`. `path` is only used for error reporting.
///
/// Keys and values share the backing buffer of `data`, nothing is copied.
pub fn decode(path: &Path, mut data: Bytes) -> Result<Vec<KeyValue>> {
    let total = data.len();
    let mut pairs = Vec::new();
    while data.has_remaining() {
        let offset = total - data.remaining();
        let key = take_field(&mut data).ok_or_else(|| corrupt(path, offset))?;
        let value = take_field(&mut data).ok_or_else(|| corrupt(path, offset))?;
        pairs.push(KeyValue { key, value });
    }
    Ok(pairs)
}

fn take_field(data: &mut Bytes) -> Option<Bytes> {
    if data.remaining() < LEN_PREFIX {
        return None;
    }
    let len = data.get_u32() as usize;
    if data.remaining() < len {
        return None;
    }
    Some(data.split_to(len))
}

fn corrupt(path: &Path, offset: usize) -> Error {
    Error::Corrupt {
        path: path.to_path_buf(),
        offset,
    }
}
