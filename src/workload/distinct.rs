//! Emits every distinct whitespace-separated token once.

use crate::*;
use anyhow::Result;
use bytes::Bytes;

pub fn map(kv: KeyValue, _aux: Bytes) -> MapOutput {
    let s = String::from_utf8(kv.value.as_ref().into())?;
    let tokens = s
        .split_whitespace()
        .map(|token| token.to_string())
        .collect::<Vec<_>>();
    Ok(Box::new(
        tokens
            .into_iter()
            .map(|token| Ok(KeyValue::new(token, Bytes::new()))),
    ))
}

pub fn reduce(
    _key: Bytes,
    _values: Box<dyn Iterator<Item = Bytes> + '_>,
    _aux: Bytes,
) -> Result<Bytes> {
    Ok(Bytes::new())
}
