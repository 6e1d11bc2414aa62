//! A MapReduce-compatible implementation of `grep`.
//!
//! Every matching line is keyed by `file:line`, so the result shards list
//! each match exactly once as `file:line text`.

use crate::utils::string_from_bytes;
use crate::*;
use anyhow::{Context, Result};
use bytes::Bytes;
use clap::Parser;
use serde::{Deserialize, Serialize};

#[derive(Parser, Debug, Serialize, Deserialize)]
#[clap(no_binary_name = true)]
struct Args {
    #[clap(short, long, value_parser)]
    term: String,
}

fn parse_args(aux: &Bytes) -> Result<Args> {
    let args: Vec<String> =
        serde_json::from_slice(aux).context("grep arguments are not a JSON list")?;
    Ok(Args::try_parse_from(args)?)
}

#[allow(clippy::needless_collect)]
pub fn map(kv: KeyValue, aux: Bytes) -> MapOutput {
    let term = parse_args(&aux)?.term;
    let filename = string_from_bytes(kv.key())?;

    let s = string_from_bytes(kv.value)?;
    let lines = s
        .lines()
        .enumerate()
        .filter(|(_, s)| s.contains(&term))
        .map(|(i, s)| (i + 1, s.to_string()))
        .collect::<Vec<_>>();

    let iter = lines.into_iter().map(move |(line_num, line)| {
        Ok(KeyValue::new(format!("{filename}:{line_num}"), line))
    });
    Ok(Box::new(iter))
}

/// A `file:line` key is emitted once per map attempt, so any value will do.
pub fn reduce(
    _key: Bytes,
    mut values: Box<dyn Iterator<Item = Bytes> + '_>,
    _aux: Bytes,
) -> Result<Bytes> {
    Ok(values.next().unwrap_or_default())
}
