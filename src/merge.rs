//! Combining the result shards of a finished job into one sorted file.

use std::fs;
use std::path::Path;

use tracing::info;

use crate::publish::OutputLayout;
use crate::{Error, Result};

/// Concatenate every published reduce output, sort the lines by key and
/// write them to `dest`. Returns the number of lines written.
pub fn merge_outputs(layout: &OutputLayout, n_reduce: u32, dest: &Path) -> Result<usize> {
    let mut lines: Vec<Vec<u8>> = Vec::new();
    for path in layout.reduce_outputs(n_reduce) {
        let data = fs::read(&path).map_err(|e| Error::io(&path, e))?;
        lines.extend(
            data.split(|&b| b == b'\n')
                .filter(|line| !line.is_empty())
                .map(<[u8]>::to_vec),
        );
    }
    lines.sort_by(|a, b| line_key(a).cmp(line_key(b)));

    let mut out = Vec::with_capacity(lines.iter().map(|line| line.len() + 1).sum());
    for line in &lines {
        out.extend_from_slice(line);
        out.push(b'\n');
    }
    fs::write(dest, out).map_err(|e| Error::io(dest, e))?;

    info!(
        "merged {} lines from {} shards into {}",
        lines.len(),
        n_reduce,
        dest.display()
    );
    Ok(lines.len())
}

/// The key of a `key value` output line.
fn line_key(line: &[u8]) -> &[u8] {
    match line.iter().position(|&b| b == b' ') {
        Some(end) => &line[..end],
        None => line,
    }
}
