//! Small helpers shared by the binaries and the workloads.

use anyhow::{bail, Result};
use bytes::Bytes;
use glob::glob;

/// Read an entire [`Bytes`] slice into a [`String`].
///
/// Returns an error if the slice contains invalid UTF-8.
pub fn string_from_bytes(buf: Bytes) -> Result<String> {
    Ok(String::from_utf8(buf.as_ref().into())?)
}

/// Expand input arguments into the ordered list of map inputs.
///
/// Each argument is a path or a glob pattern. Matches of one pattern are
/// sorted, and the arguments keep their order, so task `i` always gets the
/// same file for the same command line. A pattern matching nothing is an error.
pub fn expand_inputs(patterns: &[String]) -> Result<Vec<String>> {
    let mut inputs = Vec::new();
    for pattern in patterns {
        let mut matches = glob(pattern)?
            .map(|entry| entry.map(|path| path.to_string_lossy().into_owned()))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        if matches.is_empty() {
            bail!("no input files match `{}`", pattern);
        }
        matches.sort();
        inputs.extend(matches);
    }
    Ok(inputs)
}
