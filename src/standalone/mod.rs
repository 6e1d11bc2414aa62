//! Single-process execution of a whole job.
//!
//! Runs the same map and reduce code as the workers and publishes through the
//! same rename path, so its output is the reference a distributed run of the
//! same job must match.

use std::path::PathBuf;

use bytes::Bytes;
use tracing::info;

use crate::publish::OutputLayout;
use crate::{Error, Result, Workload};

pub mod engine;

use engine::{perform_map, perform_reduce};

/// Run every map task and then every reduce task in-process.
///
/// Returns the paths of the `n_reduce` published result shards.
pub fn run_sequential(
    inputs: &[String],
    n_reduce: u32,
    engine: Workload,
    aux: Bytes,
    layout: &OutputLayout,
) -> Result<Vec<PathBuf>> {
    if n_reduce == 0 {
        return Err(Error::Config("n_reduce must be at least 1".into()));
    }
    info!(
        "running {} map tasks and {} reduce tasks sequentially",
        inputs.len(),
        n_reduce
    );
    perform_map(layout, inputs, n_reduce, &engine, &aux)?;
    perform_reduce(layout, inputs.len() as u32, n_reduce, &engine, &aux)?;
    Ok(layout.reduce_outputs(n_reduce))
}
