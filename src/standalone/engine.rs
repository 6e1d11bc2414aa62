use bytes::Bytes;

use crate::publish::OutputLayout;
use crate::task::{TaskId, TaskSpec};
use crate::worker::{run_map, run_reduce};
use crate::{Result, Workload};

/// Identity used for every task of a sequential run.
pub const SEQUENTIAL_WORKER: &str = "sequential";

/// Run and publish every map task, one input at a time.
pub fn perform_map(
    layout: &OutputLayout,
    inputs: &[String],
    n_reduce: u32,
    engine: &Workload,
    aux: &Bytes,
) -> Result<()> {
    let n_map = inputs.len() as u32;
    for (index, input) in inputs.iter().enumerate() {
        let spec = TaskSpec {
            id: TaskId::map(index as u32),
            input: Some(input.clone()),
            n_map,
            n_reduce,
        };
        run_map(layout, SEQUENTIAL_WORKER, &spec, engine, aux.clone())?;
        layout.publish(SEQUENTIAL_WORKER, spec.id, n_reduce)?;
    }
    Ok(())
}

/// Run and publish every reduce task over the published map outputs.
pub fn perform_reduce(
    layout: &OutputLayout,
    n_map: u32,
    n_reduce: u32,
    engine: &Workload,
    aux: &Bytes,
) -> Result<()> {
    for index in 0..n_reduce {
        let spec = TaskSpec {
            id: TaskId::reduce(index),
            input: None,
            n_map,
            n_reduce,
        };
        run_reduce(layout, SEQUENTIAL_WORKER, &spec, engine, aux.clone())?;
        layout.publish(SEQUENTIAL_WORKER, spec.id, n_reduce)?;
    }
    Ok(())
}
