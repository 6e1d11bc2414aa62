//! Helpers shared by the integration tests.
#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use mrlease::config::{CoordinatorConfig, WorkerConfig};
use mrlease::publish::OutputLayout;
use mrlease::standalone::run_sequential;
use mrlease::{workload, Coordinator, Result, TaskSource, Worker, WorkerStats};
use tokio::task::JoinHandle;

pub const LEASE: Duration = Duration::from_millis(300);
pub const SWEEP: Duration = Duration::from_millis(50);

pub const TEXTS: [&str; 4] = [
    "the quick brown fox jumps over the lazy dog",
    "The dog barks. The fox runs!\nA quick dog",
    "",
    "lazy afternoons are for the lazy\nand the quick",
];

/// Write `texts` as numbered input files and return their paths.
pub fn write_inputs(dir: &Path, texts: &[&str]) -> Vec<String> {
    texts
        .iter()
        .enumerate()
        .map(|(i, text)| {
            let path = dir.join(format!("input-{i}.txt"));
            fs::write(&path, text).unwrap();
            path.to_string_lossy().into_owned()
        })
        .collect()
}

pub fn coordinator(work_dir: &Path, inputs: Vec<String>, n_reduce: u32) -> Coordinator {
    let config = CoordinatorConfig::default()
        .with_work_dir(work_dir)
        .with_lease(LEASE)
        .with_sweep_interval(SWEEP);
    Coordinator::new(inputs, n_reduce, config).unwrap()
}

pub fn worker_config(work_dir: &Path, id: &str) -> WorkerConfig {
    WorkerConfig::default()
        .with_work_dir(work_dir)
        .with_worker_id(id)
}

pub fn spawn_worker<S>(source: S, name: &str, config: WorkerConfig) -> JoinHandle<Result<WorkerStats>>
where
    S: TaskSource + 'static,
{
    let worker = Worker::new(source, workload::named(name).unwrap(), config);
    tokio::spawn(worker.run())
}

/// Every line of every published result shard, sorted.
pub fn result_lines(layout: &OutputLayout, n_reduce: u32) -> Vec<String> {
    let mut lines: Vec<String> = layout
        .reduce_outputs(n_reduce)
        .iter()
        .flat_map(|path| {
            fs::read_to_string(path)
                .unwrap()
                .lines()
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .collect();
    lines.sort();
    lines
}

/// Result of the same job run sequentially in its own directory.
pub fn sequential_lines(dir: &Path, inputs: &[String], n_reduce: u32, name: &str) -> Vec<String> {
    let layout = OutputLayout::new(dir);
    run_sequential(
        inputs,
        n_reduce,
        workload::named(name).unwrap(),
        Bytes::from_static(b"[]"),
        &layout,
    )
    .unwrap();
    result_lines(&layout, n_reduce)
}
