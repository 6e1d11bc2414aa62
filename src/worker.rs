//! The worker pull loop and task execution.
//!
//! A worker repeatedly asks its [`TaskSource`] for work, carrying the task it
//! just finished in the same request. Outputs only ever go to files named
//! after the worker; the coordinator publishes them when it accepts the
//! report.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use bytes::{BufMut, Bytes, BytesMut};
use itertools::Itertools;
use tracing::{debug, info, warn};

use crate::codec;
use crate::config::WorkerConfig;
use crate::publish::OutputLayout;
use crate::task::{Assignment, TaskId, TaskKind, TaskRequest, TaskSpec};
use crate::{shard, Error, KeyValue, Result, Workload};

/// Where a worker gets its tasks from.
///
/// Implemented in-process by [`crate::Coordinator`] and over the network by
/// [`crate::rpc::GrpcTaskSource`].
#[tonic::async_trait]
pub trait TaskSource: Send {
    /// Report `request.last` as finished (if set) and wait for the next task.
    async fn apply_for_task(&mut self, request: TaskRequest) -> Result<Assignment>;
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkerStats {
    pub tasks_run: usize,
    pub maps_run: usize,
    pub reduces_run: usize,
    /// Task executed but never reported because the task limit was hit.
    pub abandoned: Option<TaskId>,
}

impl WorkerStats {
    fn record(&mut self, id: TaskId) {
        self.tasks_run += 1;
        match id.kind {
            TaskKind::Map => self.maps_run += 1,
            TaskKind::Reduce => self.reduces_run += 1,
        }
    }
}

pub struct Worker<S> {
    source: S,
    workload: Workload,
    config: WorkerConfig,
    layout: OutputLayout,
}

impl<S: TaskSource> Worker<S> {
    pub fn new(source: S, workload: Workload, config: WorkerConfig) -> Self {
        let layout = OutputLayout::new(config.work_dir.clone());
        Self {
            source,
            workload,
            config,
            layout,
        }
    }

    pub fn id(&self) -> &str {
        &self.config.worker_id
    }

    /// Pull and execute tasks until the source reports the job finished or
    /// the configured task limit is reached.
    pub async fn run(mut self) -> Result<WorkerStats> {
        let mut stats = WorkerStats::default();
        if self.config.max_tasks == Some(0) {
            return Ok(stats);
        }

        let mut last = None;
        loop {
            let request = TaskRequest {
                worker_id: self.config.worker_id.clone(),
                last: last.take(),
            };
            let spec = match self.source.apply_for_task(request).await? {
                Assignment::Task(spec) => spec,
                Assignment::Finished => {
                    info!(
                        "worker {} finished after {} tasks",
                        self.config.worker_id, stats.tasks_run
                    );
                    return Ok(stats);
                }
            };

            info!("worker {} running {}", self.config.worker_id, spec.id);
            // The next request is only sent once this task has finished, so a
            // worker never holds two tasks.
            let job = blocking_job(&self.layout, &self.config, self.workload, &spec);
            tokio::task::spawn_blocking(job).await??;
            stats.record(spec.id);

            if self.config.max_tasks.map_or(false, |max| stats.tasks_run >= max) {
                warn!(
                    "worker {} reached its limit of {} tasks, leaving {} unreported",
                    self.config.worker_id, stats.tasks_run, spec.id
                );
                stats.abandoned = Some(spec.id);
                return Ok(stats);
            }
            last = Some(spec.id);
        }
    }
}

/// Package `spec` as a job for the blocking pool, so file I/O and user code
/// stay off the async runtime.
fn blocking_job(
    layout: &OutputLayout,
    config: &WorkerConfig,
    workload: Workload,
    spec: &TaskSpec,
) -> impl FnOnce() -> Result<()> + Send + 'static {
    let layout = layout.clone();
    let worker = config.worker_id.clone();
    let aux = config.aux.clone();
    let spec = spec.clone();

    move || match spec.id.kind {
        TaskKind::Map => run_map(&layout, &worker, &spec, &workload, aux),
        TaskKind::Reduce => run_reduce(&layout, &worker, &spec, &workload, aux),
    }
}

/// Run the map function over the whole input and write one private
/// intermediate file per reduce shard, empty shards included.
pub fn run_map(
    layout: &OutputLayout,
    worker: &str,
    spec: &TaskSpec,
    workload: &Workload,
    aux: Bytes,
) -> Result<()> {
    let input = spec
        .input
        .as_deref()
        .ok_or_else(|| Error::Protocol(format!("{} was assigned without an input file", spec.id)))?;
    let contents = fs::read(input).map_err(|e| Error::io(input, e))?;

    let user_error = |source: anyhow::Error| Error::Workload {
        task: spec.id,
        source,
    };
    let input_kv = KeyValue::new(input.to_string(), contents);
    let mut shards = vec![BytesMut::new(); spec.n_reduce as usize];
    let mut emitted = 0usize;
    for item in (workload.map_fn)(input_kv, aux).map_err(user_error)? {
        let kv = item.map_err(user_error)?;
        codec::encode_into(&kv, &mut shards[shard(&kv.key, spec.n_reduce) as usize]);
        emitted += 1;
    }

    for (reduce_index, buf) in shards.iter().enumerate() {
        let path = layout.tmp_map_output(worker, spec.id.index, reduce_index as u32);
        write_private(&path, buf)?;
    }
    debug!("{} emitted {} pairs from {}", spec.id, emitted, input);
    Ok(())
}

/// Read this shard's published intermediate files from every map task, group
/// the pairs by key and write `key value` lines to a private output file.
pub fn run_reduce(
    layout: &OutputLayout,
    worker: &str,
    spec: &TaskSpec,
    workload: &Workload,
    aux: Bytes,
) -> Result<()> {
    let reduce_index = spec.id.index;
    let mut pairs = Vec::new();
    for map_index in 0..spec.n_map {
        let path = layout.map_output(map_index, reduce_index);
        let data = fs::read(&path).map_err(|e| Error::io(&path, e))?;
        pairs.extend(codec::decode(&path, Bytes::from(data))?);
    }
    pairs.sort_by(|a, b| a.key.cmp(&b.key));

    let mut out = BytesMut::new();
    let mut keys = 0usize;
    for (key, group) in &pairs.into_iter().chunk_by(KeyValue::key) {
        let values = Box::new(group.map(KeyValue::into_value));
        let value = (workload.reduce_fn)(key.clone(), values, aux.clone()).map_err(|source| {
            Error::Workload {
                task: spec.id,
                source,
            }
        })?;
        out.put_slice(&key);
        out.put_u8(b' ');
        out.put_slice(&value);
        out.put_u8(b'\n');
        keys += 1;
    }

    write_private(&layout.tmp_reduce_output(worker, reduce_index), &out)?;
    debug!("{} reduced {} keys", spec.id, keys);
    Ok(())
}

/// Create (or truncate) `path`, write `data` and flush it to disk before the
/// coordinator can rename it into place.
fn write_private(path: &Path, data: &[u8]) -> Result<()> {
    let mut file = File::create(path).map_err(|e| Error::io(path, e))?;
    file.write_all(data).map_err(|e| Error::io(path, e))?;
    file.sync_all().map_err(|e| Error::io(path, e))
}
