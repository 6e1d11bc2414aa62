//! File layout and the rename-based commit protocol.
//!
//! Workers only ever write to names scoped by their own identity. The
//! coordinator promotes those files to worker-free final names with a single
//! rename per file once it accepts a completion report, which is the only
//! point where a task's output becomes visible to readers.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::task::{TaskId, TaskKind};
use crate::{Error, Result};

/// Names of every private and final output file inside one shared directory.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Worker-private output of map task `map_index` for shard `reduce_index`.
    pub fn tmp_map_output(&self, worker: &str, map_index: u32, reduce_index: u32) -> PathBuf {
        self.root
            .join(format!("mr-tmp-{worker}-{map_index}-{reduce_index}"))
    }

    /// Published intermediate file read by reduce task `reduce_index`.
    pub fn map_output(&self, map_index: u32, reduce_index: u32) -> PathBuf {
        self.root.join(format!("mr-{map_index}-{reduce_index}"))
    }

    pub fn tmp_reduce_output(&self, worker: &str, reduce_index: u32) -> PathBuf {
        self.root.join(format!("mr-tmp-{worker}-out-{reduce_index}"))
    }

    /// Published result shard of the job.
    pub fn reduce_output(&self, reduce_index: u32) -> PathBuf {
        self.root.join(format!("mr-out-{reduce_index}"))
    }

    /// Every (private, final) pair a completed task has to publish.
    pub fn commit_pairs(&self, worker: &str, task: TaskId, n_reduce: u32) -> Vec<(PathBuf, PathBuf)> {
        match task.kind {
            TaskKind::Map => (0..n_reduce)
                .map(|r| {
                    (
                        self.tmp_map_output(worker, task.index, r),
                        self.map_output(task.index, r),
                    )
                })
                .collect(),
            TaskKind::Reduce => vec![(
                self.tmp_reduce_output(worker, task.index),
                self.reduce_output(task.index),
            )],
        }
    }

    /// Promote `worker`'s private outputs of `task` to their final names.
    ///
    /// Renames replace an existing final file atomically, so a reader opening
    /// the final name sees either the old or the new complete file. Map tasks
    /// are deterministic in their shard assignment, so replacing a file left
    /// by an earlier accepted attempt is harmless.
    pub fn publish(&self, worker: &str, task: TaskId, n_reduce: u32) -> Result<()> {
        for (from, to) in self.commit_pairs(worker, task, n_reduce) {
            fs::rename(&from, &to).map_err(|source| Error::Publish {
                from: from.clone(),
                to: to.clone(),
                source,
            })?;
            debug!("published {} -> {}", from.display(), to.display());
        }
        Ok(())
    }

    /// Final result shards of a job with `n_reduce` reduce tasks.
    pub fn reduce_outputs(&self, n_reduce: u32) -> Vec<PathBuf> {
        (0..n_reduce).map(|r| self.reduce_output(r)).collect()
    }

    /// Delete the published intermediate files of a finished job.
    ///
    /// Private files leaked by workers whose reports were ignored are left
    /// alone. Returns the number of files removed.
    pub fn remove_intermediates(&self, n_map: u32, n_reduce: u32) -> Result<usize> {
        let mut removed = 0;
        for m in 0..n_map {
            for r in 0..n_reduce {
                let path = self.map_output(m, r);
                match fs::remove_file(&path) {
                    Ok(()) => removed += 1,
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => return Err(Error::io(path, e)),
                }
            }
        }
        Ok(removed)
    }
}
