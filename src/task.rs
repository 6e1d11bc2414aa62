//! Task model shared by the coordinator, the task store and the workers.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use tokio::time::Instant;

/// Self-chosen identity of a worker, valid for the lifetime of its pull loop.
pub type WorkerId = String;

/// Worker ids end up in file names inside the shared directory, so only
/// ASCII letters, digits, `-` and `_` are allowed.
pub fn is_valid_worker_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Whether a task runs the map or the reduce function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum TaskKind {
    Map,
    Reduce,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::Map => f.write_str("map"),
            TaskKind::Reduce => f.write_str("reduce"),
        }
    }
}

/// Identifies a task: unique per (kind, index) within a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct TaskId {
    pub kind: TaskKind,
    pub index: u32,
}

impl TaskId {
    pub fn map(index: u32) -> Self {
        Self {
            kind: TaskKind::Map,
            index,
        }
    }

    pub fn reduce(index: u32) -> Self {
        Self {
            kind: TaskKind::Reduce,
            index,
        }
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.kind, self.index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Waiting in the supply queue.
    Pending,
    /// Held by a worker until its lease deadline.
    Assigned,
    /// A matching completion report was accepted and its output published.
    Completed,
}

/// Job-wide phase. All tasks of a stage complete before the next begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    Map,
    Reduce,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Map => f.write_str("Map"),
            Stage::Reduce => f.write_str("Reduce"),
            Stage::Done => f.write_str("Done"),
        }
    }
}

impl FromStr for Stage {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "Map" => Ok(Stage::Map),
            "Reduce" => Ok(Stage::Reduce),
            "Done" => Ok(Stage::Done),
            other => Err(crate::Error::Protocol(format!("unknown stage `{other}`"))),
        }
    }
}

/// One record of the coordinator's task table.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: TaskId,
    /// Input file identifier; only map tasks have one.
    pub input: Option<String>,
    pub state: TaskState,
    /// Current holder, `None` while pending.
    pub worker: Option<WorkerId>,
    /// After this instant an assigned task is considered abandoned.
    pub deadline: Option<Instant>,
}

impl Task {
    pub fn pending(id: TaskId, input: Option<String>) -> Self {
        Self {
            id,
            input,
            state: TaskState::Pending,
            worker: None,
            deadline: None,
        }
    }

    /// Whether `worker` still holds this task's exclusive claim.
    pub fn is_held_by(&self, worker: &str) -> bool {
        self.state == TaskState::Assigned && self.worker.as_deref() == Some(worker)
    }
}

/// Everything a worker needs to execute one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSpec {
    pub id: TaskId,
    pub input: Option<String>,
    pub n_map: u32,
    pub n_reduce: u32,
}

/// A worker's request: the task it finished last (if any) and a plea for more.
#[derive(Debug, Clone)]
pub struct TaskRequest {
    pub worker_id: WorkerId,
    pub last: Option<TaskId>,
}

/// The coordinator's answer to a [`TaskRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assignment {
    Task(TaskSpec),
    /// The job is done; the worker must stop.
    Finished,
}

/// Point-in-time view of the job, for status queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobStatus {
    pub stage: Stage,
    pub done: bool,
    pub pending: u32,
    pub assigned: u32,
    pub completed: u32,
    pub n_map: u32,
    pub n_reduce: u32,
}
