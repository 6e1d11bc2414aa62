//! Runtime configuration of the coordinator and worker processes.
//!
//! The binaries parse their `clap` arguments (see [`crate::cmd`]) and convert
//! them into these structs; library users and tests build them directly.

use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;
use uuid::Uuid;

use crate::task::WorkerId;
use crate::{Error, Result};

/// How long a worker may hold a task before it is presumed dead.
pub const DEFAULT_LEASE: Duration = Duration::from_secs(10);

/// How often the coordinator scans for expired leases.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Shared directory holding private and published outputs.
    pub work_dir: PathBuf,
    pub lease: Duration,
    pub sweep_interval: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("."),
            lease: DEFAULT_LEASE,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

impl CoordinatorConfig {
    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = work_dir.into();
        self
    }

    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    pub fn with_sweep_interval(mut self, sweep_interval: Duration) -> Self {
        self.sweep_interval = sweep_interval;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.lease.is_zero() {
            return Err(Error::Config("lease duration must be positive".into()));
        }
        if self.sweep_interval.is_zero() {
            return Err(Error::Config("sweep interval must be positive".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Shared directory, the same one the coordinator publishes into.
    pub work_dir: PathBuf,
    pub worker_id: WorkerId,
    /// Exit after executing this many tasks, without reporting the last one.
    pub max_tasks: Option<usize>,
    /// JSON-encoded auxiliary arguments handed to the workload callbacks.
    pub aux: Bytes,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("."),
            worker_id: default_worker_id(),
            max_tasks: None,
            aux: Bytes::from_static(b"[]"),
        }
    }
}

impl WorkerConfig {
    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = work_dir.into();
        self
    }

    pub fn with_worker_id(mut self, worker_id: impl Into<WorkerId>) -> Self {
        self.worker_id = worker_id.into();
        self
    }

    pub fn with_max_tasks(mut self, max_tasks: Option<usize>) -> Self {
        self.max_tasks = max_tasks;
        self
    }

    /// Encode auxiliary CLI arguments the way workloads expect to find them.
    pub fn with_args(mut self, args: &[String]) -> Result<Self> {
        let encoded = serde_json::to_vec(args)
            .map_err(|e| Error::Config(format!("cannot encode workload arguments: {e}")))?;
        self.aux = Bytes::from(encoded);
        Ok(self)
    }
}

/// Process id plus a random suffix, so worker ids stay unique even when
/// workers on different hosts share a pid.
pub fn default_worker_id() -> WorkerId {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", std::process::id(), &suffix[..8])
}
