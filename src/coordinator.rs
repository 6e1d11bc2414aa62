//! The job controller.
//!
//! A [`Coordinator`] owns the [`TaskStore`] behind one mutex, answers
//! `ApplyForTask` requests and reclaims abandoned tasks with a periodic lease
//! sweep. The handle is cheap to clone; clones share the same job.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::config::CoordinatorConfig;
use crate::publish::OutputLayout;
use crate::store::{Report, TaskStore};
use crate::task::{is_valid_worker_id, Assignment, JobStatus, Stage, TaskId, TaskRequest};
use crate::worker::TaskSource;
use crate::{Error, Result};

#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

struct Inner {
    store: Mutex<TaskStore>,
    /// Same semaphore as the store's, awaited without holding the lock.
    supply: Arc<Semaphore>,
    layout: OutputLayout,
    config: CoordinatorConfig,
}

impl Coordinator {
    /// Create a coordinator for a job over `inputs` with `n_reduce` shards.
    pub fn new(inputs: Vec<String>, n_reduce: u32, config: CoordinatorConfig) -> Result<Self> {
        if n_reduce == 0 {
            return Err(Error::Config("n_reduce must be at least 1".into()));
        }
        config.validate()?;

        info!(
            "starting job with {} map tasks and {} reduce tasks in {}",
            inputs.len(),
            n_reduce,
            config.work_dir.display()
        );
        let store = TaskStore::new(inputs, n_reduce);
        let supply = store.supply();
        Ok(Self {
            inner: Arc::new(Inner {
                store: Mutex::new(store),
                supply,
                layout: OutputLayout::new(config.work_dir.clone()),
                config,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, TaskStore> {
        self.inner.store.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn layout(&self) -> &OutputLayout {
        &self.inner.layout
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.config
    }

    /// Accept the caller's previous task, if it reported one, then hand out
    /// the next task, waiting until one is available.
    ///
    /// Returns [`Assignment::Finished`] once the job is done, including to
    /// callers that were already waiting when the last task completed.
    pub async fn apply_for_task(&self, request: TaskRequest) -> Result<Assignment> {
        let TaskRequest { worker_id, last } = request;
        if !is_valid_worker_id(&worker_id) {
            return Err(Error::Protocol(format!(
                "worker id {worker_id:?} may only contain ASCII letters, digits, '-' and '_'"
            )));
        }
        if let Some(last) = last {
            // Publishing renames files under the store lock, so it runs on the
            // blocking pool rather than stalling other requests on this thread.
            let this = self.clone();
            let worker = worker_id.clone();
            tokio::task::spawn_blocking(move || this.accept(&worker, last)).await?;
        }

        loop {
            let permit = match self.inner.supply.acquire().await {
                Ok(permit) => permit,
                Err(_closed) => {
                    debug!("telling worker {} the job is done", worker_id);
                    return Ok(Assignment::Finished);
                }
            };
            // The permit stands for the queue entry popped below.
            permit.forget();

            let deadline = Instant::now() + self.inner.config.lease;
            let assigned = self.lock().assign_next(&worker_id, deadline);
            if let Some(spec) = assigned {
                return Ok(Assignment::Task(spec));
            }
        }
    }

    fn accept(&self, worker: &str, id: TaskId) {
        let layout = &self.inner.layout;
        let report = self
            .lock()
            .report(worker, id, |id, n_reduce| layout.publish(worker, id, n_reduce));

        match report {
            Report::Accepted {
                advanced_to: Some(stage),
            } => info!("job advanced to the {} stage", stage),
            Report::Accepted { advanced_to: None } | Report::Ignored => {}
            Report::PublishFailed(e) => {
                error!("could not accept {} from worker {}: {}", id, worker, e)
            }
        }
    }

    /// Run one lease-expiry pass at `now`. Returns the number of reclaimed tasks.
    pub fn sweep(&self, now: Instant) -> usize {
        self.lock().expire(now).len()
    }

    /// Sweep expired leases every `sweep_interval` until the job is done.
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let mut ticker = time::interval(this.inner.config.sweep_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if this.done() {
                    debug!("job done, stopping lease sweeper");
                    break;
                }
                this.sweep(Instant::now());
            }
        })
    }

    pub fn done(&self) -> bool {
        self.lock().stage() == Stage::Done
    }

    pub fn status(&self) -> JobStatus {
        self.lock().status()
    }

    /// Resolve once [`Coordinator::done`] turns true, checking every `poll`.
    pub async fn wait_done(&self, poll: Duration) {
        while !self.done() {
            time::sleep(poll).await;
        }
    }
}

#[tonic::async_trait]
impl TaskSource for Coordinator {
    async fn apply_for_task(&mut self, request: TaskRequest) -> Result<Assignment> {
        Coordinator::apply_for_task(self, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskSpec;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    const LEASE: Duration = Duration::from_secs(1);
    const SWEEP: Duration = Duration::from_millis(100);

    fn coordinator(dir: &Path, inputs: usize, n_reduce: u32) -> Coordinator {
        let config = CoordinatorConfig::default()
            .with_work_dir(dir)
            .with_lease(LEASE)
            .with_sweep_interval(SWEEP);
        let inputs = (0..inputs).map(|i| format!("in-{i}")).collect();
        Coordinator::new(inputs, n_reduce, config).unwrap()
    }

    fn request(worker: &str, last: Option<TaskId>) -> TaskRequest {
        TaskRequest {
            worker_id: worker.to_string(),
            last,
        }
    }

    fn expect_task(assignment: Assignment) -> TaskSpec {
        match assignment {
            Assignment::Task(spec) => spec,
            Assignment::Finished => panic!("expected a task, job already finished"),
        }
    }

    /// Leave the private files a worker would write for `spec`.
    fn fake_outputs(layout: &OutputLayout, worker: &str, spec: &TaskSpec) {
        for (private, _) in layout.commit_pairs(worker, spec.id, spec.n_reduce) {
            fs::write(private, spec.id.to_string()).unwrap();
        }
    }

    #[test]
    fn zero_reduce_tasks_is_a_config_error() {
        let result = Coordinator::new(vec!["a".into()], 0, CoordinatorConfig::default());
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn runs_both_stages_to_completion() {
        let dir = TempDir::new().unwrap();
        let coordinator = coordinator(dir.path(), 2, 2);
        let layout = coordinator.layout().clone();

        let mut last = None;
        let mut seen = Vec::new();
        loop {
            match coordinator.apply_for_task(request("w1", last)).await.unwrap() {
                Assignment::Task(spec) => {
                    fake_outputs(&layout, "w1", &spec);
                    seen.push(spec.id);
                    last = Some(spec.id);
                }
                Assignment::Finished => break,
            }
        }

        assert_eq!(
            seen,
            vec![
                TaskId::map(0),
                TaskId::map(1),
                TaskId::reduce(0),
                TaskId::reduce(1)
            ]
        );
        assert!(coordinator.done());
        for m in 0..2 {
            for r in 0..2 {
                assert!(layout.map_output(m, r).exists());
            }
        }
        assert_eq!(fs::read_to_string(layout.reduce_output(1)).unwrap(), "reduce-1");
    }

    #[tokio::test]
    async fn job_without_inputs_starts_with_reduce_tasks() {
        let dir = TempDir::new().unwrap();
        let coordinator = coordinator(dir.path(), 0, 1);

        let spec = expect_task(coordinator.apply_for_task(request("w1", None)).await.unwrap());
        assert_eq!(spec.id, TaskId::reduce(0));
        assert_eq!(spec.n_map, 0);
        assert_eq!(coordinator.status().stage, Stage::Reduce);
    }

    #[tokio::test]
    async fn worker_id_that_escapes_the_work_dir_is_rejected() {
        let dir = TempDir::new().unwrap();
        let coordinator = coordinator(dir.path(), 1, 1);

        let err = coordinator
            .apply_for_task(request("../w1", Some(TaskId::map(0))))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Protocol(_)), "{err}");
        // The request was refused before any task left the queue.
        assert_eq!(coordinator.status().pending, 1);
    }

    #[tokio::test]
    async fn finishing_the_job_wakes_waiting_workers() {
        let dir = TempDir::new().unwrap();
        let coordinator = coordinator(dir.path(), 0, 1);
        let layout = coordinator.layout().clone();

        let spec = expect_task(coordinator.apply_for_task(request("w1", None)).await.unwrap());
        let waiter = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.apply_for_task(request("w2", None)).await })
        };
        tokio::task::yield_now().await;

        fake_outputs(&layout, "w1", &spec);
        let reply = coordinator
            .apply_for_task(request("w1", Some(spec.id)))
            .await
            .unwrap();
        assert_eq!(reply, Assignment::Finished);
        assert_eq!(waiter.await.unwrap().unwrap(), Assignment::Finished);
    }

    #[tokio::test]
    async fn failed_publish_makes_the_task_available_again() {
        let dir = TempDir::new().unwrap();
        let coordinator = coordinator(dir.path(), 1, 2);

        let spec = expect_task(coordinator.apply_for_task(request("w1", None)).await.unwrap());
        // No private files were written, so the rename fails.
        let again = expect_task(
            coordinator
                .apply_for_task(request("w1", Some(spec.id)))
                .await
                .unwrap(),
        );
        assert_eq!(again.id, TaskId::map(0));
        assert_eq!(coordinator.status().stage, Stage::Map);
        assert!(!coordinator.layout().map_output(0, 0).exists());
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_reassigns_expired_lease() {
        let dir = TempDir::new().unwrap();
        let coordinator = coordinator(dir.path(), 1, 1);
        let sweeper = coordinator.spawn_sweeper();

        let first = expect_task(coordinator.apply_for_task(request("crashed", None)).await.unwrap());
        let start = Instant::now();
        let second = expect_task(
            coordinator
                .apply_for_task(request("survivor", None))
                .await
                .unwrap(),
        );

        assert_eq!(first.id, second.id);
        let waited = start.elapsed();
        assert!(waited >= LEASE, "reassigned after {waited:?}");
        assert!(waited <= LEASE + 2 * SWEEP, "reassigned after {waited:?}");
        sweeper.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn late_report_after_reassignment_is_ignored() {
        let dir = TempDir::new().unwrap();
        let coordinator = coordinator(dir.path(), 1, 1);
        let layout = coordinator.layout().clone();

        let slow = expect_task(coordinator.apply_for_task(request("slow", None)).await.unwrap());
        time::advance(LEASE + SWEEP).await;
        assert_eq!(coordinator.sweep(Instant::now()), 1);

        let fast = expect_task(coordinator.apply_for_task(request("fast", None)).await.unwrap());
        fake_outputs(&layout, "slow", &slow);
        fake_outputs(&layout, "fast", &fast);

        // The slow worker's report must not publish or advance anything, and
        // with nothing left to hand out its request just waits.
        let late = time::timeout(
            SWEEP,
            coordinator.apply_for_task(request("slow", Some(slow.id))),
        )
        .await;
        assert!(late.is_err());
        assert_eq!(coordinator.status().stage, Stage::Map);
        assert!(layout.tmp_map_output("slow", 0, 0).exists());

        let next = expect_task(
            coordinator
                .apply_for_task(request("fast", Some(fast.id)))
                .await
                .unwrap(),
        );
        assert_eq!(next.id, TaskId::reduce(0));
        assert!(!layout.tmp_map_output("fast", 0, 0).exists());
        assert!(layout.tmp_map_output("slow", 0, 0).exists());
    }

    #[tokio::test(start_paused = true)]
    async fn wait_done_resolves_after_last_report() {
        let dir = TempDir::new().unwrap();
        let coordinator = coordinator(dir.path(), 0, 1);
        let layout = coordinator.layout().clone();
        let spec = expect_task(coordinator.apply_for_task(request("w1", None)).await.unwrap());

        let watcher = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.wait_done(Duration::from_secs(1)).await })
        };
        fake_outputs(&layout, "w1", &spec);
        coordinator
            .apply_for_task(request("w1", Some(spec.id)))
            .await
            .unwrap();

        watcher.await.unwrap();
        assert!(coordinator.status().done);
    }
}
