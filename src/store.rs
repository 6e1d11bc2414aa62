//! The coordinator's authoritative task table and supply queue.
//!
//! `TaskStore` is plain data with synchronous methods. The coordinator keeps
//! it behind a single mutex, so the table, the stage and the supply queue
//! always change together in one step.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::task::{JobStatus, Stage, Task, TaskId, TaskSpec, TaskState, WorkerId};
use crate::Error;

/// Outcome of a worker's completion report.
#[derive(Debug)]
pub enum Report {
    /// The report matched the current assignment and the output is published.
    Accepted {
        /// Set when this completion drained the stage.
        advanced_to: Option<Stage>,
    },
    /// Late or duplicate report: the task is gone, pending, or held by someone else.
    Ignored,
    /// The report matched but publishing failed; the task went back to the queue.
    PublishFailed(Error),
}

#[derive(Debug)]
pub struct TaskStore {
    stage: Stage,
    n_map: u32,
    n_reduce: u32,
    tasks: HashMap<TaskId, Task>,
    /// Ids of pending tasks, in hand-out order.
    queue: VecDeque<TaskId>,
    /// One permit per queued id. Closed once the job is done.
    supply: Arc<Semaphore>,
}

impl TaskStore {
    /// Create the store in the Map stage with one pending task per input.
    ///
    /// A job without inputs has nothing to map and starts in the Reduce stage.
    pub fn new(inputs: Vec<String>, n_reduce: u32) -> Self {
        let mut store = Self {
            stage: Stage::Map,
            n_map: inputs.len() as u32,
            n_reduce,
            tasks: HashMap::new(),
            queue: VecDeque::new(),
            supply: Arc::new(Semaphore::new(0)),
        };
        for (index, input) in inputs.into_iter().enumerate() {
            store.insert_pending(Task::pending(TaskId::map(index as u32), Some(input)));
        }
        if store.tasks.is_empty() {
            store.advance();
        }
        store
    }

    /// Handle to the supply semaphore, for waiting outside the lock.
    pub fn supply(&self) -> Arc<Semaphore> {
        Arc::clone(&self.supply)
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn n_map(&self) -> u32 {
        self.n_map
    }

    pub fn n_reduce(&self) -> u32 {
        self.n_reduce
    }

    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(&id)
    }

    /// Number of ids waiting in the supply queue.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    fn insert_pending(&mut self, task: Task) {
        let id = task.id;
        self.tasks.insert(id, task);
        self.enqueue(id);
    }

    fn enqueue(&mut self, id: TaskId) {
        self.queue.push_back(id);
        self.supply.add_permits(1);
    }

    /// Process `worker`'s completion report for `id`.
    ///
    /// Only a record that is still assigned to `worker` is honoured. For such
    /// a record `publish` is invoked to commit the worker's private outputs;
    /// if it fails the task is demoted to pending and re-queued.
    pub fn report<F>(&mut self, worker: &str, id: TaskId, publish: F) -> Report
    where
        F: FnOnce(TaskId, u32) -> crate::Result<()>,
    {
        let n_reduce = self.n_reduce;
        let task = match self.tasks.get_mut(&id) {
            Some(task) if task.is_held_by(worker) => task,
            Some(task) => {
                debug!(
                    "ignoring report of {} from worker {} (state {:?}, holder {:?})",
                    id, worker, task.state, task.worker
                );
                return Report::Ignored;
            }
            None => {
                debug!("ignoring report of unknown {} from worker {}", id, worker);
                return Report::Ignored;
            }
        };

        if let Err(e) = publish(id, n_reduce) {
            task.state = TaskState::Pending;
            task.worker = None;
            task.deadline = None;
            self.enqueue(id);
            return Report::PublishFailed(e);
        }

        info!("marked {} as finished on worker {}", id, worker);
        task.state = TaskState::Completed;
        task.deadline = None;

        let drained = self
            .tasks
            .values()
            .all(|task| task.state == TaskState::Completed);
        let advanced_to = drained.then(|| self.advance());
        Report::Accepted { advanced_to }
    }

    /// Move to the next stage. Must only run once every task is completed.
    fn advance(&mut self) -> Stage {
        self.tasks.clear();
        match self.stage {
            Stage::Map => {
                info!(
                    "all {} map tasks finished, moving to the reduce stage",
                    self.n_map
                );
                self.stage = Stage::Reduce;
                for index in 0..self.n_reduce {
                    self.insert_pending(Task::pending(TaskId::reduce(index), None));
                }
            }
            Stage::Reduce => {
                info!("all {} reduce tasks finished, job done", self.n_reduce);
                self.stage = Stage::Done;
                self.queue.clear();
                self.supply.close();
            }
            Stage::Done => {}
        }
        self.stage
    }

    /// Hand the next queued task to `worker` with the given lease deadline.
    ///
    /// The caller must have consumed one supply permit for the id popped
    /// here. Returns `None` when the popped id no longer names a pending task.
    pub fn assign_next(&mut self, worker: &str, deadline: Instant) -> Option<TaskSpec> {
        let id = self.queue.pop_front()?;
        let (n_map, n_reduce) = (self.n_map, self.n_reduce);
        let task = match self.tasks.get_mut(&id) {
            Some(task) if task.state == TaskState::Pending => task,
            _ => {
                warn!("dropping stale queue entry {}", id);
                return None;
            }
        };

        info!("assigning {} to worker {}", id, worker);
        task.state = TaskState::Assigned;
        task.worker = Some(worker.to_string());
        task.deadline = Some(deadline);
        Some(TaskSpec {
            id,
            input: task.input.clone(),
            n_map,
            n_reduce,
        })
    }

    /// Demote every assigned task whose lease expired before `now` and put
    /// it back on the queue. Returns the reclaimed tasks and their last holder.
    pub fn expire(&mut self, now: Instant) -> Vec<(TaskId, WorkerId)> {
        let mut expired: Vec<(TaskId, WorkerId)> = self
            .tasks
            .values_mut()
            .filter(|task| {
                task.state == TaskState::Assigned
                    && task.deadline.map_or(false, |deadline| now > deadline)
            })
            .filter_map(|task| {
                task.state = TaskState::Pending;
                task.deadline = None;
                task.worker.take().map(|worker| (task.id, worker))
            })
            .collect();
        // Re-queue in index order so reassignment does not depend on hashing.
        expired.sort_by_key(|(id, _)| *id);

        for (id, worker) in &expired {
            warn!(
                "lease of {} on worker {} expired, re-queueing for another worker",
                id, worker
            );
            self.enqueue(*id);
        }
        expired
    }

    pub fn status(&self) -> JobStatus {
        let count = |state: TaskState| {
            self.tasks
                .values()
                .filter(|task| task.state == state)
                .count() as u32
        };
        JobStatus {
            stage: self.stage,
            done: self.stage == Stage::Done,
            pending: count(TaskState::Pending),
            assigned: count(TaskState::Assigned),
            completed: count(TaskState::Completed),
            n_map: self.n_map,
            n_reduce: self.n_reduce,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn inputs(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("input-{i}.txt")).collect()
    }

    /// Consume a supply permit the way the coordinator does, then assign.
    fn take(store: &mut TaskStore, worker: &str, deadline: Instant) -> Option<TaskSpec> {
        store.supply().try_acquire().ok()?.forget();
        store.assign_next(worker, deadline)
    }

    fn ok(_: TaskId, _: u32) -> crate::Result<()> {
        Ok(())
    }

    #[test]
    fn starts_in_map_stage_with_all_map_tasks_queued() {
        let store = TaskStore::new(inputs(3), 2);
        assert_eq!(store.stage(), Stage::Map);
        assert_eq!(store.queued(), 3);
        assert_eq!(store.supply().available_permits(), 3);
        assert_eq!(store.status().pending, 3);
    }

    #[test]
    fn assignment_carries_input_and_counts() {
        let mut store = TaskStore::new(inputs(2), 4);
        let deadline = Instant::now() + Duration::from_secs(10);
        let spec = take(&mut store, "w1", deadline).unwrap();

        assert_eq!(spec.id, TaskId::map(0));
        assert_eq!(spec.input.as_deref(), Some("input-0.txt"));
        assert_eq!((spec.n_map, spec.n_reduce), (2, 4));
        let task = store.task(TaskId::map(0)).unwrap();
        assert!(task.is_held_by("w1"));
        assert_eq!(task.deadline, Some(deadline));
    }

    #[test]
    fn map_stage_drains_into_reduce_stage() {
        let mut store = TaskStore::new(inputs(2), 3);
        let deadline = Instant::now() + Duration::from_secs(10);
        take(&mut store, "w1", deadline).unwrap();
        take(&mut store, "w2", deadline).unwrap();

        let first = store.report("w1", TaskId::map(0), ok);
        assert!(matches!(first, Report::Accepted { advanced_to: None }));
        assert_eq!(store.status().completed, 1);

        let second = store.report("w2", TaskId::map(1), ok);
        assert!(matches!(
            second,
            Report::Accepted {
                advanced_to: Some(Stage::Reduce)
            }
        ));
        assert_eq!(store.stage(), Stage::Reduce);
        assert!(store.task(TaskId::map(0)).is_none());
        assert_eq!(store.queued(), 3);
        assert_eq!(store.supply().available_permits(), 3);
    }

    #[test]
    fn reduce_stage_drains_into_done_and_closes_supply() {
        let mut store = TaskStore::new(Vec::new(), 1);
        assert_eq!(store.stage(), Stage::Reduce);
        let spec = take(&mut store, "w1", Instant::now()).unwrap();
        assert_eq!(spec.id, TaskId::reduce(0));
        assert_eq!(spec.n_map, 0);

        let report = store.report("w1", TaskId::reduce(0), ok);
        assert!(matches!(
            report,
            Report::Accepted {
                advanced_to: Some(Stage::Done)
            }
        ));
        assert!(store.status().done);
        assert!(store.supply().is_closed());
    }

    #[test]
    fn mismatched_or_unknown_reports_are_ignored() {
        let mut store = TaskStore::new(inputs(1), 1);
        take(&mut store, "w1", Instant::now() + Duration::from_secs(10)).unwrap();
        let mut published = false;

        let report = store.report("intruder", TaskId::map(0), |_, _| {
            published = true;
            Ok(())
        });
        assert!(matches!(report, Report::Ignored));
        assert!(matches!(
            store.report("w1", TaskId::reduce(0), ok),
            Report::Ignored
        ));
        assert!(!published);
        assert!(store.task(TaskId::map(0)).unwrap().is_held_by("w1"));
    }

    #[test]
    fn duplicate_report_after_acceptance_is_ignored() {
        let mut store = TaskStore::new(inputs(2), 1);
        let deadline = Instant::now() + Duration::from_secs(10);
        take(&mut store, "w1", deadline).unwrap();
        assert!(matches!(
            store.report("w1", TaskId::map(0), ok),
            Report::Accepted { .. }
        ));
        assert!(matches!(
            store.report("w1", TaskId::map(0), ok),
            Report::Ignored
        ));
        assert_eq!(store.status().completed, 1);
    }

    #[test]
    fn expired_lease_is_requeued_and_old_holder_loses_claim() {
        let mut store = TaskStore::new(inputs(1), 1);
        let start = Instant::now();
        take(&mut store, "slow", start + Duration::from_secs(10)).unwrap();

        assert!(store.expire(start + Duration::from_secs(5)).is_empty());
        let expired = store.expire(start + Duration::from_secs(11));
        assert_eq!(expired, vec![(TaskId::map(0), "slow".to_string())]);
        assert_eq!(store.status().pending, 1);
        assert_eq!(store.supply().available_permits(), 1);

        // The slow worker finishing late must not count.
        assert!(matches!(
            store.report("slow", TaskId::map(0), ok),
            Report::Ignored
        ));

        let spec = take(&mut store, "fast", start + Duration::from_secs(30)).unwrap();
        assert_eq!(spec.id, TaskId::map(0));
        assert!(matches!(
            store.report("fast", TaskId::map(0), ok),
            Report::Accepted {
                advanced_to: Some(Stage::Reduce)
            }
        ));
    }

    #[test]
    fn failed_publish_requeues_the_task() {
        let mut store = TaskStore::new(inputs(1), 1);
        take(&mut store, "w1", Instant::now() + Duration::from_secs(10)).unwrap();

        let report = store.report("w1", TaskId::map(0), |_, _| {
            Err(Error::Config("disk gone".into()))
        });
        assert!(matches!(report, Report::PublishFailed(_)));
        assert_eq!(store.stage(), Stage::Map);
        let task = store.task(TaskId::map(0)).unwrap();
        assert_eq!(task.state, TaskState::Pending);
        assert!(task.worker.is_none());
        assert_eq!(store.queued(), 1);
    }

    #[test]
    fn stale_queue_entry_is_skipped() {
        let mut store = TaskStore::new(inputs(1), 1);
        store.queue.push_back(TaskId::map(7));
        store.supply.add_permits(1);

        assert!(take(&mut store, "w1", Instant::now()).is_some());
        assert!(take(&mut store, "w1", Instant::now()).is_none());
    }
}
