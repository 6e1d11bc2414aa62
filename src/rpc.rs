//! gRPC transport between workers, the control tool and the coordinator.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use tonic::transport::{Channel, Server};
use tonic::{Code, Request, Response, Status};
use tracing::{info, warn};

use crate::coordinator::Coordinator;
use crate::task::{Assignment, JobStatus, TaskId, TaskKind, TaskRequest, TaskSpec};
use crate::worker::TaskSource;
use crate::{Error, Result};

pub mod proto {
    tonic::include_proto!("mapreduce");
}

use proto::coordinator_client::CoordinatorClient;
use proto::coordinator_server::{self, CoordinatorServer};
use proto::{ApplyForTaskReply, ApplyForTaskRequest, Empty, JobStatusReply, TaskType};

/// Pause between attempts to reach a coordinator that is not up yet.
const CONNECT_BACKOFF: Duration = Duration::from_millis(500);

impl From<TaskKind> for TaskType {
    fn from(kind: TaskKind) -> Self {
        match kind {
            TaskKind::Map => TaskType::Map,
            TaskKind::Reduce => TaskType::Reduce,
        }
    }
}

fn task_kind(task_type: i32) -> Option<TaskKind> {
    match TaskType::try_from(task_type) {
        Ok(TaskType::Map) => Some(TaskKind::Map),
        Ok(TaskType::Reduce) => Some(TaskKind::Reduce),
        Ok(TaskType::Unspecified) | Err(_) => None,
    }
}

impl From<Assignment> for ApplyForTaskReply {
    fn from(assignment: Assignment) -> Self {
        match assignment {
            Assignment::Finished => ApplyForTaskReply {
                done: true,
                ..Default::default()
            },
            Assignment::Task(spec) => ApplyForTaskReply {
                done: false,
                task_type: TaskType::from(spec.id.kind) as i32,
                task_index: spec.id.index,
                map_input_file: spec.input.unwrap_or_default(),
                n_map: spec.n_map,
                n_reduce: spec.n_reduce,
            },
        }
    }
}

impl TryFrom<ApplyForTaskReply> for Assignment {
    type Error = Error;

    fn try_from(reply: ApplyForTaskReply) -> Result<Self> {
        if reply.done {
            return Ok(Assignment::Finished);
        }
        let kind = task_kind(reply.task_type)
            .ok_or_else(|| Error::Protocol(format!("unknown task type {}", reply.task_type)))?;
        if reply.n_reduce == 0 {
            return Err(Error::Protocol(format!(
                "{} task {}: n_reduce must be positive",
                kind, reply.task_index
            )));
        }
        let input = match kind {
            TaskKind::Map if reply.map_input_file.is_empty() => {
                return Err(Error::Protocol(format!(
                    "map task {} has no input file",
                    reply.task_index
                )))
            }
            TaskKind::Map => Some(reply.map_input_file),
            TaskKind::Reduce => None,
        };
        Ok(Assignment::Task(TaskSpec {
            id: TaskId {
                kind,
                index: reply.task_index,
            },
            input,
            n_map: reply.n_map,
            n_reduce: reply.n_reduce,
        }))
    }
}

impl From<JobStatus> for JobStatusReply {
    fn from(status: JobStatus) -> Self {
        JobStatusReply {
            stage: status.stage.to_string(),
            done: status.done,
            pending: status.pending,
            assigned: status.assigned,
            completed: status.completed,
            n_map: status.n_map,
            n_reduce: status.n_reduce,
        }
    }
}

impl TryFrom<JobStatusReply> for JobStatus {
    type Error = Error;

    fn try_from(reply: JobStatusReply) -> Result<Self> {
        Ok(JobStatus {
            stage: reply.stage.parse()?,
            done: reply.done,
            pending: reply.pending,
            assigned: reply.assigned,
            completed: reply.completed,
            n_map: reply.n_map,
            n_reduce: reply.n_reduce,
        })
    }
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        match err {
            Error::Rpc(status) => status,
            Error::Config(_) | Error::Protocol(_) => Status::invalid_argument(err.to_string()),
            Error::Unavailable(_) => Status::unavailable(err.to_string()),
            _ => Status::internal(err.to_string()),
        }
    }
}

/// Serves a [`Coordinator`] over gRPC.
pub struct CoordinatorService {
    coordinator: Coordinator,
}

impl CoordinatorService {
    pub fn new(coordinator: Coordinator) -> Self {
        Self { coordinator }
    }
}

#[tonic::async_trait]
impl coordinator_server::Coordinator for CoordinatorService {
    async fn apply_for_task(
        &self,
        request: Request<ApplyForTaskRequest>,
    ) -> std::result::Result<Response<ApplyForTaskReply>, Status> {
        let ApplyForTaskRequest {
            worker_id,
            last_task_type,
            last_task_index,
        } = request.into_inner();
        let last = match TaskType::try_from(last_task_type) {
            Ok(TaskType::Unspecified) => None,
            _ => {
                let kind = task_kind(last_task_type).ok_or_else(|| {
                    Status::invalid_argument(format!("unknown task type {last_task_type}"))
                })?;
                Some(TaskId {
                    kind,
                    index: last_task_index,
                })
            }
        };

        let assignment = self
            .coordinator
            .apply_for_task(TaskRequest { worker_id, last })
            .await?;
        Ok(Response::new(assignment.into()))
    }

    async fn job_status(
        &self,
        _request: Request<Empty>,
    ) -> std::result::Result<Response<JobStatusReply>, Status> {
        Ok(Response::new(self.coordinator.status().into()))
    }
}

/// Serve `coordinator` on `addr` until `shutdown` resolves.
pub async fn serve<F>(coordinator: Coordinator, addr: SocketAddr, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send,
{
    info!("coordinator listening on {}", addr);
    Server::builder()
        .add_service(CoordinatorServer::new(CoordinatorService::new(coordinator)))
        .serve_with_shutdown(addr, shutdown)
        .await?;
    Ok(())
}

fn endpoint(addr: &str) -> String {
    if addr.starts_with("http://") || addr.starts_with("https://") {
        addr.to_string()
    } else {
        format!("http://{addr}")
    }
}

/// An unreachable coordinator is reported separately: it exits once the job
/// is done, so workers treat it as the end of the job.
fn from_status(status: Status) -> Error {
    match status.code() {
        Code::Unavailable | Code::Cancelled => Error::Unavailable(status.message().to_string()),
        _ => Error::Rpc(status),
    }
}

/// A [`TaskSource`] backed by a remote coordinator.
#[derive(Debug, Clone)]
pub struct GrpcTaskSource {
    client: CoordinatorClient<Channel>,
}

impl GrpcTaskSource {
    /// Connect to the coordinator at `addr` (`host:port` or a URL), retrying
    /// up to `retries` more times while it is not reachable yet.
    pub async fn connect(addr: &str, retries: u32) -> Result<Self> {
        let endpoint = endpoint(addr);
        let mut attempt = 0;
        loop {
            match CoordinatorClient::connect(endpoint.clone()).await {
                Ok(client) => return Ok(Self { client }),
                Err(e) if attempt < retries => {
                    attempt += 1;
                    warn!(
                        "coordinator at {} not reachable ({}), retry {}/{}",
                        endpoint, e, attempt, retries
                    );
                    tokio::time::sleep(CONNECT_BACKOFF).await;
                }
                Err(e) => return Err(Error::Unavailable(format!("{endpoint}: {e}"))),
            }
        }
    }

    pub async fn job_status(&mut self) -> Result<JobStatus> {
        let reply = self
            .client
            .job_status(Empty {})
            .await
            .map_err(from_status)?;
        reply.into_inner().try_into()
    }
}

#[tonic::async_trait]
impl TaskSource for GrpcTaskSource {
    async fn apply_for_task(&mut self, request: TaskRequest) -> Result<Assignment> {
        let (last_task_type, last_task_index) = match request.last {
            Some(id) => (TaskType::from(id.kind), id.index),
            None => (TaskType::Unspecified, 0),
        };
        let reply = self
            .client
            .apply_for_task(ApplyForTaskRequest {
                worker_id: request.worker_id,
                last_task_type: last_task_type as i32,
                last_task_index,
            })
            .await
            .map_err(from_status)?;
        reply.into_inner().try_into()
    }
}
