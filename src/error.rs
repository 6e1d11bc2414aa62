//! Error types shared by the coordinator, the worker runtime and the CLI.

use std::path::PathBuf;

use thiserror::Error;

use crate::task::TaskId;

/// Result type for library operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Invalid job or process configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A local file could not be read or written.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Renaming a private output to its final name failed.
    #[error("failed to publish {} as {}: {source}", from.display(), to.display())]
    Publish {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An intermediate file is truncated or otherwise malformed.
    #[error("corrupt intermediate file {} at byte {offset}", path.display())]
    Corrupt { path: PathBuf, offset: usize },

    /// The user map or reduce function failed.
    #[error("{task} failed in user code: {source:#}")]
    Workload {
        task: TaskId,
        #[source]
        source: anyhow::Error,
    },

    /// The coordinator replied with something the protocol does not allow.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The coordinator cannot be reached (it exits once the job is done).
    #[error("coordinator unavailable: {0}")]
    Unavailable(String),

    /// Any other RPC failure.
    #[error("RPC error: {0}")]
    Rpc(#[from] tonic::Status),

    /// The gRPC server failed to bind or crashed.
    #[error("transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// A blocking execution task panicked or was cancelled.
    #[error("task execution aborted: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl Error {
    /// Wrap an [`std::io::Error`] with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}
