use std::fmt;
use std::future::Future;
use std::time::Duration;

use crate::registry::InstanceId;

/// Step of a provisioning or write transaction an error occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Begin,
    SchemaCheck,
    CreateSchema,
    TableCheck,
    CreateTable,
    ColumnCheck,
    Commit,
    Acquire,
    Insert,
    Provision,
    Write,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Begin => "begin transaction",
            Operation::SchemaCheck => "schema check",
            Operation::CreateSchema => "create schema",
            Operation::TableCheck => "table check",
            Operation::CreateTable => "create table",
            Operation::ColumnCheck => "column check",
            Operation::Commit => "commit",
            Operation::Acquire => "acquire connection",
            Operation::Insert => "insert",
            Operation::Provision => "provision",
            Operation::Write => "write",
        };
        f.write_str(name)
    }
}

/// Error type shared by every sink operation.
#[derive(thiserror::Error, Debug)]
pub enum SinkError {
    /// The destination could not be reached while building the pool.
    #[error("unable to create connection pool: {0}")]
    PoolCreation(#[source] sqlx::Error),

    /// A same-named table exists with a shape other than `(tag, time, data)`.
    #[error("table {destination} already exists with an incompatible shape: {reason}")]
    ProvisioningConflict { destination: String, reason: String },

    #[error("{op} failed: {source}")]
    Transport {
        op: Operation,
        #[source]
        source: sqlx::Error,
    },

    #[error("{op} did not complete within {timeout:?}")]
    Timeout { op: Operation, timeout: Duration },

    #[error("batch for tag {tag:?} has no decodable records")]
    EmptyBatch { tag: String },

    #[error("unknown sink instance {0}")]
    UnknownInstance(InstanceId),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("unable to start async runtime: {0}")]
    Runtime(#[from] std::io::Error),

    #[error("unable to install logger: {0}")]
    Logging(String),
}

impl SinkError {
    pub fn config(msg: impl Into<String>) -> Self {
        SinkError::Config(msg.into())
    }

    /// Whether re-sending the same call later may succeed.
    ///
    /// Delivery failures and empty batches are handed back to the host's
    /// retry scheduler; everything else makes the instance or the call
    /// unusable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SinkError::Transport { .. } | SinkError::Timeout { .. } | SinkError::EmptyBatch { .. }
        )
    }
}

pub type Result<T, E = SinkError> = std::result::Result<T, E>;

/// Attach the [`Operation`] a driver error happened in.
pub trait OperationContext<T> {
    fn during(self, op: Operation) -> Result<T>;
}

impl<T> OperationContext<T> for std::result::Result<T, sqlx::Error> {
    fn during(self, op: Operation) -> Result<T> {
        self.map_err(|source| SinkError::Transport { op, source })
    }
}

/// Run `fut` under a deadline.
///
/// When the deadline fires the future is dropped, which rolls back any open
/// transaction and hands its connection back to the pool.
pub async fn within<T, F>(op: Operation, timeout: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(res) => res,
        Err(_) => Err(SinkError::Timeout { op, timeout }),
    }
}
