use crate::destination::Destination;
use crate::error::{Operation, Result, SinkError};
use crate::record::Batch;
use crate::sink::LogSink;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// A sink that accepts batches and drops them.
///
/// Useful for dry runs of a host configuration without a database, and for
/// tests of the host-facing layer. It keeps the same contract as a real
/// sink: empty batches are rejected and writes after `close` fail.
#[derive(Debug)]
pub struct NoopSink {
    destination: Destination,
    records: AtomicU64,
    closed: AtomicBool,
}

impl NoopSink {
    pub fn new(destination: Destination) -> Self {
        Self {
            destination,
            records: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Records accepted so far.
    pub fn written(&self) -> u64 {
        self.records.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[async_trait]
impl LogSink for NoopSink {
    async fn write(&self, batch: &Batch) -> Result<u64> {
        if batch.is_empty() {
            return Err(SinkError::EmptyBatch {
                tag: batch.tag().to_string(),
            });
        }
        if self.is_closed() {
            return Err(SinkError::Transport {
                op: Operation::Acquire,
                source: sqlx::Error::PoolClosed,
            });
        }
        let n = batch.len() as u64;
        self.records.fetch_add(n, Ordering::Relaxed);
        Ok(n)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn destination(&self) -> &Destination {
        &self.destination
    }
}
