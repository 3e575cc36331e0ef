use crate::destination::Destination;
use crate::error::Result;
use crate::record::Batch;
use async_trait::async_trait;

/// A provisioned destination the host can flush batches into.
///
/// Implementations are held behind an `Arc` in the instance registry and
/// may be called from many threads at once. The host-facing layer drives
/// them synchronously, one call per host event.
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Persist one batch.
    ///
    /// **Returns**
    /// - `Ok(n)` with the number of rows written.
    /// - `Err(SinkError::EmptyBatch)` if `batch` has no records; no I/O is
    ///   performed.
    /// - `Err(..)` with a transport error if the destination rejected the
    ///   write. Nothing from the batch is kept and the host is expected to
    ///   re-send it.
    async fn write(&self, batch: &Batch) -> Result<u64>;

    /// Release pooled connections. Writes after `close` fail with a
    /// transport error.
    ///
    /// Default implementation is a no-op.
    async fn close(&self) {}

    /// Where this sink writes to.
    fn destination(&self) -> &Destination;
}
