use chrono::{NaiveDateTime, Utc};
use sqlx::PgPool;
use tracing::trace;

use crate::destination::Destination;
use crate::error::{Operation, OperationContext, Result, SinkError};
use crate::record::Batch;

/// Insert every record of `batch` into `dest` as one statement.
///
/// Rows get the batch tag, the wall-clock time of this call (not the
/// record's own timestamp) and the record payload as `jsonb`. Payloads are
/// sent as their original JSON text and cast server-side. Either all
/// rows land or the call fails with a transport error and nothing does; the
/// caller re-sends the whole batch, so rows may be duplicated across
/// retries. An empty batch fails with [`SinkError::EmptyBatch`] before any
/// I/O. The pooled connection is released when this returns.
pub async fn write(pool: &PgPool, dest: &Destination, batch: &Batch) -> Result<u64> {
    if batch.is_empty() {
        return Err(SinkError::EmptyBatch {
            tag: batch.tag().to_string(),
        });
    }

    let mut conn = pool.acquire().await.during(Operation::Acquire)?;

    let mut times: Vec<NaiveDateTime> = Vec::with_capacity(batch.len());
    let mut payloads: Vec<&str> = Vec::with_capacity(batch.len());
    for record in batch.records() {
        times.push(Utc::now().naive_utc());
        payloads.push(record.payload_text());
    }

    let done = sqlx::query(&dest.insert_sql())
        .bind(batch.tag())
        .bind(times)
        .bind(payloads)
        .execute(&mut *conn)
        .await
        .during(Operation::Insert)?;

    trace!(destination = %dest, tag = batch.tag(), rows = done.rows_affected(), "batch inserted");
    Ok(done.rows_affected())
}
