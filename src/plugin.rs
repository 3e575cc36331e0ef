//! Host-facing lifecycle: register, init, flush, exit.
//!
//! The host addresses sink instances only through the [`InstanceId`]
//! returned from init, so a [`Plugin`] owns the registry of live sinks and
//! a tokio runtime. Each entry point blocks the calling thread until the
//! database work finishes and may be called from any number of host
//! threads at once.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::runtime::Runtime;
use tracing::{debug, error, info, warn};

use crate::config::PgConfig;
use crate::error::{Result, SinkError};
use crate::postgres::PgSink;
use crate::record::{Batch, PayloadFormat};
use crate::registry::{InstanceId, Registry};
use crate::sink::LogSink;

pub const PLUGIN_NAME: &str = "pgsql";
pub const DESCRIPTION: &str = "PostgreSQL output: stores tagged records as jsonb rows";

/// Outcome reported back to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Unrecoverable; do not try this again.
    Error,
    Ok,
    /// Re-send the same data later.
    Retry,
}

impl Status {
    /// Numeric code understood by the host.
    pub fn code(self) -> i32 {
        match self {
            Status::Error => 0,
            Status::Ok => 1,
            Status::Retry => 2,
        }
    }
}

impl From<&SinkError> for Status {
    fn from(err: &SinkError) -> Self {
        if err.is_retryable() {
            Status::Retry
        } else {
            Status::Error
        }
    }
}

/// What to do when an instance fails to initialize.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Hand the error back to the host.
    #[default]
    Report,
    /// Log and terminate the process with exit code 1. Legacy behaviour for
    /// hosts that cannot act on init errors.
    Exit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginSettings {
    pub policy: ErrorPolicy,
    pub payload_format: PayloadFormat,
    /// Worker threads of the runtime that drives database I/O.
    pub worker_threads: usize,
}

impl Default for PluginSettings {
    fn default() -> Self {
        Self {
            policy: ErrorPolicy::Report,
            payload_format: PayloadFormat::Json,
            worker_threads: 2,
        }
    }
}

pub struct Plugin {
    runtime: Runtime,
    sinks: Registry<Arc<dyn LogSink>>,
    settings: PluginSettings,
}

impl Plugin {
    pub fn new(settings: PluginSettings) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(settings.worker_threads.max(1))
            .thread_name("pgsink-io")
            .enable_all()
            .build()?;

        Ok(Self {
            runtime,
            sinks: Registry::new(),
            settings,
        })
    }

    /// One-time announcement to the host.
    pub fn on_register(&self) -> Status {
        info!(
            name = PLUGIN_NAME,
            version = env!("CARGO_PKG_VERSION"),
            "register {}",
            DESCRIPTION
        );
        Status::Ok
    }

    /// Open, provision and register a sink for `target`, `schema`, `table`.
    pub fn on_init(&self, target: &str, schema: &str, table: &str) -> Result<InstanceId> {
        self.init_with(&PgConfig::new(target, schema, table))
    }

    /// Open, provision and register a sink described by `config`.
    ///
    /// Any failure leaves nothing registered and no pool open.
    pub fn init_with(&self, config: &PgConfig) -> Result<InstanceId> {
        match self.runtime.block_on(open_sink(config)) {
            Ok(sink) => {
                let destination = sink.destination().clone();
                let id = self.register(Arc::new(sink));
                info!(
                    instance = %id,
                    schema = destination.schema(),
                    table = destination.table(),
                    "init new sink"
                );
                Ok(id)
            }
            Err(e) => {
                error!(target_db = %config.target, error = %e, "init sink failed");
                if self.settings.policy == ErrorPolicy::Exit {
                    std::process::exit(1);
                }
                Err(e)
            }
        }
    }

    /// Register an already provisioned sink under a fresh id.
    pub fn register(&self, sink: Arc<dyn LogSink>) -> InstanceId {
        self.sinks.register(sink)
    }

    /// Decode `payloads` into one batch for `tag` and write it through the
    /// sink registered as `id`.
    pub fn on_flush<P>(&self, id: &InstanceId, tag: &str, payloads: &[P]) -> Status
    where
        P: AsRef<[u8]>,
    {
        let batch = Batch::decode(tag, payloads, self.settings.payload_format);

        match self.flush(id, &batch) {
            Ok(rows) => {
                info!(instance = %id, tag, records = rows, "flushed");
                Status::Ok
            }
            Err(e @ SinkError::EmptyBatch { .. }) => {
                warn!(instance = %id, tag, received = payloads.len(), "nothing to write, asking for retry");
                Status::from(&e)
            }
            Err(e) => {
                error!(instance = %id, tag, error = %e, "flush failed");
                Status::from(&e)
            }
        }
    }

    /// Write an already decoded batch.
    pub fn flush(&self, id: &InstanceId, batch: &Batch) -> Result<u64> {
        let sink = self
            .sinks
            .get(id)
            .ok_or_else(|| SinkError::UnknownInstance(id.clone()))?;

        debug!(
            instance = %id,
            destination = %sink.destination(),
            tag = batch.tag(),
            records = batch.len(),
            "flush called"
        );
        self.runtime.block_on(sink.write(batch))
    }

    /// Close the sink registered as `id` and forget it.
    pub fn on_exit(&self, id: &InstanceId) -> Status {
        match self.sinks.remove(id) {
            Some(sink) => {
                info!(instance = %id, "exit called, closing sink");
                self.runtime.block_on(sink.close());
                Status::Ok
            }
            None => {
                error!(instance = %id, "exit called for unknown instance");
                Status::Error
            }
        }
    }

    /// Number of live instances.
    pub fn instances(&self) -> usize {
        self.sinks.len()
    }
}

async fn open_sink(config: &PgConfig) -> Result<PgSink> {
    let sink = PgSink::connect(config).await?;
    match sink.provision().await {
        Ok(outcome) => {
            debug!(destination = %sink.destination(), ?outcome, "destination provisioned");
            Ok(sink)
        }
        Err(e) => {
            sink.close().await;
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::destination::Destination;
    use crate::error::Operation;
    use crate::noop_sink::NoopSink;
    use async_trait::async_trait;
    use std::thread;

    struct RejectingSink(Destination);

    #[async_trait]
    impl LogSink for RejectingSink {
        async fn write(&self, _batch: &Batch) -> Result<u64> {
            Err(SinkError::Transport {
                op: Operation::Insert,
                source: sqlx::Error::PoolTimedOut,
            })
        }

        fn destination(&self) -> &Destination {
            &self.0
        }
    }

    fn plugin() -> Plugin {
        Plugin::new(PluginSettings::default()).unwrap()
    }

    fn noop() -> Arc<NoopSink> {
        Arc::new(NoopSink::new(Destination::new("", "mylogs").unwrap()))
    }

    #[test]
    fn status_codes() {
        assert_eq!(Status::Error.code(), 0);
        assert_eq!(Status::Ok.code(), 1);
        assert_eq!(Status::Retry.code(), 2);
        assert_eq!(plugin().on_register(), Status::Ok);
    }

    #[test]
    fn flush_writes_batch() {
        let plugin = plugin();
        let sink = noop();
        let id = plugin.register(sink.clone());

        let status = plugin.on_flush(&id, "app.log", &[br#"{"msg":"hello"}"#]);
        assert_eq!(status, Status::Ok);
        assert_eq!(sink.written(), 1);
    }

    #[test]
    fn empty_flush_asks_for_retry() {
        let plugin = plugin();
        let sink = noop();
        let id = plugin.register(sink.clone());

        assert_eq!(plugin.on_flush::<&[u8]>(&id, "app.log", &[]), Status::Retry);
        assert_eq!(plugin.on_flush(&id, "app.log", &[b"not json".as_slice()]), Status::Retry);
        assert_eq!(sink.written(), 0);
    }

    #[test]
    fn transport_failure_asks_for_retry() {
        let plugin = plugin();
        let id = plugin.register(Arc::new(RejectingSink(Destination::new("", "t").unwrap())));
        assert_eq!(plugin.on_flush(&id, "app.log", &[b"{}".as_slice()]), Status::Retry);
    }

    #[test]
    fn unknown_instance_is_an_error() {
        let plugin = plugin();
        let missing = InstanceId::from("99");

        assert_eq!(plugin.on_flush(&missing, "app.log", &[b"{}".as_slice()]), Status::Error);
        assert!(matches!(
            plugin.flush(&missing, &Batch::new("app.log", Vec::new())),
            Err(SinkError::UnknownInstance(_))
        ));
        assert_eq!(plugin.on_exit(&missing), Status::Error);
    }

    #[test]
    fn exit_closes_and_forgets() {
        let plugin = plugin();
        let sink = noop();
        let id = plugin.register(sink.clone());
        assert_eq!(plugin.instances(), 1);

        assert_eq!(plugin.on_exit(&id), Status::Ok);
        assert!(sink.is_closed());
        assert_eq!(plugin.instances(), 0);
        assert_eq!(plugin.on_flush(&id, "app.log", &[b"{}".as_slice()]), Status::Error);
    }

    #[test]
    fn log_line_format_wraps_payloads() {
        let plugin = Plugin::new(PluginSettings {
            payload_format: PayloadFormat::LogLine,
            ..PluginSettings::default()
        })
        .unwrap();
        let sink = noop();
        let id = plugin.register(sink.clone());

        assert_eq!(plugin.on_flush(&id, "syslog", &[b"plain text line".as_slice()]), Status::Ok);
        assert_eq!(sink.written(), 1);
    }

    #[test]
    fn concurrent_flushes_across_instances() {
        let plugin = Arc::new(plugin());
        let sinks: Vec<_> = (0..4).map(|_| noop()).collect();
        let ids: Vec<_> = sinks.iter().map(|s| plugin.register(s.clone())).collect();

        let handles: Vec<_> = ids
            .iter()
            .cloned()
            .flat_map(|id| {
                let plugin = Arc::clone(&plugin);
                (0..3).map(move |_| {
                    let plugin = Arc::clone(&plugin);
                    let id = id.clone();
                    thread::spawn(move || plugin.on_flush(&id, "app.log", &[b"{}".as_slice(), b"[]".as_slice()]))
                })
            })
            .collect();

        for h in handles {
            assert_eq!(h.join().unwrap(), Status::Ok);
        }
        for sink in &sinks {
            assert_eq!(sink.written(), 6);
        }
    }

    #[test]
    fn unreachable_destination_fails_init() {
        let plugin = plugin();
        let config = PgConfig {
            connect_timeout_ms: 300,
            ..PgConfig::new("127.0.0.1:1/nowhere", "", "mylogs")
        };

        let err = plugin.init_with(&config).unwrap_err();
        assert!(matches!(err, SinkError::PoolCreation(_)));
        assert_eq!(Status::from(&err), Status::Error);
        assert_eq!(plugin.instances(), 0);
    }

    #[test]
    fn invalid_config_fails_init() {
        let plugin = plugin();
        let err = plugin.on_init("localhost:5432/db", "", "").unwrap_err();
        assert!(matches!(err, SinkError::Config(_)));
    }
}
