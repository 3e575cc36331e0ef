/// Environment variable names used by this crate for configuring a sink
/// without a host-supplied key set.
///
/// These are purely helpers; the sink types themselves never read the
/// environment.

/// Connection target: `postgres://…` URL or `host[:port][/database]`.
pub const PG_SINK_TARGET_ENV: &str = "PG_SINK_TARGET";

/// Optional user name, overrides the one in the target.
pub const PG_SINK_USER_ENV: &str = "PG_SINK_USER";

/// Optional password, overrides the one in the target.
pub const PG_SINK_PASSWORD_ENV: &str = "PG_SINK_PASSWORD";

/// libpq-style ssl mode, e.g. `disable`, `prefer`, `require`.
pub const PG_SINK_SSL_MODE_ENV: &str = "PG_SINK_SSL_MODE";

/// Destination schema; `public` when unset or empty.
pub const PG_SINK_SCHEMA_ENV: &str = "PG_SINK_SCHEMA";

/// Destination table.
pub const PG_SINK_TABLE_ENV: &str = "PG_SINK_TABLE";

/// Upper bound on pooled connections per sink.
pub const PG_SINK_MAX_CONNECTIONS_ENV: &str = "PG_SINK_MAX_CONNECTIONS";

/// Deadline for one provisioning transaction or one batch write.
pub const PG_SINK_OPERATION_TIMEOUT_MS_ENV: &str = "PG_SINK_OPERATION_TIMEOUT_MS";

/// Default log level for [`crate::logging::init_logging`].
pub const PG_SINK_LOG_LEVEL_ENV: &str = "PG_SINK_LOG_LEVEL";

/// Optional log file; stderr when unset.
pub const PG_SINK_LOG_FILE_ENV: &str = "PG_SINK_LOG_FILE";

/// Read an environment variable or fall back to a provided default.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Read an environment variable, treating empty values as unset.
pub fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}
