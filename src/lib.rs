pub mod error;
pub mod env;
pub mod config;
pub mod destination;
pub mod record;
pub mod schema;
pub mod writer;
pub mod sink;
pub mod postgres;
pub mod noop_sink;
pub mod registry;
pub mod logging;
pub mod plugin;

pub use error::{Result, SinkError};
pub use plugin::{Plugin, PluginSettings, Status};
