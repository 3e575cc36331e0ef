use std::sync::Arc;
use std::time::Instant;

use pgsink::destination::Destination;
use pgsink::noop_sink::NoopSink;
use pgsink::{Plugin, PluginSettings};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let plugin = Arc::new(Plugin::new(PluginSettings::default())?);
    let sink = Arc::new(NoopSink::new(Destination::new("", "logs")?));
    let id = plugin.register(sink.clone());

    let payloads: Vec<Vec<u8>> = (0..500)
        .map(|i| format!(r#"{{"iteration":{},"msg":"load test"}}"#, i).into_bytes())
        .collect();

    let flushes: u64 = 2_000;
    let start = Instant::now();
    for _ in 0..flushes {
        plugin.on_flush(&id, "load", &payloads);
    }
    let elapsed = start.elapsed();

    println!(
        "noop sink: {} records in {} flushes in {:?} (~{:.0} rec/s)",
        sink.written(),
        flushes,
        elapsed,
        sink.written() as f64 / elapsed.as_secs_f64()
    );

    plugin.on_exit(&id);
    Ok(())
}
