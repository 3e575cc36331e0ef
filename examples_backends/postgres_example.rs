use pgsink::config::PgConfig;
use pgsink::logging::{init_logging, LogConfig};
use pgsink::{Plugin, PluginSettings};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Point PG_SINK_TARGET at your server, e.g.
    //   PG_SINK_TARGET=localhost:5432/postgres PG_SINK_USER=postgres PG_SINK_TABLE=mylogs
    init_logging(&LogConfig::from_env())?;
    let config = PgConfig::from_env()?;

    let plugin = Plugin::new(PluginSettings::default())?;
    plugin.on_register();

    // Creates the schema/table on first run, validates it afterwards.
    let id = plugin.init_with(&config)?;

    let status = plugin.on_flush(
        &id,
        "app.log",
        &[
            br#"{"msg":"service started"}"#.as_slice(),
            br#"{"msg":"order failed","order_id":123}"#.as_slice(),
        ],
    );
    println!("flush status: {:?} (code {})", status, status.code());

    // An empty delivery asks the host to retry later.
    let status = plugin.on_flush::<&[u8]>(&id, "app.log", &[]);
    println!("empty flush status: {:?}", status);

    plugin.on_exit(&id);
    Ok(())
}
