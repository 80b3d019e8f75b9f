use std::env;
use std::str::FromStr;

use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Installs the global fmt subscriber. `RUST_LOG` filters (default `info`) and
/// `LOG_FORMAT=json` switches to JSON lines. Output goes to stderr so stdout stays
/// reserved for command results.
pub fn configure_logging() -> anyhow::Result<()> {
    let filter = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_str(&filter)?)
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr);

    let installed = if env::var("LOG_FORMAT").map(|value| value == "json").unwrap_or(false) {
        subscriber.json().try_init()
    } else {
        subscriber.try_init()
    };

    if let Err(err) = installed {
        warn!("logging was already initialized: {err}");
    }
    Ok(())
}
