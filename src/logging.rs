use anyhow::{Context, Result};
use book_config::{LogFormat, LoggingConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` picks the filter; `LOG_FORMAT=json` switches the output to
/// one JSON object per line. Call once, before anything logs.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_new(&config.rust_log)
        .with_context(|| format!("Invalid RUST_LOG filter '{}'", config.rust_log))?;

    let json = config.format == LogFormat::Json;

    tracing_subscriber::registry()
        .with(filter)
        .with((!json).then(tracing_subscriber::fmt::layer))
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(())
}
