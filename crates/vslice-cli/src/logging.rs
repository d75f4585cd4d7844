//! Subscriber setup for the binary
//!
//! Logs go to stderr; stdout carries the event stream.

use anyhow::{anyhow, Context, Result};
use tracing_subscriber::EnvFilter;
use vslice_core::LoggingConfig;

/// Install the global subscriber
///
/// `RUST_LOG` overrides the configured level.
pub(crate) fn init(config: &LoggingConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)
            .with_context(|| format!("invalid log level {:?}", config.level))?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.with_target(false).try_init()
    };
    installed.map_err(|err| anyhow!("failed to install tracing subscriber: {err}"))
}
