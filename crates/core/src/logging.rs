use thiserror::Error;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingConfig};

#[derive(Debug, Error)]
#[error("could not install log subscriber: {0}")]
pub struct LoggingInitError(String);

/// Installs the global subscriber. `RUST_LOG`, when set, takes precedence over the configured level.
pub fn init(config: &LoggingConfig) -> Result<(), LoggingInitError> {
    use LogFormat::*;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level(config).to_string().to_ascii_lowercase()));
    let builder = tracing_subscriber::fmt().with_target(false).with_env_filter(filter);

    let installed = match config.format {
        Compact => builder.compact().try_init(),
        Pretty => builder.pretty().try_init(),
        Json => builder.json().try_init(),
    };
    installed.map_err(|error| LoggingInitError(error.to_string()))
}

pub fn level(config: &LoggingConfig) -> Level {
    config.level.trim().parse::<Level>().unwrap_or(Level::INFO)
}
