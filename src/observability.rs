// src/observability.rs

//! Tracing subscriber setup for hosts embedding the monitor

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LogFormat;
use crate::error::{MonitorError, MonitorResult};

/// Filter from `RUST_LOG`, or `default_level` when it is unset or unparsable
pub fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Install the global subscriber.
///
/// Fails instead of panicking when a subscriber is already installed.
pub fn init_tracing(format: LogFormat, default_level: &str) -> MonitorResult<()> {
    let registry = tracing_subscriber::registry().with(env_filter(default_level));

    let installed = match format {
        LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
        LogFormat::Text => registry.with(fmt::layer()).try_init(),
    };

    installed.map_err(|err| {
        MonitorError::invalid(format!("could not install tracing subscriber: {}", err))
    })
}
