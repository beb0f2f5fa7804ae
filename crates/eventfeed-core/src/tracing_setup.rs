use std::fs::OpenOptions;

use anyhow::{Context, Result};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::constants::{ENV_LOG, ENV_LOG_FILE};

pub fn init_tracing() -> Result<()> {
    init_tracing_with_service("eventfeed")
}

/// Install the global subscriber: stderr output filtered by `EVENTFEED_LOG`
/// (default `info`), plus a debug-level file layer when `EVENTFEED_LOG_FILE`
/// is set.
pub fn init_tracing_with_service(service_name: &str) -> Result<()> {
    let stderr_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .with_env_var(ENV_LOG)
        .from_env_lossy();

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(stderr_filter);

    let registry = tracing_subscriber::registry().with(stderr_layer);

    if let Ok(log_path) = std::env::var(ENV_LOG_FILE) {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .with_context(|| format!("Failed to open log file: {}", log_path))?;

        let file_layer = fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(true)
            .with_filter(LevelFilter::DEBUG);

        registry
            .with(file_layer)
            .try_init()
            .context("Failed to install tracing subscriber")?;
    } else {
        registry
            .try_init()
            .context("Failed to install tracing subscriber")?;
    }

    tracing::debug!(service = service_name, "tracing initialized");
    Ok(())
}
