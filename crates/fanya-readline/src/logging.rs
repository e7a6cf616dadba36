//! Tracing setup for the terminal client.
//!
//! Logs go to a daily rolling file so they never interleave with the REPL.
//! `RUST_LOG` overrides the configured level.

use anyhow::{Context, Result};
use fanya_core::config::LoggingConfig;
use fanya_infrastructure::FanyaPaths;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Installs the global subscriber. Keep the guard alive until exit.
pub fn init(config: &LoggingConfig) -> Result<(WorkerGuard, PathBuf)> {
    let directory = match &config.directory {
        Some(directory) => PathBuf::from(directory),
        None => FanyaPaths::logs_dir()?,
    };
    std::fs::create_dir_all(&directory)
        .with_context(|| format!("Failed to create log directory {}", directory.display()))?;

    let appender = tracing_appender::rolling::daily(&directory, "fanya.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    tracing::info!("[Bootstrap] Logging to {}", directory.display());
    Ok((guard, directory))
}
