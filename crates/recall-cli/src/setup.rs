//! CLI setup: logging and core initialization.

use anyhow::Result;
use recall_core::{RecallConfig, RecallCore, paths};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::cli::Cli;

/// Log to a daily file under the data dir; `--verbose` also logs to stderr.
/// Keep the returned guard alive until exit so buffered lines are flushed.
pub fn init_logging(verbose: bool) -> Result<WorkerGuard> {
    let log_dir = paths::logs_dir()?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "recall.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let default_filter = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(false);
    let stderr_layer = verbose.then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .init();

    Ok(guard)
}

fn load_config(cli: &Cli) -> Result<RecallConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let mut config = RecallConfig::load_from_path(path)?;
            config.apply_env();
            config
        }
        None => RecallConfig::load(),
    };
    if let Some(db_path) = &cli.db_path {
        config.storage.db_path = Some(db_path.clone());
    }
    Ok(config)
}

/// Build the embedded Recall core
pub async fn prepare_core(cli: &Cli) -> Result<RecallCore> {
    let config = load_config(cli)?;
    Ok(RecallCore::new(config).await?)
}
