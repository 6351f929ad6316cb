use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::errors::{AppError, AppResult};
use crate::modules::config::AppConfig;

const LOG_FILE_PREFIX: &str = "relief_hub.log";

/// Install the global subscriber: console output always, plus a daily rolling
/// file when `log_dir` is configured. `RUST_LOG` wins over the configured level.
/// `try_init` also bridges `log` records into tracing.
///
/// The returned guard flushes the file writer on drop and must live as long
/// as the process.
pub fn init_logger(config: &AppConfig) -> AppResult<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));

    let console = tracing_subscriber::fmt::layer().with_target(false);

    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .try_init()
        .map_err(|e| AppError::Config(format!("Failed to install log subscriber: {}", e)))?;

    Ok(guard)
}

pub fn log_info(message: &str) {
    tracing::info!("{}", message);
}

pub fn log_warn(message: &str) {
    tracing::warn!("{}", message);
}

pub fn log_error(message: &str) {
    tracing::error!("{}", message);
}
