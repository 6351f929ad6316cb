use anyhow::Context;

use relief_hub::modules::{http_api, logger};
use relief_hub::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("Failed to load configuration")?;

    // Keep the guard alive so buffered file logs are flushed on exit.
    let _log_guard = logger::init_logger(&config).context("Failed to initialise logging")?;

    tracing::info!(
        "relief_hub v{} starting on {}",
        env!("CARGO_PKG_VERSION"),
        config.bind_address()
    );

    http_api::start_server(&config)
        .await
        .context("HTTP API server failed")?;

    Ok(())
}
