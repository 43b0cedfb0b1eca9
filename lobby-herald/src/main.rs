//! Lobby Herald - Main entry point.

use anyhow::Result;
use lobby_common::config::Config;
use lobby_common::logging::init_logging_with_exclusions;
use lobby_herald::start_bot;

#[tokio::main]
async fn main() -> Result<()> {
    // Load and validate configuration
    let config = Config::load_and_validate()?;

    // Initialize logging
    init_logging_with_exclusions(
        &config.observability.log_level,
        &config.observability.log_format,
        &config.observability.excluded_targets,
    );

    tracing::info!("Lobby Herald v{}", env!("CARGO_PKG_VERSION"));

    start_bot(&config).await
}
