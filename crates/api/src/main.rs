//! AirSense - Main Entry Point

use api::{init_logging, run_server, Settings};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_file = std::env::args().nth(1);
    let settings = Settings::load(config_file.as_deref())?;
    init_logging(&settings.logging)?;

    info!("=== AirSense v{} ===", env!("CARGO_PKG_VERSION"));
    info!(
        "Forecast horizon {}..={}h, {} configured sources",
        settings.forecast.min_hours_ahead,
        settings.forecast.max_hours_ahead,
        settings.ingestion.sources.len()
    );

    run_server(settings).await
}
