//! Grid-Bot Dashboard Sync Client
//!
//! Headless monitor for a grid-trading bot backend: polls the active view
//! on a fixed cadence, reconciles pair views against the backend's active
//! set, and keeps chart state converged without clobbering user viewports.

use anyhow::Result;
use tracing::{error, info};

use gridwatch::app::App;
use gridwatch::config::ClientConfig;
use gridwatch::poller::run_poller;

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional; real env always wins
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("gridwatch=info".parse()?),
        )
        .init();

    let config = ClientConfig::from_env();
    info!("Grid-Bot Dashboard Sync Client");
    info!("   Backend: {}", config.base_url);
    info!(
        "   Poll interval: {:?}, timeframe: {}",
        config.poll_interval, config.default_timeframe
    );

    let app = App::new(&config);
    let poller_handle = tokio::spawn(run_poller(app.clone(), config));

    tokio::select! {
        _ = poller_handle => {
            error!("poller exited unexpectedly");
        }
        result = tokio::signal::ctrl_c() => {
            match result {
                Ok(()) => info!("shutdown signal received, exiting"),
                Err(e) => error!("signal handler error: {}", e),
            }
        }
    }

    Ok(())
}
