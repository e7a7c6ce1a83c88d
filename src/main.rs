//! Cross-Venue Arbitrage Scanner - Main Entry Point

use anyhow::Result;
use cross_venue_arb::api::{self, AppState};
use cross_venue_arb::config::Config;
use cross_venue_arb::storage::JsonlStore;
use cross_venue_arb::utils;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let _logging_guard = utils::setup_logging()?;
    utils::setup_output_directories()?;

    let config = Config::load();

    info!("🛰️  Cross-Venue Arbitrage Scanner v0.5.0");
    info!("📋 Configuration:");
    info!("   Port: {}", config.port);
    info!("   Provider: {}", config.provider_base_url);
    info!("   Quote TTL: {}ms", config.quote_ttl_ms);
    info!("   Provider Interval: {}ms", config.provider_min_interval_ms);
    info!("   Default Symbols: {}", config.default_symbols.join(","));
    info!("   Min Spread: {}%", config.min_spread_pct);
    info!("   Trade Size: ${}", config.trade_size_usd);
    info!("   Auto Execute: {}", config.auto_execute_enabled);
    info!("   Daily P&L Limit: ${}", config.daily_pnl_limit_usd);
    info!("   🎭 Paper trading only, no orders leave this process");

    let store = Arc::new(JsonlStore::new(&config.data_dir)?);
    let state = AppState::new(config, store)?;

    // seed risk settings before the first request needs them
    state.gate.settings().await?;

    api::serve(state).await?;

    info!("🛑 Shutting down gracefully");
    Ok(())
}
