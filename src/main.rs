// =============================================================================
// BTC Market View — Main Entry Point
// =============================================================================
//
// Serves a candle chart, a synthesized order book and a price header over
// REST and WebSocket. In Live mode the chart comes from CoinGecko history with
// CoinCap ticks folded in; in Synthetic mode it is a local random walk.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod api;
mod app_state;
mod coingecko;
mod feeds;
mod format;
mod market_data;
mod runtime_config;
mod types;

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::coingecko::CoinGeckoClient;
use crate::runtime_config::RuntimeConfig;
use crate::types::FeedMode;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("BTC Market View starting up");

    let config_path =
        std::env::var("BTCVIEW_CONFIG").unwrap_or_else(|_| "runtime_config.json".into());

    let mut config = RuntimeConfig::load(&config_path).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        RuntimeConfig::default()
    });

    if let Ok(mode) = std::env::var("BTCVIEW_FEED_MODE") {
        config.feed_mode = mode.parse().context("invalid BTCVIEW_FEED_MODE")?;
    }
    if let Ok(addr) = std::env::var("BTCVIEW_BIND_ADDR") {
        config.bind_addr = addr;
    }
    config.validate().context("invalid runtime config")?;

    info!(
        feed_mode = %config.feed_mode,
        max_candles = config.max_candles,
        book_depth = config.book_depth,
        "Configuration ready"
    );

    // ── 2. Build shared state ────────────────────────────────────────────
    let state = Arc::new(AppState::new(config));
    let (feed_mode, bind_addr) = {
        let config = state.runtime_config.read();
        (config.feed_mode, config.bind_addr.clone())
    };

    // ── 3. Spawn feed loops ──────────────────────────────────────────────
    match feed_mode {
        FeedMode::Synthetic => {
            tokio::spawn(feeds::run_synthetic_chart(state.clone()));
        }
        FeedMode::Live => {
            let api_key = std::env::var("COINGECKO_API_KEY").unwrap_or_default();
            let client = {
                let config = state.runtime_config.read();
                CoinGeckoClient::new(
                    config.coingecko_base_url.clone(),
                    &api_key,
                    config.coin_id.clone(),
                    config.vs_currency.clone(),
                    state.request_budget.clone(),
                )?
            };

            tokio::spawn(feeds::run_price_feed(state.clone()));
            tokio::spawn(feeds::run_summary_poll(state.clone(), client.clone()));
            tokio::spawn(feeds::run_live_chart(state.clone(), client));
            tokio::spawn(feeds::run_budget_reset(state.clone()));
        }
    }

    tokio::spawn(feeds::run_book_refresh(state.clone()));

    // ── 4. Start the API server ──────────────────────────────────────────
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind API server to {bind_addr}"))?;
    info!(addr = %bind_addr, "API server listening");

    let app = api::rest::router(state.clone());
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "API server failed");
        }
    });

    // ── 5. Wait for shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("Shutdown signal received — stopping gracefully");

    if let Err(e) = state.runtime_config.read().save(&config_path) {
        error!(error = %e, "Failed to save runtime config on shutdown");
    }

    info!("BTC Market View shut down complete.");
    Ok(())
}
