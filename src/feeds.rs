// =============================================================================
// Feed Loops — the periodic tasks that drive the market-data core
// =============================================================================
//
// Each loop owns its working data (the chart series, its RNG, the ticker
// counter) and publishes finished values into `AppState`. Upstream failures
// are logged, recorded for display, and never end a loop.
// =============================================================================

use std::sync::Arc;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::time::{interval, sleep, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::app_state::AppState;
use crate::coingecko::CoinGeckoClient;
use crate::market_data::candles::fold_price;
use crate::market_data::price_stream::run_price_stream;
use crate::market_data::{CandleSeries, CandleTicker, TickAction};

/// Pause before reconnecting a dropped price stream.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Synthetic chart
// ---------------------------------------------------------------------------

/// Drive a random-walk chart: every tick amends the open candle, and every
/// `updates_per_candle + 1`-th tick rolls over to a new one.
pub async fn run_synthetic_chart(state: Arc<AppState>) {
    let (mut ticker, capacity, tick_ms) = {
        let config = state.runtime_config.read();
        (
            CandleTicker::new(config.updates_per_candle, config.synth_params()),
            config.max_candles,
            config.tick_interval_ms,
        )
    };
    let mut rng = StdRng::from_entropy();

    // An empty series is reseeded on the first step.
    let mut series = CandleSeries::new(Vec::new(), capacity);
    let mut tick = interval(Duration::from_millis(tick_ms));
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(capacity, tick_ms, "synthetic chart loop starting");
    loop {
        tick.tick().await;
        let (next, action) = ticker.step(series, Utc::now().timestamp_millis(), &mut rng);
        series = next;

        match action {
            TickAction::Reseeded => info!(candles = series.len(), "synthetic series seeded"),
            TickAction::RolledOver { evicted } => debug!(
                evicted = evicted.map(|c| c.timestamp),
                close = series.last().map(|c| c.close),
                "synthetic candle rolled over"
            ),
            TickAction::Updated => debug!(updates = ticker.counter(), "synthetic candle amended"),
        }

        state.publish_chart(series.to_vec());
    }
}

// ---------------------------------------------------------------------------
// Live chart
// ---------------------------------------------------------------------------

/// Keep a chart seeded from historical OHLC and fold every new streamed tick
/// into it. History is refetched on its own (slow) cadence and replaces the
/// series wholesale.
pub async fn run_live_chart(state: Arc<AppState>, client: CoinGeckoClient) {
    let (capacity, fallback_bucket_ms, days, ohlc_secs, tick_ms) = {
        let config = state.runtime_config.read();
        (
            config.max_candles,
            config.candle_interval_ms,
            config.ohlc_days,
            config.ohlc_poll_secs,
            config.tick_interval_ms,
        )
    };

    let mut series: Option<CandleSeries> = None;
    let mut seen_price_version = state.live_price.version();

    let mut refetch = interval(Duration::from_secs(ohlc_secs));
    refetch.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut tick = interval(Duration::from_millis(tick_ms));
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(capacity, days, ohlc_secs, "live chart loop starting");
    loop {
        tokio::select! {
            _ = refetch.tick() => {
                match client.fetch_ohlc(days).await {
                    Ok(candles) => {
                        let fresh = CandleSeries::new(candles, capacity);
                        if fresh.is_empty() {
                            warn!("ohlc response was empty — keeping current chart");
                        } else {
                            info!(candles = fresh.len(), "chart history loaded");
                            state.publish_chart(fresh.to_vec());
                            series = Some(fresh);
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "failed to fetch ohlc history");
                        state.push_error(format!("Failed to fetch chart history: {e}"));
                    }
                }
            }
            _ = tick.tick() => {
                let version = state.live_price.version();
                if version == seen_price_version {
                    continue;
                }
                seen_price_version = version;

                let Some(price) = state.live_price.get() else {
                    continue;
                };
                let Some(current) = series.take() else {
                    continue;
                };
                let folded = fold_price(current, price, Utc::now().timestamp_millis(), fallback_bucket_ms);
                state.publish_chart(folded.to_vec());
                series = Some(folded);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Market summary
// ---------------------------------------------------------------------------

pub async fn run_summary_poll(state: Arc<AppState>, client: CoinGeckoClient) {
    let secs = state.runtime_config.read().summary_poll_secs;
    let mut tick = interval(Duration::from_secs(secs));
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tick.tick().await;
        match client.fetch_market_summary().await {
            Ok(summary) => {
                debug!(price = summary.current_price, "market summary updated");
                state.set_summary(summary);
            }
            Err(e) => {
                error!(error = %e, "failed to fetch market summary");
                state.push_error(format!("Failed to fetch market data: {e}"));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Live price stream
// ---------------------------------------------------------------------------

pub async fn run_price_feed(state: Arc<AppState>) {
    let (url, asset) = {
        let config = state.runtime_config.read();
        (config.price_stream_url.clone(), config.coin_id.clone())
    };
    let live = state.live_price.clone();

    loop {
        if let Err(e) = run_price_stream(&url, &asset, &live).await {
            error!(asset = %asset, error = %e, "price stream error — reconnecting in 5s");
            state.push_error(format!("Live price feed interrupted: {e}"));
        }
        sleep(RECONNECT_DELAY).await;
    }
}

// ---------------------------------------------------------------------------
// Order book
// ---------------------------------------------------------------------------

/// Regenerate the synthetic book whenever the reference price moves.
///
/// A price that cannot produce a valid ladder is reported once and the
/// previous book stays up until the price changes again.
pub async fn run_book_refresh(state: Arc<AppState>) {
    let refresh_ms = state.runtime_config.read().book_refresh_ms;
    let mut rng = StdRng::from_entropy();
    let mut last_reference: Option<u64> = None;

    let mut tick = interval(Duration::from_millis(refresh_ms));
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tick.tick().await;
        let Some(reference) = state.reference_price() else {
            continue;
        };
        if last_reference == Some(reference.to_bits()) {
            continue;
        }
        last_reference = Some(reference.to_bits());

        if let Err(e) = state.refresh_order_book(reference, &mut rng) {
            warn!(reference, error = %e, "order book not regenerated");
            state.push_error(format!("Order book unavailable at {reference}: {e}"));
        }
    }
}

// ---------------------------------------------------------------------------
// Request budget
// ---------------------------------------------------------------------------

pub async fn run_budget_reset(state: Arc<AppState>) {
    let mut tick = interval(Duration::from_secs(60));
    // The first tick fires immediately; skip it so the first window is a full minute.
    tick.tick().await;
    loop {
        tick.tick().await;
        state.request_budget.reset_minute();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime_config::RuntimeConfig;
    use crate::types::FeedMode;

    fn fast_synthetic_state() -> Arc<AppState> {
        let mut config = RuntimeConfig::default();
        config.feed_mode = FeedMode::Synthetic;
        config.tick_interval_ms = 10;
        config.book_refresh_ms = 10;
        Arc::new(AppState::new(config))
    }

    #[tokio::test]
    async fn synthetic_loop_seeds_and_publishes() {
        let state = fast_synthetic_state();
        let task = tokio::spawn(run_synthetic_chart(state.clone()));
        sleep(Duration::from_millis(100)).await;
        task.abort();

        let chart = state.chart.read().clone();
        assert_eq!(chart.len(), 30);
        assert!(chart.windows(2).all(|w| w[1].timestamp > w[0].timestamp));
    }

    #[tokio::test]
    async fn book_loop_builds_around_chart_close() {
        let state = fast_synthetic_state();
        state.publish_chart(vec![crate::market_data::Candle {
            timestamp: 0,
            open: 98.0,
            high: 99.0,
            low: 97.0,
            close: 97.3,
        }]);

        let book = tokio::spawn(run_book_refresh(state.clone()));
        sleep(Duration::from_millis(100)).await;
        book.abort();

        let ob = state.order_book.read().clone().expect("book generated");
        assert_eq!(ob.bids.len(), 20);
        assert_eq!(ob.bids[0].price, 97.3);
        assert!(state.recent_errors.read().is_empty());
    }
}
