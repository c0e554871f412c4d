// =============================================================================
// Central Application State — BTC Market View
// =============================================================================
//
// Holds what the loops publish: the current chart window, the latest market
// summary, the latest synthesized order book, and the streamed price. Each
// loop owns its working data and only hands finished values in here; the
// REST and WebSocket layers read snapshots back out.
//
// Thread safety:
//   - Atomic counters for lock-free version tracking.
//   - parking_lot::RwLock for every published value.
// =============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use parking_lot::RwLock;
use rand::Rng;
use serde::Serialize;
use tracing::debug;

use crate::coingecko::rate_limit::RequestBudgetSnapshot;
use crate::coingecko::{MarketSummary, RequestBudget};
use crate::format::PriceHeader;
use crate::market_data::orderbook::{generate_order_book_data, DepthSummary, OrderBookRow};
use crate::market_data::{Candle, LivePrice, OrderBook};
use crate::runtime_config::RuntimeConfig;
use crate::types::FeedMode;

// =============================================================================
// Error Record
// =============================================================================

/// An upstream failure kept for display.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub message: String,
    /// ISO 8601 timestamp.
    pub at: String,
    #[serde(skip)]
    at_ms: i64,
}

/// Maximum number of recent errors to retain.
const MAX_RECENT_ERRORS: usize = 50;
/// An error this recent is raised as the snapshot's alert.
const ALERT_WINDOW_MS: i64 = 60_000;

// =============================================================================
// AppState
// =============================================================================

pub struct AppState {
    /// Incremented on every published change. The WebSocket feed uses this
    /// to decide when to push.
    pub state_version: AtomicU64,

    /// WebSocket message sequence number (incremented per message sent).
    pub ws_sequence_number: AtomicU64,

    pub runtime_config: Arc<RwLock<RuntimeConfig>>,

    // ── Market Data ─────────────────────────────────────────────────────
    pub chart: RwLock<Vec<Candle>>,
    pub live_price: Arc<LivePrice>,
    pub summary: RwLock<Option<MarketSummary>>,
    pub order_book: RwLock<Option<OrderBook>>,

    // ── Upstream ────────────────────────────────────────────────────────
    pub request_budget: Arc<RequestBudget>,
    pub recent_errors: RwLock<Vec<ErrorRecord>>,

    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(config: RuntimeConfig) -> Self {
        let request_budget = Arc::new(RequestBudget::new(config.requests_per_minute));
        Self {
            state_version: AtomicU64::new(1),
            ws_sequence_number: AtomicU64::new(0),
            runtime_config: Arc::new(RwLock::new(config)),
            chart: RwLock::new(Vec::new()),
            live_price: Arc::new(LivePrice::new()),
            summary: RwLock::new(None),
            order_book: RwLock::new(None),
            request_budget,
            recent_errors: RwLock::new(Vec::new()),
            start_time: std::time::Instant::now(),
        }
    }

    // ── Version Management ──────────────────────────────────────────────

    pub fn increment_version(&self) -> u64 {
        self.state_version.fetch_add(1, Ordering::SeqCst)
    }

    pub fn current_state_version(&self) -> u64 {
        self.state_version.load(Ordering::SeqCst)
    }

    // ── Error Logging ───────────────────────────────────────────────────

    /// Record an upstream failure. Capped at [`MAX_RECENT_ERRORS`]; oldest
    /// entries are evicted first.
    pub fn push_error(&self, msg: String) {
        let now = Utc::now();
        let record = ErrorRecord {
            message: msg,
            at: now.to_rfc3339(),
            at_ms: now.timestamp_millis(),
        };

        let mut errors = self.recent_errors.write();
        errors.push(record);
        while errors.len() > MAX_RECENT_ERRORS {
            errors.remove(0);
        }
        drop(errors);

        self.increment_version();
    }

    // ── Publishing ──────────────────────────────────────────────────────

    pub fn publish_chart(&self, candles: Vec<Candle>) {
        *self.chart.write() = candles;
        self.increment_version();
    }

    pub fn set_summary(&self, summary: MarketSummary) {
        *self.summary.write() = Some(summary);
        self.increment_version();
    }

    /// Price the order book is built around: the latest streamed tick, else
    /// the summary price, else the close of the newest chart candle.
    pub fn reference_price(&self) -> Option<f64> {
        self.live_price
            .get()
            .or_else(|| self.summary.read().as_ref().map(|s| s.current_price))
            .or_else(|| self.chart.read().last().map(|c| c.close))
    }

    /// Rebuild the book around `reference` with the configured ladder. On
    /// failure the previous book stays published.
    pub fn refresh_order_book<R: Rng + ?Sized>(&self, reference: f64, rng: &mut R) -> Result<()> {
        let (depth, step) = {
            let config = self.runtime_config.read();
            (config.book_depth, config.book_step)
        };
        let book = generate_order_book_data(reference, depth, step, rng)?;
        debug!(reference, depth, "order book regenerated");
        *self.order_book.write() = Some(book);
        self.increment_version();
        Ok(())
    }

    // ── Views ───────────────────────────────────────────────────────────

    /// The ticker header. Live mode reads the market summary, synthetic mode
    /// the newest chart candle.
    pub fn price_header(&self) -> Option<PriceHeader> {
        match self.runtime_config.read().feed_mode {
            FeedMode::Live => self
                .summary
                .read()
                .as_ref()
                .map(|s| PriceHeader::from_summary(s, self.live_price.get())),
            FeedMode::Synthetic => self.chart.read().last().map(PriceHeader::from_candle),
        }
    }

    pub fn order_book_view(&self) -> Option<OrderBookView> {
        let book = self.order_book.read().clone()?;
        Some(OrderBookView {
            depth: book.depth_summary(),
            rows: book.display_rows(),
            book,
        })
    }

    /// Most recent error if it happened within the alert window.
    fn current_alert(&self, now_ms: i64) -> Option<String> {
        self.recent_errors
            .read()
            .last()
            .filter(|e| now_ms - e.at_ms <= ALERT_WINDOW_MS)
            .map(|e| e.message.clone())
    }

    // ── Snapshot Builder ────────────────────────────────────────────────

    /// Build the full payload for `GET /api/v1/state` and the WebSocket feed.
    pub fn build_snapshot(&self) -> StateSnapshot {
        let now = Utc::now();
        let feed_mode = self.runtime_config.read().feed_mode;
        let book = self.order_book.read().clone();

        StateSnapshot {
            state_version: self.current_state_version(),
            server_time: now.timestamp_millis(),
            uptime_secs: self.start_time.elapsed().as_secs(),
            feed_mode: feed_mode.to_string(),
            header: self.price_header(),
            summary: self.summary.read().clone(),
            live_price: self.live_price.get(),
            live_price_at: self.live_price.last_update_ms(),
            chart: self.chart.read().clone(),
            depth: book.as_ref().and_then(OrderBook::depth_summary),
            order_book: book,
            request_budget: self.request_budget.snapshot(),
            recent_errors: self.recent_errors.read().clone(),
            alert: self.current_alert(now.timestamp_millis()),
        }
    }
}

// =============================================================================
// Serialisable snapshot types
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct StateSnapshot {
    pub state_version: u64,
    pub server_time: i64,
    pub uptime_secs: u64,
    pub feed_mode: String,
    pub header: Option<PriceHeader>,
    pub summary: Option<MarketSummary>,
    pub live_price: Option<f64>,
    /// Epoch ms of the last accepted streamed tick.
    pub live_price_at: Option<i64>,
    pub chart: Vec<Candle>,
    pub order_book: Option<OrderBook>,
    pub depth: Option<DepthSummary>,
    pub request_budget: RequestBudgetSnapshot,
    pub recent_errors: Vec<ErrorRecord>,
    /// Message to surface to the user, if an upstream call failed recently.
    pub alert: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderBookView {
    pub book: OrderBook,
    pub depth: Option<DepthSummary>,
    pub rows: Vec<OrderBookRow>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn summary(price: f64) -> MarketSummary {
        MarketSummary {
            current_price: price,
            price_change_24h: 10.0,
            price_change_percentage_24h: 0.5,
            high_24h: price + 100.0,
            low_24h: price - 100.0,
        }
    }

    fn candle(close: f64) -> Candle {
        Candle {
            timestamp: 1,
            open: close - 1.0,
            high: close + 1.0,
            low: close - 2.0,
            close,
        }
    }

    #[test]
    fn reference_price_precedence() {
        let state = AppState::new(RuntimeConfig::default());
        assert_eq!(state.reference_price(), None);

        state.publish_chart(vec![candle(150.0)]);
        assert_eq!(state.reference_price(), Some(150.0));

        state.set_summary(summary(60_000.0));
        assert_eq!(state.reference_price(), Some(60_000.0));

        state.live_price.set(60_123.0);
        assert_eq!(state.reference_price(), Some(60_123.0));
    }

    #[test]
    fn refresh_order_book_publishes_and_keeps_previous_on_error() {
        let state = AppState::new(RuntimeConfig::default());
        let mut rng = StdRng::seed_from_u64(1);

        state.refresh_order_book(50_000.0, &mut rng).unwrap();
        let first = state.order_book.read().clone().unwrap();
        assert_eq!(first.bids.len(), 20);

        assert!(state.refresh_order_book(-1.0, &mut rng).is_err());
        assert_eq!(state.order_book.read().as_ref(), Some(&first));
    }

    #[test]
    fn refresh_order_book_below_one_hundred() {
        let state = AppState::new(RuntimeConfig::default());
        let mut rng = StdRng::seed_from_u64(17);

        for reference in [50.0, 95.0, 99.0] {
            state.refresh_order_book(reference, &mut rng).unwrap();
            let book = state.order_book.read().clone().unwrap();
            assert_eq!(book.bids.len(), 20);
            assert_eq!(book.bids[0].price, reference);
            assert!(book.bids.windows(2).all(|w| w[0].price > w[1].price));
        }
        assert!(state.recent_errors.read().is_empty());
    }

    #[test]
    fn push_error_caps_and_raises_alert() {
        let state = AppState::new(RuntimeConfig::default());
        for i in 0..60 {
            state.push_error(format!("failure {i}"));
        }
        assert_eq!(state.recent_errors.read().len(), MAX_RECENT_ERRORS);
        assert_eq!(state.recent_errors.read()[0].message, "failure 10");

        let snapshot = state.build_snapshot();
        assert_eq!(snapshot.alert.as_deref(), Some("failure 59"));
    }

    #[test]
    fn stale_errors_do_not_alert() {
        let state = AppState::new(RuntimeConfig::default());
        state.push_error("old".to_string());
        let later = Utc::now().timestamp_millis() + ALERT_WINDOW_MS + 1;
        assert_eq!(state.current_alert(later), None);
    }

    #[test]
    fn header_follows_feed_mode() {
        let mut config = RuntimeConfig::default();
        config.feed_mode = FeedMode::Synthetic;
        let state = AppState::new(config);
        state.set_summary(summary(60_000.0));
        state.publish_chart(vec![candle(101.0)]);
        assert_eq!(state.price_header().map(|h| h.price), Some("$101.00".to_string()));

        state.runtime_config.write().feed_mode = FeedMode::Live;
        assert_eq!(state.price_header().map(|h| h.price), Some("$60,000.00".to_string()));
    }

    #[test]
    fn publishing_bumps_version() {
        let state = AppState::new(RuntimeConfig::default());
        let v0 = state.current_state_version();
        state.publish_chart(vec![candle(1.0)]);
        state.set_summary(summary(1.0));
        assert_eq!(state.current_state_version(), v0 + 2);
    }

    #[test]
    fn snapshot_serialises() {
        let state = AppState::new(RuntimeConfig::default());
        let mut rng = StdRng::seed_from_u64(2);
        state.refresh_order_book(40_000.0, &mut rng).unwrap();
        let json = serde_json::to_value(state.build_snapshot()).unwrap();
        assert_eq!(json["feed_mode"], "Live");
        assert_eq!(json["order_book"]["bids"].as_array().map(Vec::len), Some(20));
        assert!(json["depth"]["bid_pct"].is_number());
    }
}
