// =============================================================================
// Runtime Configuration — service settings with atomic save
// =============================================================================
//
// Every tunable lives here: feed selection, synthetic chart shape, order book
// ladder, polling cadence, and upstream endpoints. All fields carry
// `#[serde(default)]` so an older or partial config file always loads.
//
// Persistence uses an atomic tmp + rename pattern to prevent corruption on
// crash.
// =============================================================================

use std::path::Path;

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::market_data::candles::{
    CANDLE_INTERVAL_MS, DEFAULT_CANDLE_COUNT, DEFAULT_CAPACITY, SEED_PRICE,
};
use crate::market_data::orderbook::{DEFAULT_DEPTH, DEFAULT_STEP};
use crate::market_data::SynthParams;
use crate::types::FeedMode;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_seed_price() -> f64 {
    SEED_PRICE
}

fn default_initial_candles() -> usize {
    DEFAULT_CANDLE_COUNT
}

fn default_candle_interval_ms() -> i64 {
    CANDLE_INTERVAL_MS
}

fn default_max_candles() -> usize {
    DEFAULT_CAPACITY
}

fn default_updates_per_candle() -> u32 {
    9
}

fn default_tick_interval_ms() -> u64 {
    1_000
}

fn default_book_depth() -> usize {
    DEFAULT_DEPTH
}

fn default_book_step() -> f64 {
    DEFAULT_STEP
}

fn default_book_refresh_ms() -> u64 {
    1_000
}

fn default_summary_poll_secs() -> u64 {
    20
}

fn default_ohlc_poll_secs() -> u64 {
    30 * 60
}

fn default_ohlc_days() -> u32 {
    1
}

fn default_coingecko_base_url() -> String {
    "https://api.coingecko.com/api/v3".to_string()
}

fn default_requests_per_minute() -> u32 {
    30
}

fn default_price_stream_url() -> String {
    "wss://ws.coincap.io/prices?assets=bitcoin".to_string()
}

fn default_coin_id() -> String {
    "bitcoin".to_string()
}

fn default_vs_currency() -> String {
    "usd".to_string()
}

fn default_bind_addr() -> String {
    "0.0.0.0:3001".to_string()
}

// =============================================================================
// RuntimeConfig
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    // --- Feed ----------------------------------------------------------------

    /// Live (REST + stream) or Synthetic (local random walk).
    #[serde(default)]
    pub feed_mode: FeedMode,

    // --- Synthetic chart ------------------------------------------------------

    /// Open of the first synthetic candle.
    #[serde(default = "default_seed_price")]
    pub seed_price: f64,

    /// Candles generated on a cold start.
    #[serde(default = "default_initial_candles")]
    pub initial_candles: usize,

    /// Width of one synthetic bucket; also the bucket assumed for a live
    /// series too short to infer one.
    #[serde(default = "default_candle_interval_ms")]
    pub candle_interval_ms: i64,

    /// Candles retained in the chart window.
    #[serde(default = "default_max_candles")]
    pub max_candles: usize,

    /// Amendments to the open candle before rolling over.
    #[serde(default = "default_updates_per_candle")]
    pub updates_per_candle: u32,

    /// Chart tick period.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    // --- Order book -----------------------------------------------------------

    #[serde(default = "default_book_depth")]
    pub book_depth: usize,

    /// Relative distance between levels (0.0001 = 1 bp).
    #[serde(default = "default_book_step")]
    pub book_step: f64,

    #[serde(default = "default_book_refresh_ms")]
    pub book_refresh_ms: u64,

    // --- Upstream -------------------------------------------------------------

    #[serde(default = "default_summary_poll_secs")]
    pub summary_poll_secs: u64,

    #[serde(default = "default_ohlc_poll_secs")]
    pub ohlc_poll_secs: u64,

    /// Lookback window requested from the OHLC endpoint.
    #[serde(default = "default_ohlc_days")]
    pub ohlc_days: u32,

    #[serde(default = "default_coingecko_base_url")]
    pub coingecko_base_url: String,

    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,

    #[serde(default = "default_price_stream_url")]
    pub price_stream_url: String,

    /// Asset id used by both the REST source and the stream.
    #[serde(default = "default_coin_id")]
    pub coin_id: String,

    #[serde(default = "default_vs_currency")]
    pub vs_currency: String,

    // --- API ------------------------------------------------------------------

    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            feed_mode: FeedMode::default(),
            seed_price: default_seed_price(),
            initial_candles: default_initial_candles(),
            candle_interval_ms: default_candle_interval_ms(),
            max_candles: default_max_candles(),
            updates_per_candle: default_updates_per_candle(),
            tick_interval_ms: default_tick_interval_ms(),
            book_depth: default_book_depth(),
            book_step: default_book_step(),
            book_refresh_ms: default_book_refresh_ms(),
            summary_poll_secs: default_summary_poll_secs(),
            ohlc_poll_secs: default_ohlc_poll_secs(),
            ohlc_days: default_ohlc_days(),
            coingecko_base_url: default_coingecko_base_url(),
            requests_per_minute: default_requests_per_minute(),
            price_stream_url: default_price_stream_url(),
            coin_id: default_coin_id(),
            vs_currency: default_vs_currency(),
            bind_addr: default_bind_addr(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse runtime config from {}", path.display()))?;

        info!(
            path = %path.display(),
            feed_mode = %config.feed_mode,
            "runtime config loaded"
        );

        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise runtime config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "runtime config saved (atomic)");
        Ok(())
    }

    /// Reject settings the loops cannot run with.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.seed_price.is_finite() && self.seed_price > 0.0,
            "seed_price must be finite and positive"
        );
        ensure!(self.initial_candles > 0, "initial_candles must be at least 1");
        ensure!(self.max_candles > 0, "max_candles must be at least 1");
        ensure!(self.candle_interval_ms > 0, "candle_interval_ms must be positive");
        ensure!(self.tick_interval_ms > 0, "tick_interval_ms must be positive");
        ensure!(
            self.book_step.is_finite() && self.book_step > 0.0,
            "book_step must be finite and positive"
        );
        ensure!(
            (self.book_depth.saturating_sub(1) as f64) * self.book_step < 1.0,
            "book_depth x book_step reaches the zero price"
        );
        ensure!(self.book_refresh_ms > 0, "book_refresh_ms must be positive");
        ensure!(self.summary_poll_secs > 0, "summary_poll_secs must be positive");
        ensure!(self.ohlc_poll_secs > 0, "ohlc_poll_secs must be positive");
        ensure!(self.ohlc_days > 0, "ohlc_days must be at least 1");
        ensure!(self.requests_per_minute > 0, "requests_per_minute must be at least 1");
        Ok(())
    }

    pub fn synth_params(&self) -> SynthParams {
        SynthParams {
            seed_price: self.seed_price,
            initial_candles: self.initial_candles,
            interval_ms: self.candle_interval_ms,
        }
    }
}
