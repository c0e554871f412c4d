// =============================================================================
// CoinGecko REST Client — market summary and historical OHLC
// =============================================================================
//
// Only public market-data endpoints are used. A demo API key, when configured,
// travels as the `x-cg-demo-api-key` header and is never logged.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use super::rate_limit::RequestBudget;
use crate::market_data::Candle;

/// Header carrying the demo-plan API key.
const API_KEY_HEADER: &str = "x-cg-demo-api-key";

/// 24h market figures for the tracked asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSummary {
    pub current_price: f64,
    pub price_change_24h: f64,
    pub price_change_percentage_24h: f64,
    pub high_24h: f64,
    pub low_24h: f64,
}

#[derive(Clone)]
pub struct CoinGeckoClient {
    base_url: String,
    coin_id: String,
    vs_currency: String,
    budget: Arc<RequestBudget>,
    client: reqwest::Client,
}

impl CoinGeckoClient {
    // -------------------------------------------------------------------------
    // Construction
    // -------------------------------------------------------------------------

    /// Build a client for `coin_id` priced in `vs_currency`.
    ///
    /// An empty `api_key` sends no key header.
    pub fn new(
        base_url: impl Into<String>,
        api_key: &str,
        coin_id: impl Into<String>,
        vs_currency: impl Into<String>,
        budget: Arc<RequestBudget>,
    ) -> Result<Self> {
        let mut default_headers = HeaderMap::new();
        if !api_key.is_empty() {
            let val = HeaderValue::from_str(api_key).context("API key is not a valid header value")?;
            default_headers.insert(API_KEY_HEADER, val);
        }

        let client = reqwest::Client::builder()
            .default_headers(default_headers)
            .timeout(Duration::from_secs(10))
            .build()
            .context("failed to build reqwest client")?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        debug!(base_url = %base_url, keyed = !api_key.is_empty(), "CoinGeckoClient initialised");

        Ok(Self {
            base_url,
            coin_id: coin_id.into(),
            vs_currency: vs_currency.into(),
            budget,
            client,
        })
    }

    // -------------------------------------------------------------------------
    // Endpoints
    // -------------------------------------------------------------------------

    /// GET /coins/{id} with only the market-data section enabled.
    #[instrument(skip(self), name = "coingecko::market_summary")]
    pub async fn fetch_market_summary(&self) -> Result<MarketSummary> {
        let url = format!("{}/coins/{}", self.base_url, self.coin_id);
        let body = self
            .get_json(
                &url,
                &[
                    ("localization", "false"),
                    ("tickers", "false"),
                    ("market_data", "true"),
                    ("community_data", "false"),
                    ("developer_data", "false"),
                    ("sparkline", "false"),
                ],
            )
            .await?;

        let summary = parse_market_summary(&body, &self.vs_currency)?;
        debug!(price = summary.current_price, "market summary fetched");
        Ok(summary)
    }

    /// GET /coins/{id}/ohlc for the last `days` days.
    #[instrument(skip(self), name = "coingecko::ohlc")]
    pub async fn fetch_ohlc(&self, days: u32) -> Result<Vec<Candle>> {
        let url = format!("{}/coins/{}/ohlc", self.base_url, self.coin_id);
        let days = days.to_string();
        let body = self
            .get_json(&url, &[("vs_currency", self.vs_currency.as_str()), ("days", days.as_str())])
            .await?;

        let candles = parse_ohlc(&body)?;
        debug!(count = candles.len(), "ohlc fetched");
        Ok(candles)
    }

    // -------------------------------------------------------------------------
    // Internal helpers
    // -------------------------------------------------------------------------

    async fn get_json(&self, url: &str, query: &[(&str, &str)]) -> Result<serde_json::Value> {
        if !self.budget.try_acquire() {
            anyhow::bail!("request budget exhausted, skipping GET {url}");
        }

        let resp = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .with_context(|| format!("GET {url} request failed"))?;

        let status = resp.status();
        self.budget.record_response(status, resp.headers());

        let text = resp
            .text()
            .await
            .with_context(|| format!("failed to read response body from {url}"))?;

        decode_body(url, status, &text)
    }
}

/// Longest slice of an error body quoted in the error message.
const ERROR_BODY_PREVIEW: usize = 200;

/// Check the status first so that rate-limit and gateway pages, which are
/// rarely JSON, still report their status code.
fn decode_body(url: &str, status: reqwest::StatusCode, text: &str) -> Result<serde_json::Value> {
    if !status.is_success() {
        let preview: String = text.trim().chars().take(ERROR_BODY_PREVIEW).collect();
        anyhow::bail!("CoinGecko GET {url} returned {status}: {preview}");
    }

    serde_json::from_str(text).with_context(|| format!("failed to parse response from {url}"))
}

impl std::fmt::Debug for CoinGeckoClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoinGeckoClient")
            .field("base_url", &self.base_url)
            .field("coin_id", &self.coin_id)
            .field("vs_currency", &self.vs_currency)
            .finish()
    }
}

// -----------------------------------------------------------------------------
// Parsing
// -----------------------------------------------------------------------------

/// Extract the summary from a `/coins/{id}` body.
///
/// Per-currency figures live under `market_data.<field>.<currency>`; the 24h
/// change fields are plain numbers.
pub fn parse_market_summary(body: &serde_json::Value, vs_currency: &str) -> Result<MarketSummary> {
    let md = body
        .get("market_data")
        .context("response missing 'market_data'")?;

    let per_currency = |field: &str| -> Result<f64> {
        md[field][vs_currency]
            .as_f64()
            .with_context(|| format!("missing field market_data.{field}.{vs_currency}"))
    };
    let plain = |field: &str| -> Result<f64> {
        md[field]
            .as_f64()
            .with_context(|| format!("missing field market_data.{field}"))
    };

    Ok(MarketSummary {
        current_price: per_currency("current_price")?,
        price_change_24h: plain("price_change_24h")?,
        price_change_percentage_24h: plain("price_change_percentage_24h")?,
        high_24h: per_currency("high_24h")?,
        low_24h: per_currency("low_24h")?,
    })
}

/// Parse `[[timestamp, open, high, low, close], ...]` into candles.
///
/// Malformed rows, including candles whose high/low do not bound the body,
/// are skipped with a warning. The result is sorted by
/// timestamp with duplicate timestamps removed (the later row wins).
pub fn parse_ohlc(body: &serde_json::Value) -> Result<Vec<Candle>> {
    let rows = body.as_array().context("ohlc response is not an array")?;

    let mut candles = Vec::with_capacity(rows.len());
    for row in rows {
        match parse_ohlc_row(row) {
            Some(candle) => candles.push(candle),
            None => warn!(row = %row, "skipping malformed ohlc row"),
        }
    }

    // Stable sort keeps the later of two equal timestamps last.
    candles.sort_by_key(|c| c.timestamp);
    let mut deduped: Vec<Candle> = Vec::with_capacity(candles.len());
    for candle in candles {
        match deduped.last_mut() {
            Some(last) if last.timestamp == candle.timestamp => *last = candle,
            _ => deduped.push(candle),
        }
    }

    Ok(deduped)
}

fn parse_ohlc_row(row: &serde_json::Value) -> Option<Candle> {
    let arr = row.as_array()?;
    if arr.len() < 5 {
        return None;
    }
    let timestamp = arr[0].as_i64().or_else(|| arr[0].as_f64().map(|t| t as i64))?;
    let candle = Candle {
        timestamp,
        open: arr[1].as_f64()?,
        high: arr[2].as_f64()?,
        low: arr[3].as_f64()?,
        close: arr[4].as_f64()?,
    };
    candle.is_well_formed().then_some(candle)
}
