// =============================================================================
// Live Price Stream — scalar price ticks from the CoinCap prices feed
// =============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use futures_util::StreamExt;
use parking_lot::RwLock;
use tokio_tungstenite::connect_async;
use tracing::{debug, error, info, warn};

/// Latest streamed price, shared between the stream task and its readers.
pub struct LivePrice {
    price: RwLock<Option<f64>>,
    last_update_ms: RwLock<Option<i64>>,
    /// Bumped on every accepted tick so readers can detect fresh data.
    version: AtomicU64,
}

impl LivePrice {
    pub fn new() -> Self {
        Self {
            price: RwLock::new(None),
            last_update_ms: RwLock::new(None),
            version: AtomicU64::new(0),
        }
    }

    /// Record a tick. Non-finite or non-positive prices are dropped.
    pub fn set(&self, price: f64) {
        if !(price.is_finite() && price > 0.0) {
            warn!(price, "ignoring unusable streamed price");
            return;
        }
        *self.price.write() = Some(price);
        *self.last_update_ms.write() = Some(Utc::now().timestamp_millis());
        self.version.fetch_add(1, Ordering::SeqCst);
    }

    pub fn get(&self) -> Option<f64> {
        *self.price.read()
    }

    pub fn last_update_ms(&self) -> Option<i64> {
        *self.last_update_ms.read()
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }
}

impl Default for LivePrice {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Price WebSocket stream
// ---------------------------------------------------------------------------

/// Connect to the prices feed at `url` and push every `asset` tick into
/// `live`.
///
/// Runs until the stream disconnects or an error occurs, then returns so that
/// the caller can handle reconnection.
pub async fn run_price_stream(url: &str, asset: &str, live: &Arc<LivePrice>) -> Result<()> {
    info!(url = %url, asset = %asset, "connecting to price WebSocket");

    let (ws_stream, _response) = connect_async(url)
        .await
        .context("failed to connect to price WebSocket")?;

    info!(asset = %asset, "price WebSocket connected");
    let (_write, mut read) = ws_stream.split();

    loop {
        match read.next().await {
            Some(Ok(msg)) => {
                if let tokio_tungstenite::tungstenite::Message::Text(text) = msg {
                    match parse_price_message(&text, asset) {
                        Ok(Some(price)) => {
                            debug!(asset = %asset, price, "price tick");
                            live.set(price);
                        }
                        Ok(None) => {}
                        Err(e) => {
                            warn!(error = %e, "failed to parse price message");
                        }
                    }
                }
            }
            Some(Err(e)) => {
                error!(asset = %asset, error = %e, "price WebSocket read error");
                return Err(e.into());
            }
            None => {
                warn!(asset = %asset, "price WebSocket stream ended");
                return Ok(());
            }
        }
    }
}

/// Parse a prices-feed message.
///
/// Expected shape (prices arrive as strings):
/// ```json
/// { "bitcoin": "67123.45" }
/// ```
/// Messages that do not mention `asset` yield `Ok(None)`.
fn parse_price_message(text: &str, asset: &str) -> Result<Option<f64>> {
    let root: serde_json::Value =
        serde_json::from_str(text).context("failed to parse price JSON")?;

    let Some(val) = root.get(asset) else {
        return Ok(None);
    };

    let price = match val {
        serde_json::Value::String(s) => s
            .parse::<f64>()
            .with_context(|| format!("failed to parse {asset} price as f64: {s}"))?,
        serde_json::Value::Number(n) => n
            .as_f64()
            .with_context(|| format!("{asset} price is not a valid f64"))?,
        _ => anyhow::bail!("{asset} price has unexpected JSON type"),
    };

    Ok(Some(price))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_string_price() {
        let price = parse_price_message(r#"{"bitcoin":"67123.45"}"#, "bitcoin").unwrap();
        assert_eq!(price, Some(67_123.45));
    }

    #[test]
    fn parse_numeric_price() {
        let price = parse_price_message(r#"{"bitcoin":42000.5,"ethereum":"3000"}"#, "bitcoin").unwrap();
        assert_eq!(price, Some(42_000.5));
    }

    #[test]
    fn other_assets_are_ignored() {
        assert_eq!(parse_price_message(r#"{"ethereum":"3000"}"#, "bitcoin").unwrap(), None);
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(parse_price_message("not json", "bitcoin").is_err());
        assert!(parse_price_message(r#"{"bitcoin":"abc"}"#, "bitcoin").is_err());
        assert!(parse_price_message(r#"{"bitcoin":true}"#, "bitcoin").is_err());
    }

    #[test]
    fn live_price_tracks_version() {
        let live = LivePrice::new();
        assert_eq!(live.get(), None);
        assert_eq!(live.version(), 0);

        live.set(100.0);
        live.set(101.0);
        assert_eq!(live.get(), Some(101.0));
        assert_eq!(live.version(), 2);
        assert!(live.last_update_ms().is_some());

        live.set(f64::NAN);
        live.set(-5.0);
        assert_eq!(live.get(), Some(101.0));
        assert_eq!(live.version(), 2);
    }
}
