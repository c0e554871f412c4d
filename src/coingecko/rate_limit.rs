// =============================================================================
// Request Budget — keeps CoinGecko polling under the per-minute call cap
// =============================================================================
//
// The public/demo API allows roughly 30 calls per minute. The budget counts
// calls in the current minute (reset by a periodic timer) and, after an HTTP
// 429, blocks every call until the server's `Retry-After` has elapsed.
// =============================================================================

use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};

use chrono::Utc;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Back-off applied after a 429 that carries no usable `Retry-After`.
const DEFAULT_RETRY_AFTER_SECS: i64 = 60;
/// Fraction of the budget at which a warning is logged.
const WARN_FRACTION: f64 = 0.8;

/// Thread-safe per-minute call counter.
pub struct RequestBudget {
    calls_per_minute: u32,
    used_this_minute: AtomicU32,
    /// Epoch milliseconds before which no call may be sent (0 = no back-off).
    blocked_until_ms: AtomicI64,
}

/// Serialisable view of the budget for the state snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestBudgetSnapshot {
    pub calls_per_minute: u32,
    pub used_this_minute: u32,
    pub blocked_for_ms: i64,
}

impl RequestBudget {
    pub fn new(calls_per_minute: u32) -> Self {
        Self {
            calls_per_minute,
            used_this_minute: AtomicU32::new(0),
            blocked_until_ms: AtomicI64::new(0),
        }
    }

    // -------------------------------------------------------------------------
    // Pre-flight
    // -------------------------------------------------------------------------

    /// Reserve one call. Returns `false` when the minute's budget is spent or
    /// a 429 back-off is still running.
    pub fn try_acquire(&self) -> bool {
        self.try_acquire_at(Utc::now().timestamp_millis())
    }

    fn try_acquire_at(&self, now_ms: i64) -> bool {
        let blocked_until = self.blocked_until_ms.load(Ordering::Relaxed);
        if now_ms < blocked_until {
            warn!(
                blocked_for_ms = blocked_until - now_ms,
                "request blocked — server asked us to back off"
            );
            return false;
        }

        let reserved = self
            .used_this_minute
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |used| {
                (used < self.calls_per_minute).then_some(used + 1)
            });

        match reserved {
            Ok(prev) => {
                let used = prev + 1;
                if f64::from(used) >= f64::from(self.calls_per_minute) * WARN_FRACTION {
                    warn!(
                        used,
                        limit = self.calls_per_minute,
                        "request budget nearly spent for this minute"
                    );
                }
                true
            }
            Err(used) => {
                warn!(
                    used,
                    limit = self.calls_per_minute,
                    "request blocked — per-minute budget exhausted"
                );
                false
            }
        }
    }

    // -------------------------------------------------------------------------
    // Response feedback
    // -------------------------------------------------------------------------

    /// Inspect a response. A 429 starts a back-off of `Retry-After` seconds.
    pub fn record_response(&self, status: StatusCode, headers: &reqwest::header::HeaderMap) {
        self.record_response_at(status, headers, Utc::now().timestamp_millis());
    }

    fn record_response_at(
        &self,
        status: StatusCode,
        headers: &reqwest::header::HeaderMap,
        now_ms: i64,
    ) {
        if status != StatusCode::TOO_MANY_REQUESTS {
            return;
        }

        let retry_after_secs = headers
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<i64>().ok())
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_RETRY_AFTER_SECS);

        let until = now_ms + retry_after_secs * 1_000;
        self.blocked_until_ms.fetch_max(until, Ordering::Relaxed);
        warn!(retry_after_secs, "rate limited by CoinGecko — backing off");
    }

    /// Start a new minute (call from a periodic timer).
    pub fn reset_minute(&self) {
        let prev = self.used_this_minute.swap(0, Ordering::Relaxed);
        debug!(used_last_minute = prev, "request budget reset");
    }

    pub fn snapshot(&self) -> RequestBudgetSnapshot {
        let now_ms = Utc::now().timestamp_millis();
        RequestBudgetSnapshot {
            calls_per_minute: self.calls_per_minute,
            used_this_minute: self.used_this_minute.load(Ordering::Relaxed),
            blocked_for_ms: (self.blocked_until_ms.load(Ordering::Relaxed) - now_ms).max(0),
        }
    }
}

impl std::fmt::Debug for RequestBudget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestBudget")
            .field("calls_per_minute", &self.calls_per_minute)
            .field("used_this_minute", &self.used_this_minute.load(Ordering::Relaxed))
            .field("blocked_until_ms", &self.blocked_until_ms.load(Ordering::Relaxed))
            .finish()
    }
}
