use std::collections::VecDeque;

use rand::Rng;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// Price the first synthetic candle opens at.
pub const SEED_PRICE: f64 = 100.0;
/// Number of candles in a freshly generated series.
pub const DEFAULT_CANDLE_COUNT: usize = 30;
/// Width of one synthetic time bucket.
pub const CANDLE_INTERVAL_MS: i64 = 10_000;
/// Default number of candles a series retains.
pub const DEFAULT_CAPACITY: usize = 30;

/// One OHLC aggregation over a fixed time bucket.
///
/// `timestamp` is the bucket's opening time in milliseconds since the epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Candle {
    /// Build a candle that opens at `open` and wanders by a random body and
    /// random wicks. High and low cover the body by construction.
    fn synthetic<R: Rng + ?Sized>(timestamp: i64, open: f64, rng: &mut R) -> Self {
        let close = open + rng.gen_range(-2.5..2.5);
        let high = open.max(close) + rng.gen_range(0.0..2.0);
        let low = open.min(close) - rng.gen_range(0.0..2.0);
        Self {
            timestamp,
            open,
            high,
            low,
            close,
        }
    }

    /// `low <= min(open, close)` and `high >= max(open, close)`.
    pub fn is_well_formed(&self) -> bool {
        self.low <= self.open.min(self.close) && self.high >= self.open.max(self.close)
    }

    /// Absolute move from open to close.
    pub fn change(&self) -> f64 {
        self.close - self.open
    }

    /// Move from open to close as a percentage of the open. Zero when the
    /// open is zero.
    pub fn change_pct(&self) -> f64 {
        if self.open == 0.0 {
            0.0
        } else {
            (self.close - self.open) / self.open * 100.0
        }
    }
}

// ---------------------------------------------------------------------------
// Generator / updater
// ---------------------------------------------------------------------------

/// Produce `count` synthetic candles ending at `now_ms`.
///
/// The first candle opens at `seed_price`; every later one opens at its
/// predecessor's close. Candle `i` starts at `now_ms - (count - i) * interval_ms`,
/// so the last bucket closes exactly at `now_ms`. Each call starts over from
/// the seed and never continues an earlier series.
pub fn generate_initial_data<R: Rng + ?Sized>(
    count: usize,
    seed_price: f64,
    interval_ms: i64,
    now_ms: i64,
    rng: &mut R,
) -> Vec<Candle> {
    let mut candles = Vec::with_capacity(count);
    let mut last_close = seed_price;

    for i in 0..count {
        let timestamp = now_ms - (count - i) as i64 * interval_ms;
        let candle = Candle::synthetic(timestamp, last_close, rng);
        last_close = candle.close;
        candles.push(candle);
    }

    candles
}

/// Apply one intra-bucket tick to the still-open candle.
///
/// Timestamp and open are kept; close moves by up to half a unit and the
/// wicks widen to cover it. High and low never narrow.
pub fn update_current_candle<R: Rng + ?Sized>(candle: &Candle, rng: &mut R) -> Candle {
    let close = candle.close + rng.gen_range(-0.5..0.5);
    Candle {
        high: candle.high.max(close),
        low: candle.low.min(close),
        close,
        ..*candle
    }
}

/// Roll over to a new bucket opening at `previous.close`.
///
/// The timestamp is `now_ms`, bumped past `previous.timestamp` when the clock
/// has not moved far enough to keep the series strictly increasing.
pub fn generate_new_candle<R: Rng + ?Sized>(previous: &Candle, now_ms: i64, rng: &mut R) -> Candle {
    let timestamp = now_ms.max(previous.timestamp + 1);
    Candle::synthetic(timestamp, previous.close, rng)
}

/// Fold a real streamed price into the series.
///
/// While `now_ms` is inside the last candle's bucket the candle's close moves
/// to `price` and its wicks widen. Once the bucket has ended a new candle opens
/// at the previous close, spanning up to `price`. The bucket width is inferred
/// from the series and falls back to `fallback_bucket_ms` for a single candle.
/// An empty series is returned untouched.
pub fn fold_price(
    series: CandleSeries,
    price: f64,
    now_ms: i64,
    fallback_bucket_ms: i64,
) -> CandleSeries {
    let Some(last) = series.last().copied() else {
        return series;
    };

    let bucket_ms = series.bucket_ms().unwrap_or(fallback_bucket_ms);
    if now_ms < last.timestamp + bucket_ms {
        let updated = Candle {
            high: last.high.max(price),
            low: last.low.min(price),
            close: price,
            ..last
        };
        return series.replace_last(updated);
    }

    // Align the new candle to the bucket grid of the series.
    let buckets_elapsed = (now_ms - last.timestamp) / bucket_ms;
    let timestamp = last.timestamp + buckets_elapsed * bucket_ms;
    let open = last.close;
    let candle = Candle {
        timestamp,
        open,
        high: open.max(price),
        low: open.min(price),
        close: price,
    };
    series.push(candle).0
}

// ---------------------------------------------------------------------------
// CandleSeries -- bounded sliding window
// ---------------------------------------------------------------------------

/// Ordered, capacity-bounded window of candles (oldest first).
///
/// Operations take `self` by value and hand back the new series, so a series
/// is only ever changed by whoever owns it.
#[derive(Debug, Clone, PartialEq)]
pub struct CandleSeries {
    candles: VecDeque<Candle>,
    capacity: usize,
}

impl CandleSeries {
    /// Build a series from `candles`, keeping only the newest `capacity`.
    /// A capacity of zero is treated as one.
    pub fn new(candles: impl IntoIterator<Item = Candle>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut ring: VecDeque<Candle> = candles.into_iter().collect();
        while ring.len() > capacity {
            ring.pop_front();
        }
        Self {
            candles: ring,
            capacity,
        }
    }

    /// Swap the newest candle for `candle`. On an empty series the candle
    /// becomes the only element.
    pub fn replace_last(mut self, candle: Candle) -> Self {
        match self.candles.back_mut() {
            Some(last) => *last = candle,
            None => self.candles.push_back(candle),
        }
        self
    }

    /// Append `candle`, evicting the oldest one when the series would exceed
    /// its capacity. The evicted candle is returned alongside the new series.
    pub fn push(mut self, candle: Candle) -> (Self, Option<Candle>) {
        self.candles.push_back(candle);
        let evicted = if self.candles.len() > self.capacity {
            self.candles.pop_front()
        } else {
            None
        };
        (self, evicted)
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.back()
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn to_vec(&self) -> Vec<Candle> {
        self.candles.iter().copied().collect()
    }

    /// Spacing between the two newest candles, if there are two and the
    /// spacing is positive.
    pub fn bucket_ms(&self) -> Option<i64> {
        let n = self.candles.len();
        if n < 2 {
            return None;
        }
        let spacing = self.candles[n - 1].timestamp - self.candles[n - 2].timestamp;
        (spacing > 0).then_some(spacing)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
