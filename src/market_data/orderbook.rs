// =============================================================================
// Order Book Synthesizer — two-sided depth ladder from a single price
// =============================================================================
//
// Every call builds a fresh book around the reference price; nothing carries
// over from the previous book. Level `i` sits `i * step` (relative) away from
// the reference on each side (never closer than one cent), with a random
// amount and a running total.
// =============================================================================

use anyhow::{ensure, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::format::{format_amount, format_price};

/// Levels per side.
pub const DEFAULT_DEPTH: usize = 20;
/// Relative distance between adjacent levels (1 basis point).
pub const DEFAULT_STEP: f64 = 0.0001;

const PRICE_DECIMALS: i32 = 2;
/// Smallest displayable price increment.
const PRICE_TICK: f64 = 0.01;
const AMOUNT_DECIMALS: i32 = 4;

/// One price level. `total` is the cumulative amount from the best level
/// out to this one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderBookEntry {
    pub price: f64,
    pub amount: f64,
    pub total: f64,
}

/// Bids best-first (descending), asks best-first (ascending).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OrderBook {
    pub bids: Vec<OrderBookEntry>,
    pub asks: Vec<OrderBookEntry>,
}

/// Relative weight of both sides, as drawn by the depth bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DepthSummary {
    pub best_bid: f64,
    pub best_ask: f64,
    /// Deepest cumulative bid total.
    pub bid_depth: f64,
    /// Deepest cumulative ask total.
    pub ask_depth: f64,
    /// Bid share of combined depth, 0..=100.
    pub bid_pct: f64,
    /// Ask share of combined depth, 0..=100.
    pub ask_pct: f64,
    /// (bid - ask) / (bid + ask), -1..=+1.
    pub imbalance: f64,
}

/// One rendered row of the book: bid on the left, ask on the right.
/// Missing sides render as `-`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderBookRow {
    pub bid_amount: String,
    pub bid_price: String,
    pub ask_price: String,
    pub ask_amount: String,
    /// Width of the bid depth bar, percent of the deepest bid total.
    pub bid_fill_pct: f64,
    /// Width of the ask depth bar, percent of the deepest ask total.
    pub ask_fill_pct: f64,
}

/// Synthesize a book of `depth` levels per side around `reference_price`.
///
/// Levels sit `reference_price * step` apart, widened to one price tick
/// when that distance is finer than the tick, so the rounded ladder is
/// strictly ordered for any positive price. Fails when the reference price
/// or step is not a finite positive number, or when the deepest bid would
/// fall below one tick.
pub fn generate_order_book_data<R: Rng + ?Sized>(
    reference_price: f64,
    depth: usize,
    step: f64,
    rng: &mut R,
) -> Result<OrderBook> {
    ensure!(
        reference_price.is_finite() && reference_price > 0.0,
        "reference price must be finite and positive, got {reference_price}"
    );
    ensure!(
        step.is_finite() && step > 0.0,
        "level step must be finite and positive, got {step}"
    );

    let spacing = (reference_price * step).max(PRICE_TICK);
    let deepest_bid = reference_price - depth.saturating_sub(1) as f64 * spacing;
    ensure!(
        depth == 0 || deepest_bid >= PRICE_TICK,
        "depth {depth} at step {step} would push bids around {reference_price} to zero or below"
    );

    let mut bids: Vec<OrderBookEntry> = Vec::with_capacity(depth);
    let mut asks: Vec<OrderBookEntry> = Vec::with_capacity(depth);
    let mut bid_total = 0.0;
    let mut ask_total = 0.0;

    for i in 0..depth {
        let offset = i as f64 * spacing;

        // Rounding can land two levels on the same cent; step past the
        // previous level instead.
        let mut bid_price = round_to(reference_price - offset, PRICE_DECIMALS);
        if let Some(prev) = bids.last() {
            if bid_price >= prev.price {
                bid_price = round_to(prev.price - PRICE_TICK, PRICE_DECIMALS);
            }
        }
        let mut ask_price = round_to(reference_price + offset, PRICE_DECIMALS);
        if let Some(prev) = asks.last() {
            if ask_price <= prev.price {
                ask_price = round_to(prev.price + PRICE_TICK, PRICE_DECIMALS);
            }
        }

        let bid_amount = rng.gen_range(0.1..5.1);
        bid_total += bid_amount;
        bids.push(entry(bid_price, bid_amount, bid_total));

        let ask_amount = rng.gen_range(0.1..5.1);
        ask_total += ask_amount;
        asks.push(entry(ask_price, ask_amount, ask_total));
    }

    // Display order is a separate contract from generation order.
    bids.sort_by(|a, b| b.price.total_cmp(&a.price));
    asks.sort_by(|a, b| a.price.total_cmp(&b.price));

    Ok(OrderBook { bids, asks })
}

fn entry(price: f64, amount: f64, total: f64) -> OrderBookEntry {
    OrderBookEntry {
        price: round_to(price, PRICE_DECIMALS),
        amount: round_to(amount, AMOUNT_DECIMALS),
        total: round_to(total, AMOUNT_DECIMALS),
    }
}

/// Round half away from zero to `decimals` places.
fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

impl OrderBook {
    /// Largest cumulative total on the bid side.
    pub fn max_bid_total(&self) -> f64 {
        max_total(&self.bids)
    }

    /// Largest cumulative total on the ask side.
    pub fn max_ask_total(&self) -> f64 {
        max_total(&self.asks)
    }

    /// Summarise the book for the depth bar. `None` when either side is empty.
    pub fn depth_summary(&self) -> Option<DepthSummary> {
        let best_bid = self.bids.first()?.price;
        let best_ask = self.asks.first()?.price;
        let bid_depth = self.max_bid_total();
        let ask_depth = self.max_ask_total();

        let total_depth = bid_depth + ask_depth;
        let (bid_pct, ask_pct, imbalance) = if total_depth > 0.0 {
            (
                bid_depth / total_depth * 100.0,
                ask_depth / total_depth * 100.0,
                (bid_depth - ask_depth) / total_depth,
            )
        } else {
            (50.0, 50.0, 0.0)
        };

        Some(DepthSummary {
            best_bid,
            best_ask,
            bid_depth,
            ask_depth,
            bid_pct,
            ask_pct,
            imbalance,
        })
    }

    /// Pair up bids and asks level by level for display.
    pub fn display_rows(&self) -> Vec<OrderBookRow> {
        let max_bid = self.max_bid_total();
        let max_ask = self.max_ask_total();
        let rows = self.bids.len().max(self.asks.len());

        (0..rows)
            .map(|i| {
                let bid = self.bids.get(i);
                let ask = self.asks.get(i);
                OrderBookRow {
                    bid_amount: bid.map_or_else(|| "-".to_string(), |b| format_amount(b.amount)),
                    bid_price: bid.map_or_else(|| "-".to_string(), |b| format_price(b.price)),
                    ask_price: ask.map_or_else(|| "-".to_string(), |a| format_price(a.price)),
                    ask_amount: ask.map_or_else(|| "-".to_string(), |a| format_amount(a.amount)),
                    bid_fill_pct: bid.map_or(0.0, |b| fill_pct(b.total, max_bid)),
                    ask_fill_pct: ask.map_or(0.0, |a| fill_pct(a.total, max_ask)),
                }
            })
            .collect()
    }
}

fn max_total(side: &[OrderBookEntry]) -> f64 {
    side.iter().map(|e| e.total).fold(0.0, f64::max)
}

fn fill_pct(total: f64, max: f64) -> f64 {
    if max > 0.0 {
        total / max * 100.0
    } else {
        0.0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn book(price: f64, seed: u64) -> OrderBook {
        let mut rng = StdRng::seed_from_u64(seed);
        generate_order_book_data(price, DEFAULT_DEPTH, DEFAULT_STEP, &mut rng).expect("valid book")
    }

    #[test]
    fn both_sides_have_requested_depth() {
        let ob = book(50_000.0, 1);
        assert_eq!(ob.bids.len(), 20);
        assert_eq!(ob.asks.len(), 20);
    }

    #[test]
    fn ladder_steps_by_one_basis_point() {
        let ob = book(50_000.0, 2);
        for (i, (bid, ask)) in ob.bids.iter().zip(&ob.asks).enumerate() {
            let offset = 5.0 * i as f64;
            assert!((bid.price - (50_000.0 - offset)).abs() < 1e-9);
            assert!((ask.price - (50_000.0 + offset)).abs() < 1e-9);
        }
    }

    #[test]
    fn prices_strictly_monotonic_and_totals_strictly_increasing() {
        for seed in 0..50 {
            let price = 100.0 + seed as f64 * 1_337.77;
            let ob = book(price, seed);
            for w in ob.bids.windows(2) {
                assert!(w[0].price > w[1].price);
                assert!(w[1].total > w[0].total);
            }
            for w in ob.asks.windows(2) {
                assert!(w[0].price < w[1].price);
                assert!(w[1].total > w[0].total);
            }
        }
    }

    #[test]
    fn amounts_in_range_and_totals_accumulate() {
        let ob = book(67_000.0, 9);
        for side in [&ob.bids, &ob.asks] {
            let mut running = 0.0;
            for e in side.iter() {
                assert!(e.amount >= 0.1 && e.amount <= 5.1);
                running += e.amount;
                // Each field is rounded on its own, so allow drift of a few
                // units in the last place.
                assert!((e.total - running).abs() < 1e-3);
            }
        }
    }

    #[test]
    fn values_are_rounded_for_display() {
        let ob = book(12_345.678, 4);
        for e in ob.bids.iter().chain(&ob.asks) {
            assert!(((e.price * 100.0).round() - e.price * 100.0).abs() < 1e-6);
            assert!(((e.amount * 1e4).round() - e.amount * 1e4).abs() < 1e-6);
        }
    }

    #[test]
    fn rejects_non_positive_and_non_finite_prices() {
        let mut rng = StdRng::seed_from_u64(0);
        for bad in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(generate_order_book_data(bad, 20, DEFAULT_STEP, &mut rng).is_err());
        }
    }

    #[test]
    fn low_prices_widen_to_one_tick() {
        for (seed, price) in [(1, 50.0), (2, 95.0), (3, 99.0), (4, 99.5)] {
            let ob = book(price, seed);
            assert_eq!(ob.bids.len(), 20);
            assert_eq!(ob.asks.len(), 20);
            for w in ob.bids.windows(2) {
                assert!(w[0].price > w[1].price, "bids at {price}");
                assert!((w[0].price - w[1].price - 0.01).abs() < 1e-9);
            }
            for w in ob.asks.windows(2) {
                assert!(w[0].price < w[1].price, "asks at {price}");
                assert!((w[1].price - w[0].price - 0.01).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn ladder_at_fifty_steps_by_one_cent() {
        let ob = book(50.0, 6);
        assert_eq!(ob.bids[0].price, 50.0);
        assert_eq!(ob.bids[19].price, 49.81);
        assert_eq!(ob.asks[19].price, 50.19);
    }

    #[test]
    fn prices_from_one_to_two_hundred_always_yield_a_book() {
        let mut rng = StdRng::seed_from_u64(21);
        for i in 10..=2_000 {
            let price = i as f64 * 0.1;
            assert!(
                generate_order_book_data(price, DEFAULT_DEPTH, DEFAULT_STEP, &mut rng)
                    .map(|ob| ob.bids.windows(2).all(|w| w[0].price > w[1].price))
                    .unwrap_or(false),
                "no ordered book at {price}"
            );
        }
    }

    #[test]
    fn rejects_price_too_small_for_the_ladder() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(generate_order_book_data(0.1, 20, DEFAULT_STEP, &mut rng).is_err());
        assert!(generate_order_book_data(0.1, 5, DEFAULT_STEP, &mut rng).is_ok());
    }

    #[test]
    fn rejects_ladder_reaching_zero() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(generate_order_book_data(50_000.0, 20, 0.1, &mut rng).is_err());
        assert!(generate_order_book_data(50_000.0, 20, 0.0, &mut rng).is_err());
    }

    #[test]
    fn zero_depth_yields_empty_book() {
        let mut rng = StdRng::seed_from_u64(0);
        let ob = generate_order_book_data(50_000.0, 0, DEFAULT_STEP, &mut rng).unwrap();
        assert!(ob.bids.is_empty() && ob.asks.is_empty());
        assert!(ob.depth_summary().is_none());
    }

    #[test]
    fn depth_summary_shares_add_up() {
        let ob = book(30_000.0, 8);
        let summary = ob.depth_summary().unwrap();
        assert_eq!(summary.best_bid, 30_000.0);
        assert_eq!(summary.best_ask, 30_000.0);
        assert!((summary.bid_pct + summary.ask_pct - 100.0).abs() < 1e-9);
        assert_eq!(summary.bid_depth, ob.bids[19].total);
        assert!(summary.imbalance.abs() <= 1.0);
    }

    #[test]
    fn display_rows_format_and_fill() {
        let ob = OrderBook {
            bids: vec![
                OrderBookEntry { price: 1_000.0, amount: 1.0, total: 1.0 },
                OrderBookEntry { price: 999.9, amount: 3.0, total: 4.0 },
            ],
            asks: vec![OrderBookEntry { price: 1_000.1, amount: 2.5, total: 2.5 }],
        };
        let rows = ob.display_rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].bid_price, "1,000.00");
        assert_eq!(rows[0].bid_amount, "1.0000");
        assert_eq!(rows[0].ask_price, "1,000.10");
        assert!((rows[0].bid_fill_pct - 25.0).abs() < 1e-9);
        assert!((rows[0].ask_fill_pct - 100.0).abs() < 1e-9);
        assert_eq!(rows[1].ask_price, "-");
        assert_eq!(rows[1].ask_amount, "-");
        assert_eq!(rows[1].ask_fill_pct, 0.0);
    }

    #[test]
    fn round_to_half_away_from_zero() {
        assert_eq!(round_to(2.5, 0), 3.0);
        assert_eq!(round_to(-2.5, 0), -3.0);
        assert_eq!(round_to(1.23456, 4), 1.2346);
    }
}
