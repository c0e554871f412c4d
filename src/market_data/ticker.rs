// =============================================================================
// Candle Ticker — timer-driven update/rollover state machine
// =============================================================================
//
// Every tick either amends the open candle or, once `updates_per_candle`
// amendments have happened, rolls over to a new candle and evicts the oldest
// one beyond capacity. The ticker keeps only its counter; the series is
// passed in and handed back by value.
// =============================================================================

use rand::Rng;

use super::candles::{
    generate_initial_data, generate_new_candle, update_current_candle, Candle, CandleSeries,
};

/// Parameters used when the ticker has to reseed an empty series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SynthParams {
    pub seed_price: f64,
    pub initial_candles: usize,
    pub interval_ms: i64,
}

/// What a single [`CandleTicker::step`] did to the series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickAction {
    /// The series was empty and a fresh one was generated.
    Reseeded,
    /// The open candle was amended in place.
    Updated,
    /// A new candle opened; `evicted` is the candle pushed out the front.
    RolledOver { evicted: Option<Candle> },
}

#[derive(Debug, Clone)]
pub struct CandleTicker {
    counter: u32,
    updates_per_candle: u32,
    params: SynthParams,
}

impl CandleTicker {
    pub fn new(updates_per_candle: u32, params: SynthParams) -> Self {
        Self {
            counter: 0,
            updates_per_candle,
            params,
        }
    }

    /// Number of amendments made to the current candle so far.
    pub fn counter(&self) -> u32 {
        self.counter
    }

    /// Advance one tick.
    pub fn step<R: Rng + ?Sized>(
        &mut self,
        series: CandleSeries,
        now_ms: i64,
        rng: &mut R,
    ) -> (CandleSeries, TickAction) {
        let Some(last) = series.last().copied() else {
            let candles = generate_initial_data(
                self.params.initial_candles,
                self.params.seed_price,
                self.params.interval_ms,
                now_ms,
                rng,
            );
            self.counter = 0;
            return (CandleSeries::new(candles, series.capacity()), TickAction::Reseeded);
        };

        if self.counter < self.updates_per_candle {
            self.counter += 1;
            let updated = update_current_candle(&last, rng);
            (series.replace_last(updated), TickAction::Updated)
        } else {
            self.counter = 0;
            let next = generate_new_candle(&last, now_ms, rng);
            let (series, evicted) = series.push(next);
            (series, TickAction::RolledOver { evicted })
        }
    }
}
