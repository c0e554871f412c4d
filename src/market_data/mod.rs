pub mod candles;
pub mod orderbook;
pub mod price_stream;
pub mod ticker;

// Re-export the core records for convenient access (e.g. `use crate::market_data::Candle`).
pub use candles::{Candle, CandleSeries};
pub use orderbook::OrderBook;
pub use price_stream::LivePrice;
pub use ticker::{CandleTicker, SynthParams, TickAction};
