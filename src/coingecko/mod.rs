pub mod client;
pub mod rate_limit;

pub use client::{CoinGeckoClient, MarketSummary};
pub use rate_limit::RequestBudget;
