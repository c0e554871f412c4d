// =============================================================================
// Shared types used across the BTC market view service
// =============================================================================

use serde::{Deserialize, Serialize};

/// Where the chart series comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeedMode {
    /// Historical OHLC from the REST source, with streamed ticks folded in.
    Live,
    /// Random-walk candles driven by a local timer. Needs no network.
    Synthetic,
}

impl Default for FeedMode {
    fn default() -> Self {
        Self::Live
    }
}

impl std::fmt::Display for FeedMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Live => write!(f, "Live"),
            Self::Synthetic => write!(f, "Synthetic"),
        }
    }
}

impl std::str::FromStr for FeedMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "live" => Ok(Self::Live),
            "synthetic" => Ok(Self::Synthetic),
            other => anyhow::bail!("unknown feed mode '{other}' (expected live or synthetic)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feed_mode_parses_case_insensitively() {
        assert_eq!("LIVE".parse::<FeedMode>().unwrap(), FeedMode::Live);
        assert_eq!(" synthetic ".parse::<FeedMode>().unwrap(), FeedMode::Synthetic);
        assert!("paper".parse::<FeedMode>().is_err());
    }
}
