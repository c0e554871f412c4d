// =============================================================================
// Display formatting — prices, amounts, and the price header
// =============================================================================
//
// Output is locale-independent: comma thousands separators and a period
// decimal point, always.
// =============================================================================

use serde::Serialize;

use crate::coingecko::client::MarketSummary;
use crate::market_data::Candle;

/// Render `price` with two decimals and comma-grouped thousands,
/// e.g. `1234567.891` → `"1,234,567.89"`.
pub fn format_price(price: f64) -> String {
    let fixed = format!("{price:.2}");
    let (sign, unsigned) = match fixed.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", fixed.as_str()),
    };
    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (unsigned, None),
    };

    let mut out = String::with_capacity(fixed.len() + int_part.len() / 3);
    out.push_str(sign);
    out.push_str(&group_thousands(int_part));
    if let Some(frac) = frac_part {
        out.push('.');
        out.push_str(frac);
    }
    out
}

fn group_thousands(digits: &str) -> String {
    // Non-digit input (NaN, inf) passes through untouched.
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return digits.to_string();
    }
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Order-book amounts are shown with four decimals.
pub fn format_amount(amount: f64) -> String {
    format!("{amount:.4}")
}

/// Two-decimal percentage with a trailing `%`.
pub fn format_percent(pct: f64) -> String {
    format!("{pct:.2}%")
}

// ---------------------------------------------------------------------------
// Price header
// ---------------------------------------------------------------------------

/// The ticker block shown above the chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceHeader {
    pub ticker: &'static str,
    pub name: &'static str,
    /// e.g. `$67,123.45`
    pub price: String,
    /// e.g. `$-123.40 (-0.18%)`
    pub change: String,
    pub is_up: bool,
}

impl PriceHeader {
    fn build(price: f64, change: f64, change_pct: f64) -> Self {
        Self {
            ticker: "BTC",
            name: "Bitcoin",
            price: format!("${}", format_price(price)),
            change: format!("${change:.2} ({})", format_percent(change_pct)),
            is_up: change >= 0.0,
        }
    }

    /// Header from the 24h market summary. A streamed tick, when present,
    /// replaces the summary's price but not its 24h change.
    pub fn from_summary(summary: &MarketSummary, live_price: Option<f64>) -> Self {
        Self::build(
            live_price.unwrap_or(summary.current_price),
            summary.price_change_24h,
            summary.price_change_percentage_24h,
        )
    }

    /// Header from the open chart candle: its close and its move since open.
    pub fn from_candle(candle: &Candle) -> Self {
        Self::build(candle.close, candle.change(), candle.change_pct())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_thousands() {
        assert_eq!(format_price(1_234_567.891), "1,234,567.89");
        assert_eq!(format_price(1_000.0), "1,000.00");
        assert_eq!(format_price(999.0), "999.00");
        assert_eq!(format_price(100_000.0), "100,000.00");
    }

    #[test]
    fn zero_and_small_values() {
        assert_eq!(format_price(0.0), "0.00");
        assert_eq!(format_price(0.004), "0.00");
        assert_eq!(format_price(12.5), "12.50");
    }

    #[test]
    fn rounds_to_two_decimals() {
        // The nearest f64 to 999.995 sits just above the midpoint.
        assert_eq!(format_price(999.995), "1,000.00");
        assert_eq!(format_price(999.994), "999.99");
        assert_eq!(format_price(999.996), "1,000.00");
        assert_eq!(format_price(1.005_000_1), "1.01");
    }

    #[test]
    fn negative_values_keep_sign_outside_grouping() {
        assert_eq!(format_price(-1_234.5), "-1,234.50");
        assert_eq!(format_price(-12.0), "-12.00");
    }

    #[test]
    fn non_finite_passes_through() {
        assert_eq!(format_price(f64::NAN), "NaN");
        assert_eq!(format_price(f64::INFINITY), "inf");
    }

    #[test]
    fn amount_and_percent() {
        assert_eq!(format_amount(1.23456), "1.2346");
        assert_eq!(format_amount(5.0), "5.0000");
        assert_eq!(format_percent(-0.456), "-0.46%");
    }

    #[test]
    fn header_from_candle() {
        let candle = Candle {
            timestamp: 0,
            open: 100.0,
            high: 103.0,
            low: 99.0,
            close: 102.0,
        };
        let header = PriceHeader::from_candle(&candle);
        assert_eq!(header.price, "$102.00");
        assert_eq!(header.change, "$2.00 (2.00%)");
        assert!(header.is_up);
    }

    #[test]
    fn header_from_summary_prefers_live_price() {
        let summary = MarketSummary {
            current_price: 67_000.0,
            price_change_24h: -1_234.5,
            price_change_percentage_24h: -1.8,
            high_24h: 69_000.0,
            low_24h: 66_000.0,
        };
        let header = PriceHeader::from_summary(&summary, Some(67_123.456));
        assert_eq!(header.price, "$67,123.46");
        assert_eq!(header.change, "$-1234.50 (-1.80%)");
        assert!(!header.is_up);

        let header = PriceHeader::from_summary(&summary, None);
        assert_eq!(header.price, "$67,000.00");
    }
}
