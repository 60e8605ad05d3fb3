//! Order book metrics calculation

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{PriceLevelBook, Side};

/// Quote notional used to probe the impact spread
const IMPACT_NOTIONAL: Decimal = Decimal::from_parts(10_000, 0, 0, false, 0);

/// Band around the mid (1%) used for the depth metric
const DEPTH_BAND: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Computed metrics for an order book
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderBookMetrics {
    /// Mid price (average of best bid and ask)
    pub mid_price: Option<Decimal>,

    /// Spread in basis points
    pub spread_bps: Option<Decimal>,

    /// Relative buy/sell fill gap for a 10k quote notional probe
    pub impact_spread: Option<Decimal>,

    /// Notional resting within 1% of the mid
    pub depth_1pct: Option<Decimal>,

    /// Number of bid levels
    pub bid_levels: usize,

    /// Number of ask levels
    pub ask_levels: usize,
}

impl OrderBookMetrics {
    pub fn compute(book: &PriceLevelBook) -> Self {
        Self {
            mid_price: book.mid_price(),
            spread_bps: book.spread_bps(),
            impact_spread: book.impact_spread(IMPACT_NOTIONAL),
            depth_1pct: book.depth_within_distance(DEPTH_BAND).ok(),
            bid_levels: book.level_count(Side::Bid),
            ask_levels: book.level_count(Side::Ask),
        }
    }

    /// Check if the order book is healthy (has valid data)
    pub fn is_healthy(&self) -> bool {
        self.mid_price.is_some()
            && self.spread_bps.is_some()
            && self.bid_levels > 0
            && self.ask_levels > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{OrderBookSnapshot, PriceLevel};
    use rust_decimal_macros::dec;

    #[test]
    fn test_constants() {
        assert_eq!(IMPACT_NOTIONAL, dec!(10000));
        assert_eq!(DEPTH_BAND, dec!(0.01));
    }

    #[test]
    fn test_metrics_on_one_sided_book() {
        let snapshot = OrderBookSnapshot {
            sequence: 7,
            bids: vec![PriceLevel {
                price: dec!(10),
                quantity: dec!(5),
            }],
            asks: vec![],
        };
        let metrics = PriceLevelBook::from_snapshot("X", &snapshot).metrics();
        assert!(!metrics.is_healthy());
        assert_eq!(metrics.bid_levels, 1);
        assert_eq!(metrics.depth_1pct, None);
        assert_eq!(metrics.impact_spread, None);
    }
}
