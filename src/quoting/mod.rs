//! Quote generation
//!
//! A strategy only gets read access to the best bid and offer and returns
//! the orders to rest for the next tick.

mod ladder;

pub use ladder::LadderStrategy;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::orderbook::{Bbo, OrderSide};
use crate::parser::InstrumentInfo;

/// Order type sent to the exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    Limit,
}

impl OrderType {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderType::Limit => "LIMIT",
        }
    }
}

/// Immutable order parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub price: Decimal,
    pub quantity: Decimal,
}

/// Tick sizes of the quoted instrument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instrument {
    pub symbol: String,
    pub quote_tick: Decimal,
    pub base_tick: Decimal,
}

impl From<InstrumentInfo> for Instrument {
    fn from(info: InstrumentInfo) -> Self {
        Self {
            symbol: info.symbol,
            quote_tick: info.quote_tick,
            base_tick: info.base_tick,
        }
    }
}

/// Round `value` to a multiple of `tick`, half to even
pub fn quantize(value: Decimal, tick: Decimal) -> Decimal {
    if tick.is_zero() {
        return value;
    }
    (value / tick).round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven) * tick
}

/// Pluggable quoting formula
pub trait QuotingStrategy: Send + Sync {
    /// Orders to rest for the given top of book. Must be deterministic.
    fn quotes(&self, bbo: &Bbo) -> Vec<QuoteRequest>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_quantize_to_tick() {
        assert_eq!(quantize(dec!(101.202101), dec!(0.01)), dec!(101.20));
        assert_eq!(quantize(dec!(99.8003), dec!(0.01)), dec!(99.80));
        assert_eq!(quantize(dec!(0.00123), dec!(0.0001)), dec!(0.0012));
    }

    #[test]
    fn test_quantize_half_to_even() {
        assert_eq!(quantize(dec!(100.125), dec!(0.01)), dec!(100.12));
        assert_eq!(quantize(dec!(100.135), dec!(0.01)), dec!(100.14));
        assert_eq!(quantize(dec!(12.5), dec!(5)), dec!(10));
    }

    #[test]
    fn test_quantize_zero_tick_is_identity() {
        assert_eq!(quantize(dec!(1.23456), Decimal::ZERO), dec!(1.23456));
    }

    #[test]
    fn test_instrument_from_info() {
        let info = InstrumentInfo {
            symbol: "PERP_BTC_USDT".to_string(),
            quote_tick: dec!(0.1),
            base_tick: dec!(0.0001),
            quote_min: dec!(0),
            quote_max: dec!(100000),
            base_min: dec!(0.0001),
            base_max: dec!(20),
            min_notional: dec!(10),
        };
        let instrument = Instrument::from(info);
        assert_eq!(instrument.quote_tick, dec!(0.1));
        assert_eq!(instrument.base_tick, dec!(0.0001));
    }
}
