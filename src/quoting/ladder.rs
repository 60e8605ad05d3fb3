//! Symmetric geometric ladder around the best bid and offer

use rust_decimal::Decimal;

use super::{quantize, Instrument, OrderType, QuoteRequest, QuotingStrategy};
use crate::orderbook::{Bbo, OrderSide};

/// `count` asks at `ask·(1+spread)^k` and `count` bids at `bid·(1+spread)^-k`,
/// emitted from the outermost pair inwards.
#[derive(Debug, Clone)]
pub struct LadderStrategy {
    count: u32,
    spread: Decimal,
    quantity: Decimal,
    instrument: Instrument,
}

impl LadderStrategy {
    pub fn new(count: u32, spread: Decimal, size: Decimal, instrument: Instrument) -> Self {
        let quantity = quantize(size, instrument.base_tick);
        Self {
            count,
            spread,
            quantity,
            instrument,
        }
    }

    pub fn quantity(&self) -> Decimal {
        self.quantity
    }

    fn order(&self, side: OrderSide, price: Decimal) -> QuoteRequest {
        QuoteRequest {
            symbol: self.instrument.symbol.clone(),
            side,
            order_type: OrderType::Limit,
            price: quantize(price, self.instrument.quote_tick),
            quantity: self.quantity,
        }
    }
}

impl QuotingStrategy for LadderStrategy {
    fn quotes(&self, bbo: &Bbo) -> Vec<QuoteRequest> {
        let step = Decimal::ONE + self.spread;
        let mut orders = Vec::with_capacity(self.count as usize * 2);

        for k in (1..=self.count).rev() {
            let mut factor = Decimal::ONE;
            for _ in 0..k {
                factor *= step;
            }
            orders.push(self.order(OrderSide::Sell, bbo.ask.price * factor));
            orders.push(self.order(OrderSide::Buy, bbo.bid.price / factor));
        }

        orders
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orderbook::Level;
    use rust_decimal_macros::dec;

    fn instrument() -> Instrument {
        Instrument {
            symbol: "PERP_BTC_USDT".to_string(),
            quote_tick: dec!(0.01),
            base_tick: dec!(0.0001),
        }
    }

    fn bbo(bid: Decimal, ask: Decimal) -> Bbo {
        Bbo {
            bid: Level {
                price: bid,
                quantity: dec!(1),
            },
            ask: Level {
                price: ask,
                quantity: dec!(1),
            },
        }
    }

    #[test]
    fn test_ladder_prices_and_order() {
        let strategy = LadderStrategy::new(2, dec!(0.001), dec!(0.001), instrument());
        let quotes = strategy.quotes(&bbo(dec!(100), dec!(101)));

        let summary: Vec<(OrderSide, Decimal)> =
            quotes.iter().map(|q| (q.side, q.price)).collect();
        assert_eq!(
            summary,
            vec![
                (OrderSide::Sell, dec!(101.20)),
                (OrderSide::Buy, dec!(99.80)),
                (OrderSide::Sell, dec!(101.10)),
                (OrderSide::Buy, dec!(99.90)),
            ]
        );
        assert!(quotes.iter().all(|q| q.quantity == dec!(0.001)));
        assert!(quotes.iter().all(|q| q.order_type == OrderType::Limit));
        assert!(quotes.iter().all(|q| q.symbol == "PERP_BTC_USDT"));
    }

    #[test]
    fn test_ladder_is_deterministic() {
        let strategy = LadderStrategy::new(3, dec!(0.0025), dec!(0.01), instrument());
        let top = bbo(dec!(25000.5), dec!(25001));
        assert_eq!(strategy.quotes(&top), strategy.quotes(&top));
    }

    #[test]
    fn test_quantity_rounded_to_base_tick() {
        let strategy = LadderStrategy::new(1, dec!(0.001), dec!(0.00123), instrument());
        assert_eq!(strategy.quantity(), dec!(0.0012));
    }

    #[test]
    fn test_zero_count_emits_nothing() {
        let strategy = LadderStrategy::new(0, dec!(0.001), dec!(0.001), instrument());
        assert!(strategy.quotes(&bbo(dec!(100), dec!(101))).is_empty());
    }
}
