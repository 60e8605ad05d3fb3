//! Core order book implementation
//!
//! Uses BTreeMap for efficient sorted price level management.

use rust_decimal::Decimal;
use std::cmp::Reverse;
use std::collections::BTreeMap;

use super::{Bbo, Level, OrderBookMetrics, OrderSide, Side};
use crate::error::{BookError, MarketMakerError, Result};
use crate::parser::{DepthUpdate, OrderBookSnapshot, PriceLevel};

/// Price-level order book for a single symbol
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceLevelBook {
    symbol: String,
    /// Bids sorted by price descending (highest first)
    bids: BTreeMap<Reverse<Decimal>, Decimal>,
    /// Asks sorted by price ascending (lowest first)
    asks: BTreeMap<Decimal, Decimal>,
    /// Sequence of the last applied update
    sequence: u64,
}

impl PriceLevelBook {
    /// Build a book from a REST snapshot
    pub fn from_snapshot(symbol: &str, snapshot: &OrderBookSnapshot) -> Self {
        let mut book = Self {
            symbol: symbol.to_string(),
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            sequence: snapshot.sequence,
        };

        for level in &snapshot.bids {
            book.apply_delta(Side::Bid, level.price, level.quantity);
        }
        for level in &snapshot.asks {
            book.apply_delta(Side::Ask, level.price, level.quantity);
        }

        book
    }

    /// Set or remove a single price level. A zero size removes the level.
    pub fn apply_delta(&mut self, side: Side, price: Decimal, size: Decimal) {
        match side {
            Side::Bid => {
                if size.is_zero() {
                    self.bids.remove(&Reverse(price));
                } else {
                    self.bids.insert(Reverse(price), size);
                }
            }
            Side::Ask => {
                if size.is_zero() {
                    self.asks.remove(&price);
                } else {
                    self.asks.insert(price, size);
                }
            }
        }
    }

    /// Apply an incremental update whose `previous_sequence` must match the
    /// book's current sequence.
    ///
    /// On a gap the book is left untouched. A crossed book after applying is
    /// reported as an error; the book is then unusable and must be rebuilt.
    pub fn apply_update(&mut self, update: &DepthUpdate) -> Result<()> {
        if update.previous_sequence != self.sequence || update.sequence <= self.sequence {
            return Err(MarketMakerError::GapDetected {
                expected: self.sequence,
                got: update.previous_sequence,
            });
        }

        self.apply_levels(Side::Bid, &update.bids);
        self.apply_levels(Side::Ask, &update.asks);
        self.sequence = update.sequence;

        if let (Some(bid), Some(ask)) = (self.best_bid(), self.best_ask()) {
            if bid.price >= ask.price {
                return Err(MarketMakerError::CrossedBook {
                    bid: bid.price,
                    ask: ask.price,
                });
            }
        }

        Ok(())
    }

    fn apply_levels(&mut self, side: Side, levels: &[PriceLevel]) {
        for level in levels {
            self.apply_delta(side, level.price, level.quantity);
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Sequence of the last applied update (or of the snapshot)
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Get best bid level
    pub fn best_bid(&self) -> Option<Level> {
        self.bids.first_key_value().map(|(Reverse(p), q)| Level {
            price: *p,
            quantity: *q,
        })
    }

    /// Get best ask level
    pub fn best_ask(&self) -> Option<Level> {
        self.asks.first_key_value().map(|(p, q)| Level {
            price: *p,
            quantity: *q,
        })
    }

    /// Top of book for both sides
    pub fn best_bid_offer(&self) -> std::result::Result<Bbo, BookError> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Ok(Bbo { bid, ask }),
            _ => Err(BookError::EmptyBook),
        }
    }

    /// Get mid price
    pub fn mid_price(&self) -> Option<Decimal> {
        self.best_bid_offer()
            .ok()
            .map(|bbo| (bbo.bid.price + bbo.ask.price) / Decimal::TWO)
    }

    /// Get spread in basis points
    pub fn spread_bps(&self) -> Option<Decimal> {
        let bbo = self.best_bid_offer().ok()?;
        let mid = (bbo.bid.price + bbo.ask.price) / Decimal::TWO;
        if mid > Decimal::ZERO {
            Some((bbo.ask.price - bbo.bid.price) / mid * Decimal::from(10000))
        } else {
            None
        }
    }

    /// Levels from best to worst
    pub fn levels(&self, side: Side) -> Vec<Level> {
        match side {
            Side::Bid => self
                .bids
                .iter()
                .map(|(Reverse(p), q)| Level {
                    price: *p,
                    quantity: *q,
                })
                .collect(),
            Side::Ask => self
                .asks
                .iter()
                .map(|(p, q)| Level {
                    price: *p,
                    quantity: *q,
                })
                .collect(),
        }
    }

    pub fn level_count(&self, side: Side) -> usize {
        match side {
            Side::Bid => self.bids.len(),
            Side::Ask => self.asks.len(),
        }
    }

    /// Average price paid to fill `notional` (quote currency) by walking the
    /// side an order of `side` consumes, best price first.
    ///
    /// Each level contributes at most `price * size` of notional and the
    /// result is weighted by the notional taken at each price.
    pub fn depth_weighted_fill_price(
        &self,
        side: OrderSide,
        notional: Decimal,
    ) -> std::result::Result<Decimal, BookError> {
        match side.consumes() {
            Side::Ask => weighted_fill(self.asks.iter().map(|(p, q)| (*p, *q)), notional),
            Side::Bid => weighted_fill(self.bids.iter().map(|(Reverse(p), q)| (*p, *q)), notional),
        }
    }

    /// Relative gap between the buy and sell fill prices for a symmetric
    /// `notional` probe. `None` when either side cannot absorb it.
    pub fn impact_spread(&self, notional: Decimal) -> Option<Decimal> {
        let buy = self.depth_weighted_fill_price(OrderSide::Buy, notional).ok()?;
        let sell = self.depth_weighted_fill_price(OrderSide::Sell, notional).ok()?;
        if buy.is_zero() {
            return None;
        }
        Some((buy - sell) / buy)
    }

    /// Notional resting on both sides within `distance` (a fraction) of the mid
    pub fn depth_within_distance(
        &self,
        distance: Decimal,
    ) -> std::result::Result<Decimal, BookError> {
        let bbo = self.best_bid_offer()?;
        let mid = (bbo.bid.price + bbo.ask.price) / Decimal::TWO;
        let lower_bound = mid - mid * distance;
        let upper_bound = mid + mid * distance;

        let mut depth = Decimal::ZERO;

        for (Reverse(price), size) in &self.bids {
            if *price < lower_bound {
                break;
            }
            depth += *price * *size;
        }

        for (price, size) in &self.asks {
            if *price > upper_bound {
                break;
            }
            depth += *price * *size;
        }

        Ok(depth)
    }

    /// Calculate order book metrics
    pub fn metrics(&self) -> OrderBookMetrics {
        OrderBookMetrics::compute(self)
    }
}

fn weighted_fill(
    levels: impl Iterator<Item = (Decimal, Decimal)>,
    notional: Decimal,
) -> std::result::Result<Decimal, BookError> {
    if notional <= Decimal::ZERO {
        return Err(BookError::InvalidNotional(notional));
    }

    let mut filled = Decimal::ZERO;
    let mut weighted = Decimal::ZERO;

    for (price, size) in levels {
        let take = (price * size).min(notional - filled);
        weighted += price * take;
        filled += take;

        if filled >= notional {
            return Ok(weighted / notional);
        }
    }

    Err(BookError::InsufficientLiquidity {
        requested: notional,
        available: filled,
    })
}
