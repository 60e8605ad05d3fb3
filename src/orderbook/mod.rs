//! Order book module
//!
//! Maintains a synchronized price-level book from WOO X order book updates
//! and a REST snapshot.

mod book;
mod feed;
mod metrics;
mod sync;

pub use book::PriceLevelBook;
pub use feed::{BookFeed, BookHandle};
pub use metrics::OrderBookMetrics;
pub use sync::{BookSynchronizer, SyncAction, SyncPhase};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Side of the order book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Bid,
    Ask,
}

/// Side of an order; buys consume asks, sells consume bids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// The book side an order of this side fills against
    pub fn consumes(self) -> Side {
        match self {
            OrderSide::Buy => Side::Ask,
            OrderSide::Sell => Side::Bid,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

/// A single level in the order book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Level {
    pub price: Decimal,
    pub quantity: Decimal,
}

/// Best bid and offer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bbo {
    pub bid: Level,
    pub ask: Level,
}
