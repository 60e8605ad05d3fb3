//! WOO X Market Maker Library
//!
//! Keeps a synchronized order book plus position and balance tables for one
//! symbol from REST snapshots and WebSocket updates, and quotes a ladder
//! around the best bid and offer.

use std::sync::Arc;

pub mod account;
pub mod config;
pub mod engine;
pub mod error;
pub mod exchange;
pub mod orderbook;
pub mod parser;
pub mod quoting;
pub mod telemetry;
pub mod websocket;

pub use config::Config;
pub use engine::{Orchestrator, Readiness, ResourceStatus};
pub use error::{BookError, MarketMakerError, Result};
pub use orderbook::{BookSynchronizer, OrderBookMetrics, PriceLevelBook};
pub use parser::{DepthUpdate, OrderBookSnapshot, TopicMessage};
pub use telemetry::Metrics;

/// Application state shared with the health server
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub metrics: Arc<Metrics>,
    pub config: Arc<Config>,
}
