//! Exchange collaborators
//!
//! The reconciliation core talks to the exchange only through these two
//! traits: a REST API for snapshots and orders, and a stream transport that
//! yields `{topic, ts, data}` messages per subscription.

mod rest;

pub use rest::WooRestClient;

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::error::Result;
use crate::parser::{BalancesResponse, InstrumentInfo, OrderBookSnapshot, PositionsResponse, TopicMessage};
use crate::quoting::QuoteRequest;

/// Logical WebSocket channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// Public market data
    Public,
    /// Authenticated account data
    Private,
}

/// Messages of one subscription. The stream ends when the connection is
/// lost; the caller resubscribes. A rejected subscription is yielded as a
/// `ProtocolRejected` error.
pub type MessageStream = BoxStream<'static, Result<TopicMessage>>;

#[async_trait]
pub trait StreamTransport: Send + Sync {
    async fn subscribe(&self, channel: Channel, topic: &str) -> Result<MessageStream>;
}

/// REST endpoints used by the core
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RestApi: Send + Sync {
    async fn fetch_orderbook_snapshot(&self, symbol: &str) -> Result<OrderBookSnapshot>;

    async fn fetch_positions(&self) -> Result<PositionsResponse>;

    async fn fetch_balances(&self) -> Result<BalancesResponse>;

    async fn instrument(&self, symbol: &str) -> Result<InstrumentInfo>;

    /// Returns the exchange order id
    async fn submit_order(&self, order: &QuoteRequest) -> Result<u64>;

    async fn cancel_all_orders(&self, symbol: &str) -> Result<()>;
}
