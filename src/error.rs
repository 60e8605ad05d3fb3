//! Error types for the market maker

use rust_decimal::Decimal;
use thiserror::Error;

/// Market maker errors
#[derive(Error, Debug)]
pub enum MarketMakerError {
    #[error("WebSocket connection error: {0}")]
    WebSocketConnection(String),

    #[error("WebSocket message error: {0}")]
    WebSocketMessage(String),

    #[error("Failed to parse message: {0}")]
    ParseError(String),

    #[error("REST API error: {0}")]
    RestApiError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Transport closed")]
    TransportClosed,

    #[error("Connection timeout")]
    ConnectionTimeout,

    #[error("Sequence gap: book at {expected}, delta supersedes {got}")]
    GapDetected { expected: u64, got: u64 },

    #[error("Crossed book after update: bid {bid} >= ask {ask}")]
    CrossedBook { bid: Decimal, ask: Decimal },

    #[error("Rejected by exchange: {0}")]
    ProtocolRejected(String),

    #[error("Resource {resource} failed: {reason}")]
    ResourceFailed { resource: String, reason: String },
}

impl MarketMakerError {
    /// Whether a stream worker may recover by resubscribing and rebuilding
    /// its state from a fresh snapshot.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            MarketMakerError::ProtocolRejected(_)
                | MarketMakerError::ConfigError(_)
                | MarketMakerError::ResourceFailed { .. }
        )
    }
}

/// Typed failures of order book analytics
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BookError {
    #[error("Order book side is empty")]
    EmptyBook,

    #[error("Insufficient liquidity: requested {requested}, available {available}")]
    InsufficientLiquidity { requested: Decimal, available: Decimal },

    #[error("Notional must be positive, got {0}")]
    InvalidNotional(Decimal),
}

impl From<tokio_tungstenite::tungstenite::Error> for MarketMakerError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        MarketMakerError::WebSocketConnection(err.to_string())
    }
}

impl From<serde_json::Error> for MarketMakerError {
    fn from(err: serde_json::Error) -> Self {
        MarketMakerError::ParseError(err.to_string())
    }
}

impl From<reqwest::Error> for MarketMakerError {
    fn from(err: reqwest::Error) -> Self {
        MarketMakerError::RestApiError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MarketMakerError>;
