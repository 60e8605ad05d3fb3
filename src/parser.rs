//! Parser module for WOO X WebSocket and REST messages
//!
//! The exchange schema is treated as a pass-through structure: every
//! WebSocket data message is kept as a `{topic, ts, data}` envelope and only
//! the documented fields each consumer needs are decoded out of `data`.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;

/// Price level (price, quantity pair)
#[derive(Debug, Clone, PartialEq)]
pub struct PriceLevel {
    pub price: Decimal,
    pub quantity: Decimal,
}

/// WebSocket data message envelope
#[derive(Debug, Clone, Deserialize)]
pub struct TopicMessage {
    pub topic: String,

    /// Exchange timestamp (milliseconds), doubles as the sequence of book updates
    pub ts: u64,

    pub data: serde_json::Value,
}

/// Classified WebSocket frame
#[derive(Debug, Clone)]
pub enum WsEnvelope {
    Ping,
    Pong,
    /// Acknowledgement of a `subscribe` or `auth` request
    Ack {
        event: String,
        success: bool,
        detail: String,
    },
    Data(TopicMessage),
    Unknown(String),
}

impl WsEnvelope {
    /// Parse a raw WebSocket message
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_str(raw)?;

        if let Some(event) = value.get("event").and_then(|e| e.as_str()) {
            return Ok(match event {
                "ping" => WsEnvelope::Ping,
                "pong" => WsEnvelope::Pong,
                "subscribe" | "auth" => WsEnvelope::Ack {
                    event: event.to_string(),
                    success: value
                        .get("success")
                        .and_then(|s| s.as_bool())
                        .unwrap_or(false),
                    detail: raw.to_string(),
                },
                _ => WsEnvelope::Unknown(raw.to_string()),
            });
        }

        if value.get("data").is_some() {
            let message: TopicMessage = serde_json::from_value(value)?;
            return Ok(WsEnvelope::Data(message));
        }

        Ok(WsEnvelope::Unknown(raw.to_string()))
    }
}

/// Incremental order book update (`{symbol}@orderbookupdate`)
#[derive(Debug, Clone, PartialEq)]
pub struct DepthUpdate {
    pub symbol: String,

    /// Sequence this update brings the book to (the message `ts`)
    pub sequence: u64,

    /// Sequence the book must be at for this update to apply (`data.prevTs`)
    pub previous_sequence: u64,

    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
}

#[derive(Debug, Deserialize)]
struct OrderbookUpdateData {
    symbol: String,

    #[serde(rename = "prevTs")]
    prev_ts: u64,

    #[serde(deserialize_with = "deserialize_price_levels")]
    bids: Vec<PriceLevel>,

    #[serde(deserialize_with = "deserialize_price_levels")]
    asks: Vec<PriceLevel>,
}

impl DepthUpdate {
    pub fn from_message(message: &TopicMessage) -> Result<Self, serde_json::Error> {
        let data: OrderbookUpdateData = serde_json::from_value(message.data.clone())?;
        Ok(Self {
            symbol: data.symbol,
            sequence: message.ts,
            previous_sequence: data.prev_ts,
            bids: data.bids,
            asks: data.asks,
        })
    }
}

/// Order book snapshot from REST API
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBookSnapshot {
    /// Exchange timestamp of the snapshot, comparable with `DepthUpdate::previous_sequence`
    pub sequence: u64,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
}

#[derive(Debug, Deserialize)]
pub struct OrderbookSnapshotResponse {
    pub success: bool,
    pub timestamp: u64,
    pub bids: Vec<SnapshotLevel>,
    pub asks: Vec<SnapshotLevel>,
}

#[derive(Debug, Deserialize)]
pub struct SnapshotLevel {
    pub price: Decimal,
    pub quantity: Decimal,
}

impl From<OrderbookSnapshotResponse> for OrderBookSnapshot {
    fn from(response: OrderbookSnapshotResponse) -> Self {
        let convert = |levels: Vec<SnapshotLevel>| {
            levels
                .into_iter()
                .map(|l| PriceLevel {
                    price: l.price,
                    quantity: l.quantity,
                })
                .collect()
        };
        Self {
            sequence: response.timestamp,
            bids: convert(response.bids),
            asks: convert(response.asks),
        }
    }
}

/// Instrument metadata (`/v1/public/info/{symbol}`)
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeInfoResponse {
    pub success: bool,
    pub info: InstrumentInfo,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InstrumentInfo {
    pub symbol: String,
    pub quote_tick: Decimal,
    pub base_tick: Decimal,
    pub quote_min: Decimal,
    pub quote_max: Decimal,
    pub base_min: Decimal,
    pub base_max: Decimal,
    pub min_notional: Decimal,
}

/// Holdings keyed by symbol or token with the time they were observed
#[derive(Debug, Clone, PartialEq)]
pub struct HoldingsUpdate {
    pub observed_at: u64,
    pub holdings: HashMap<String, Decimal>,
}

#[derive(Debug, Deserialize)]
struct HoldingData {
    holding: Decimal,
}

#[derive(Debug, Deserialize)]
struct PositionData {
    positions: HashMap<String, HoldingData>,
}

#[derive(Debug, Deserialize)]
struct BalanceData {
    balances: HashMap<String, HoldingData>,
}

impl HoldingsUpdate {
    /// Decode a `position` push
    pub fn from_position_message(message: &TopicMessage) -> Result<Self, serde_json::Error> {
        let data: PositionData = serde_json::from_value(message.data.clone())?;
        Ok(Self::collect(message.ts, data.positions))
    }

    /// Decode a `balance` push
    pub fn from_balance_message(message: &TopicMessage) -> Result<Self, serde_json::Error> {
        let data: BalanceData = serde_json::from_value(message.data.clone())?;
        Ok(Self::collect(message.ts, data.balances))
    }

    fn collect(observed_at: u64, raw: HashMap<String, HoldingData>) -> Self {
        Self {
            observed_at,
            holdings: raw.into_iter().map(|(k, v)| (k, v.holding)).collect(),
        }
    }
}

/// Positions snapshot (`/v3/positions`)
#[derive(Debug, Deserialize)]
pub struct PositionsResponse {
    pub success: bool,
    pub data: PositionsResponseData,
}

#[derive(Debug, Deserialize)]
pub struct PositionsResponseData {
    pub positions: Vec<PositionRow>,
}

#[derive(Debug, Deserialize)]
pub struct PositionRow {
    pub symbol: String,
    pub holding: Decimal,

    /// Seconds, with fractional milliseconds
    pub timestamp: Decimal,
}

impl PositionRow {
    pub fn observed_at_ms(&self) -> u64 {
        (self.timestamp * Decimal::ONE_THOUSAND)
            .trunc()
            .to_u64()
            .unwrap_or(0)
    }
}

/// Balances snapshot (`/v3/balances`)
#[derive(Debug, Deserialize)]
pub struct BalancesResponse {
    pub success: bool,
    pub data: BalancesResponseData,
    pub timestamp: u64,
}

#[derive(Debug, Deserialize)]
pub struct BalancesResponseData {
    pub holding: Vec<BalanceRow>,
}

#[derive(Debug, Deserialize)]
pub struct BalanceRow {
    pub token: String,
    pub holding: Decimal,
}

/// Own order event (`executionreport`)
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionReport {
    pub symbol: String,

    #[serde(rename = "orderId")]
    pub order_id: u64,

    pub side: String,
    pub price: Decimal,
    pub quantity: Decimal,
    pub status: String,

    #[serde(rename = "executedPrice", default)]
    pub executed_price: Decimal,

    #[serde(rename = "executedQuantity", default)]
    pub executed_quantity: Decimal,
}

impl ExecutionReport {
    pub fn from_message(message: &TopicMessage) -> Result<Self, serde_json::Error> {
        serde_json::from_value(message.data.clone())
    }
}

/// Response to `POST /v1/order`
#[derive(Debug, Clone, Deserialize)]
pub struct SendOrderResponse {
    pub success: bool,
    #[serde(default)]
    pub order_id: u64,
}

/// Response carrying only a success flag (cancellations)
#[derive(Debug, Clone, Deserialize)]
pub struct StatusResponse {
    pub success: bool,
    #[serde(default)]
    pub status: String,
}

/// Custom deserializer for price levels from an array of `[price, size]` pairs
fn deserialize_price_levels<'de, D>(deserializer: D) -> Result<Vec<PriceLevel>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Vec<Vec<Decimal>> = Deserialize::deserialize(deserializer)?;
    raw.into_iter()
        .map(|pair| {
            if pair.len() != 2 {
                return Err(serde::de::Error::custom("Invalid price level format"));
            }
            Ok(PriceLevel {
                price: pair[0],
                quantity: pair[1],
            })
        })
        .collect()
}
