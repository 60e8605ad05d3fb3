//! WebSocket client for WOO X streams
//!
//! Handles connection, subscription frames, and message reception.

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::protocol::Message,
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, info, warn};

use crate::error::{MarketMakerError, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket client for a single connection
pub struct WebSocketClient {
    stream: Option<WsStream>,
    endpoint: String,
}

impl WebSocketClient {
    pub fn new(endpoint: &str) -> Self {
        Self {
            stream: None,
            endpoint: endpoint.to_string(),
        }
    }

    /// Connect to the WebSocket endpoint
    pub async fn connect(&mut self) -> Result<()> {
        info!(url = %self.endpoint, "Connecting to WOO X WebSocket");

        let (ws_stream, response) = connect_async(self.endpoint.as_str()).await.map_err(|e| {
            MarketMakerError::WebSocketConnection(format!("Failed to connect: {}", e))
        })?;

        info!(status = ?response.status(), "WebSocket connected");
        self.stream = Some(ws_stream);

        Ok(())
    }

    async fn send_json(&mut self, value: serde_json::Value) -> Result<()> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| MarketMakerError::WebSocketConnection("Not connected".to_string()))?;

        stream
            .send(Message::Text(value.to_string()))
            .await
            .map_err(|e| MarketMakerError::WebSocketMessage(e.to_string()))
    }

    /// Request a topic subscription; the ack arrives as a regular message
    pub async fn subscribe(&mut self, topic: &str) -> Result<()> {
        debug!(topic = %topic, "Subscribing");
        self.send_json(json!({ "id": topic, "topic": topic, "event": "subscribe" }))
            .await
    }

    /// Answer an application level `ping` event
    pub async fn pong(&mut self) -> Result<()> {
        self.send_json(json!({ "event": "pong" })).await
    }

    /// Application level keepalive
    pub async fn ping(&mut self) -> Result<()> {
        self.send_json(json!({ "event": "ping" })).await
    }

    /// Receive the next message
    pub async fn recv(&mut self) -> Result<Option<String>> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| MarketMakerError::WebSocketConnection("Not connected".to_string()))?;

        match stream.next().await {
            Some(Ok(Message::Text(text))) => Ok(Some(text)),
            Some(Ok(Message::Binary(data))) => {
                let text = String::from_utf8_lossy(&data).to_string();
                Ok(Some(text))
            }
            Some(Ok(Message::Ping(data))) => {
                debug!("Received ping frame, sending pong");
                if let Some(stream) = self.stream.as_mut() {
                    let _ = stream.send(Message::Pong(data)).await;
                }
                Ok(None)
            }
            Some(Ok(Message::Pong(_))) => Ok(None),
            Some(Ok(Message::Close(frame))) => {
                warn!(frame = ?frame, "Received close frame");
                self.stream = None;
                Err(MarketMakerError::TransportClosed)
            }
            Some(Ok(Message::Frame(_))) => Ok(None),
            Some(Err(e)) => {
                error!(error = %e, "WebSocket error");
                self.stream = None;
                Err(MarketMakerError::WebSocketMessage(e.to_string()))
            }
            None => {
                warn!("WebSocket stream ended");
                self.stream = None;
                Err(MarketMakerError::TransportClosed)
            }
        }
    }

    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.close(None).await;
        }
    }
}
