//! `StreamTransport` over one WebSocket connection per subscription

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use super::WebSocketClient;
use crate::config::Config;
use crate::error::{MarketMakerError, Result};
use crate::exchange::{Channel, MessageStream, StreamTransport};
use crate::parser::{TopicMessage, WsEnvelope};

/// Opens a dedicated connection per topic and yields its data messages
#[derive(Debug, Clone)]
pub struct WsTransport {
    public_url: String,
    private_url: String,
    recv_timeout: Duration,
}

impl WsTransport {
    pub fn new(config: &Config) -> Self {
        Self {
            public_url: config.ws_public_endpoint.clone(),
            private_url: config.ws_private_endpoint.clone(),
            recv_timeout: config.recv_timeout(),
        }
    }

    fn url(&self, channel: Channel) -> &str {
        match channel {
            Channel::Public => &self.public_url,
            Channel::Private => &self.private_url,
        }
    }
}

/// Live subscription driven by the message stream
struct Subscription {
    client: WebSocketClient,
    topic: String,
    pending: VecDeque<TopicMessage>,
    recv_timeout: Duration,
    finished: bool,
}

enum Frame {
    Message(TopicMessage),
    Ack,
    Rejected(String),
    Nothing,
}

impl Subscription {
    /// Classify one raw frame, answering pings on the way
    async fn handle(&mut self, raw: &str) -> Result<Frame> {
        let envelope = match WsEnvelope::parse(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, topic = %self.topic, "Failed to parse message");
                return Ok(Frame::Nothing);
            }
        };

        match envelope {
            WsEnvelope::Ping => {
                self.client.pong().await?;
                Ok(Frame::Nothing)
            }
            WsEnvelope::Pong => Ok(Frame::Nothing),
            WsEnvelope::Ack { success: true, .. } => Ok(Frame::Ack),
            WsEnvelope::Ack { detail, .. } => Ok(Frame::Rejected(detail)),
            WsEnvelope::Data(message) if message.topic == self.topic => Ok(Frame::Message(message)),
            WsEnvelope::Data(message) => {
                trace!(topic = %message.topic, "Message for another topic");
                Ok(Frame::Nothing)
            }
            WsEnvelope::Unknown(raw) => {
                trace!(msg = %raw, "Unknown message type");
                Ok(Frame::Nothing)
            }
        }
    }

    /// Read until the subscription is acknowledged. Data that arrives
    /// before the ack is kept for the stream.
    async fn await_ack(&mut self) -> Result<()> {
        loop {
            let raw = match timeout(self.recv_timeout, self.client.recv()).await {
                Ok(result) => result?,
                Err(_) => return Err(MarketMakerError::ConnectionTimeout),
            };
            let Some(raw) = raw else { continue };

            match self.handle(&raw).await? {
                Frame::Ack => return Ok(()),
                Frame::Rejected(detail) => return Err(MarketMakerError::ProtocolRejected(detail)),
                Frame::Message(message) => self.pending.push_back(message),
                Frame::Nothing => {}
            }
        }
    }

    /// Next item of the stream; `None` once the connection is gone
    async fn next_message(&mut self) -> Option<Result<TopicMessage>> {
        if self.finished {
            return None;
        }
        if let Some(message) = self.pending.pop_front() {
            return Some(Ok(message));
        }

        loop {
            match timeout(self.recv_timeout, self.client.recv()).await {
                Ok(Ok(Some(raw))) => match self.handle(&raw).await {
                    Ok(Frame::Message(message)) => return Some(Ok(message)),
                    Ok(Frame::Rejected(detail)) => {
                        self.finished = true;
                        return Some(Err(MarketMakerError::ProtocolRejected(detail)));
                    }
                    Ok(Frame::Ack) | Ok(Frame::Nothing) => {}
                    Err(e) => {
                        warn!(error = %e, topic = %self.topic, "Failed to answer ping");
                        return None;
                    }
                },
                Ok(Ok(None)) => {}
                Ok(Err(e)) => {
                    debug!(error = %e, topic = %self.topic, "Subscription stream ended");
                    return None;
                }
                Err(_) => {
                    warn!(
                        topic = %self.topic,
                        timeout_secs = self.recv_timeout.as_secs(),
                        "No message received within timeout, sending keepalive"
                    );
                    if let Err(e) = self.client.ping().await {
                        warn!(error = %e, "Failed to send keepalive ping, reconnecting");
                        return None;
                    }
                }
            }
        }
    }
}

#[async_trait]
impl StreamTransport for WsTransport {
    async fn subscribe(&self, channel: Channel, topic: &str) -> Result<MessageStream> {
        let mut client = WebSocketClient::new(self.url(channel));
        client.connect().await?;
        client.subscribe(topic).await?;

        let mut subscription = Subscription {
            client,
            topic: topic.to_string(),
            pending: VecDeque::new(),
            recv_timeout: self.recv_timeout,
            finished: false,
        };

        if let Err(e) = subscription.await_ack().await {
            subscription.client.close().await;
            return Err(e);
        }
        info!(channel = ?channel, topic = %topic, "Subscribed");

        let messages = stream::unfold(subscription, |mut subscription| async move {
            let item = subscription.next_message().await;
            if item.is_none() {
                subscription.client.close().await;
            }
            item.map(|item| (item, subscription))
        });

        Ok(Box::pin(messages))
    }
}
