//! Book feed worker
//!
//! Owns the synchronizer for one symbol, drives it from the public
//! `{symbol}@orderbookupdate` stream and publishes every new book state.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use super::{BookSynchronizer, PriceLevelBook, SyncAction};
use crate::engine::ResourceStatus;
use crate::error::{MarketMakerError, Result};
use crate::exchange::{Channel, MessageStream, RestApi, StreamTransport};
use crate::parser::{DepthUpdate, OrderBookSnapshot};
use crate::telemetry::Metrics;

type PendingSnapshot = Option<JoinHandle<Result<OrderBookSnapshot>>>;

/// Read side of the book feed
#[derive(Debug, Clone)]
pub struct BookHandle {
    book_rx: watch::Receiver<Option<Arc<PriceLevelBook>>>,
    status_rx: watch::Receiver<ResourceStatus>,
}

impl BookHandle {
    /// Latest synchronized book; `None` before the first one and while
    /// resynchronizing
    pub fn current(&self) -> Option<Arc<PriceLevelBook>> {
        self.book_rx.borrow().clone()
    }

    pub fn status(&self) -> ResourceStatus {
        self.status_rx.borrow().clone()
    }

    pub fn is_ready(&self) -> bool {
        self.status_rx.borrow().is_ready()
    }
}

/// Keeps one symbol's book synchronized across reconnects
pub struct BookFeed {
    symbol: String,
    rest: Arc<dyn RestApi>,
    transport: Arc<dyn StreamTransport>,
    reconnect_delay: Duration,
    metrics: Arc<Metrics>,
    book_tx: watch::Sender<Option<Arc<PriceLevelBook>>>,
    status_tx: watch::Sender<ResourceStatus>,
}

impl BookFeed {
    pub fn new(
        symbol: &str,
        rest: Arc<dyn RestApi>,
        transport: Arc<dyn StreamTransport>,
        reconnect_delay: Duration,
        metrics: Arc<Metrics>,
    ) -> (Self, BookHandle) {
        let (book_tx, book_rx) = watch::channel(None);
        let (status_tx, status_rx) = watch::channel(ResourceStatus::Pending);

        let feed = Self {
            symbol: symbol.to_string(),
            rest,
            transport,
            reconnect_delay,
            metrics,
            book_tx,
            status_tx,
        };
        (feed, BookHandle { book_rx, status_rx })
    }

    /// Run until an unrecoverable error, resynchronizing on everything else
    pub async fn run(self) -> Result<()> {
        info!(symbol = %self.symbol, "Starting book feed");

        loop {
            let reason = match self.synchronize().await {
                Ok(()) => {
                    warn!(symbol = %self.symbol, "Order book stream ended, resubscribing");
                    "disconnect"
                }
                Err(e) if !e.is_recoverable() => {
                    error!(symbol = %self.symbol, error = %e, "Book feed failed");
                    self.book_tx.send_replace(None);
                    self.status_tx.send_replace(ResourceStatus::Failed(e.to_string()));
                    return Err(e);
                }
                Err(e) => {
                    warn!(symbol = %self.symbol, error = %e, "Resynchronizing order book");
                    resync_reason(&e)
                }
            };

            self.metrics.resyncs.with_label_values(&[reason]).inc();
            self.book_tx.send_replace(None);
            sleep(self.reconnect_delay).await;
        }
    }

    /// One full protocol run on a fresh subscription
    async fn synchronize(&self) -> Result<()> {
        let topic = format!("{}@orderbookupdate", self.symbol);
        let mut messages = self.transport.subscribe(Channel::Public, &topic).await?;
        let mut sync = BookSynchronizer::new(&self.symbol);
        let mut pending: PendingSnapshot = None;

        let result = self.drive(&mut messages, &mut sync, &mut pending).await;

        if let Some(fetch) = pending.take() {
            fetch.abort();
        }
        result
    }

    async fn drive(
        &self,
        messages: &mut MessageStream,
        sync: &mut BookSynchronizer,
        pending: &mut PendingSnapshot,
    ) -> Result<()> {
        loop {
            tokio::select! {
                item = messages.next() => {
                    let Some(item) = item else {
                        return Ok(());
                    };
                    let message = item?;
                    let update = match DepthUpdate::from_message(&message) {
                        Ok(update) => update,
                        Err(e) => {
                            warn!(error = %e, "Failed to parse order book update");
                            continue;
                        }
                    };

                    match sync.on_delta(update)? {
                        SyncAction::FetchSnapshot => {
                            debug!(symbol = %self.symbol, "First delta buffered, fetching snapshot");
                            *pending = Some(self.spawn_snapshot_fetch());
                        }
                        SyncAction::Buffered => {}
                        SyncAction::Applied => self.publish(sync),
                    }
                }
                snapshot = await_snapshot(pending) => {
                    *pending = None;
                    let snapshot = snapshot?;
                    let replayed = sync.on_snapshot(&snapshot)?;
                    info!(
                        symbol = %self.symbol,
                        snapshot_sequence = snapshot.sequence,
                        replayed,
                        "Order book initialized"
                    );
                }
            }
        }
    }

    fn spawn_snapshot_fetch(&self) -> JoinHandle<Result<OrderBookSnapshot>> {
        let rest = self.rest.clone();
        let symbol = self.symbol.clone();
        tokio::spawn(async move { rest.fetch_orderbook_snapshot(&symbol).await })
    }

    fn publish(&self, sync: &BookSynchronizer) {
        let Some(book) = sync.book() else {
            return;
        };
        self.book_tx.send_replace(Some(Arc::new(book.clone())));
        self.metrics.applied_deltas.inc();

        if !self.status_tx.borrow().is_ready() {
            info!(symbol = %self.symbol, sequence = book.sequence(), "Order book ready");
            self.status_tx.send_replace(ResourceStatus::Ready);
        }
    }
}

/// Resolves once the snapshot fetch finishes, never when none is running
async fn await_snapshot(pending: &mut PendingSnapshot) -> Result<OrderBookSnapshot> {
    match pending.as_mut() {
        Some(fetch) => fetch.await.map_err(|e| {
            MarketMakerError::RestApiError(format!("Snapshot fetch task failed: {}", e))
        })?,
        None => std::future::pending().await,
    }
}

fn resync_reason(error: &MarketMakerError) -> &'static str {
    match error {
        MarketMakerError::GapDetected { .. } => "gap",
        MarketMakerError::CrossedBook { .. } => "crossed",
        MarketMakerError::RestApiError(_) => "snapshot",
        MarketMakerError::TransportClosed
        | MarketMakerError::ConnectionTimeout
        | MarketMakerError::WebSocketConnection(_)
        | MarketMakerError::WebSocketMessage(_) => "disconnect",
        _ => "error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::MockRestApi;
    use crate::orderbook::Side;
    use crate::parser::{PriceLevel, TopicMessage};
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    /// Hands out pre-built streams, one per subscribe call
    struct ScriptedTransport {
        streams: Mutex<Vec<MessageStream>>,
    }

    #[async_trait]
    impl StreamTransport for ScriptedTransport {
        async fn subscribe(&self, _channel: Channel, _topic: &str) -> Result<MessageStream> {
            let mut streams = self.streams.lock().unwrap();
            if streams.is_empty() {
                return Err(MarketMakerError::ProtocolRejected("no more streams".to_string()));
            }
            Ok(streams.remove(0))
        }
    }

    fn receiver_stream(rx: mpsc::UnboundedReceiver<Result<TopicMessage>>) -> MessageStream {
        Box::pin(futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        }))
    }

    fn delta(previous: u64, sequence: u64, bid: &str) -> Result<TopicMessage> {
        Ok(serde_json::from_value(json!({
            "topic": "PERP_BTC_USDT@orderbookupdate",
            "ts": sequence,
            "data": {
                "symbol": "PERP_BTC_USDT",
                "prevTs": previous,
                "bids": [[bid, "1"]],
                "asks": []
            }
        }))
        .unwrap())
    }

    fn snapshot(sequence: u64) -> OrderBookSnapshot {
        OrderBookSnapshot {
            sequence,
            bids: vec![PriceLevel {
                price: dec!(100),
                quantity: dec!(1),
            }],
            asks: vec![PriceLevel {
                price: dec!(101),
                quantity: dec!(1),
            }],
        }
    }

    #[tokio::test]
    async fn test_publishes_after_first_live_delta() {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = Arc::new(ScriptedTransport {
            streams: Mutex::new(vec![receiver_stream(rx)]),
        });

        let mut rest = MockRestApi::new();
        rest.expect_fetch_orderbook_snapshot()
            .times(1)
            .returning(|_| Ok(snapshot(100)));

        let metrics = Arc::new(Metrics::new().unwrap());
        let (feed, handle) = BookFeed::new(
            "PERP_BTC_USDT",
            Arc::new(rest),
            transport,
            Duration::from_millis(10),
            metrics.clone(),
        );
        let worker = tokio::spawn(feed.run());

        tx.send(delta(99, 100, "99")).unwrap();
        let mut status_rx = handle.status_rx.clone();
        let mut book_rx = handle.book_rx.clone();

        // Snapshot replay alone does not publish
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(handle.current().is_none());
        assert_eq!(handle.status(), ResourceStatus::Pending);

        tx.send(delta(100, 105, "99.5")).unwrap();
        book_rx.changed().await.unwrap();
        status_rx.changed().await.unwrap();

        let book = handle.current().unwrap();
        assert_eq!(book.sequence(), 105);
        assert_eq!(book.best_bid().unwrap().price, dec!(100));
        let bids: Vec<_> = book.levels(Side::Bid).iter().map(|l| l.price).collect();
        assert_eq!(bids, vec![dec!(100), dec!(99.5)]);
        assert!(handle.is_ready());
        assert_eq!(metrics.applied_deltas.get(), 1);

        worker.abort();
    }

    #[test]
    fn test_resync_reasons() {
        assert_eq!(resync_reason(&MarketMakerError::GapDetected { expected: 1, got: 2 }), "gap");
        assert_eq!(
            resync_reason(&MarketMakerError::CrossedBook {
                bid: dec!(2),
                ask: dec!(1)
            }),
            "crossed"
        );
        assert_eq!(resync_reason(&MarketMakerError::TransportClosed), "disconnect");
        assert_eq!(resync_reason(&MarketMakerError::RestApiError("x".into())), "snapshot");
    }
}
