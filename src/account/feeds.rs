//! Positions and balances producers

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::{AccountStateHandle, FeedEvent, MergeMessage, Observation, SnapshotMergeStream};
use crate::error::Result;
use crate::exchange::{Channel, RestApi, StreamTransport};
use crate::parser::{HoldingsUpdate, TopicMessage};
use crate::telemetry::Metrics;

/// Capacity of a domain's merge queue
const MERGE_QUEUE_CAPACITY: usize = 1024;

/// One account domain: where its snapshot and its pushes come from
#[async_trait]
pub trait AccountFeed: Send + Sync + 'static {
    type Key: Eq + Hash + Clone + Debug + Send + Sync + 'static;
    type Value: Clone + Debug + Send + Sync + 'static;

    fn name(&self) -> &'static str;

    /// Private topic carrying the incremental updates
    fn topic(&self) -> &'static str;

    async fn fetch_snapshot(
        &self,
        rest: &dyn RestApi,
    ) -> Result<Vec<Observation<Self::Key, Self::Value>>>;

    fn decode_update(
        &self,
        message: &TopicMessage,
    ) -> Result<Vec<Observation<Self::Key, Self::Value>>>;
}

fn holdings_observations(update: HoldingsUpdate) -> Vec<Observation<String, Decimal>> {
    let observed_at = update.observed_at;
    update
        .holdings
        .into_iter()
        .map(|(key, holding)| Observation::new(key, holding, observed_at))
        .collect()
}

/// Holding per symbol
#[derive(Debug, Clone, Copy, Default)]
pub struct PositionFeed;

#[async_trait]
impl AccountFeed for PositionFeed {
    type Key = String;
    type Value = Decimal;

    fn name(&self) -> &'static str {
        "positions"
    }

    fn topic(&self) -> &'static str {
        "position"
    }

    async fn fetch_snapshot(&self, rest: &dyn RestApi) -> Result<Vec<Observation<String, Decimal>>> {
        let response = rest.fetch_positions().await?;
        Ok(response
            .data
            .positions
            .into_iter()
            .map(|row| {
                let observed_at = row.observed_at_ms();
                Observation::new(row.symbol, row.holding, observed_at)
            })
            .collect())
    }

    fn decode_update(&self, message: &TopicMessage) -> Result<Vec<Observation<String, Decimal>>> {
        Ok(holdings_observations(HoldingsUpdate::from_position_message(message)?))
    }
}

/// Holding per token
#[derive(Debug, Clone, Copy, Default)]
pub struct BalanceFeed;

#[async_trait]
impl AccountFeed for BalanceFeed {
    type Key = String;
    type Value = Decimal;

    fn name(&self) -> &'static str {
        "balances"
    }

    fn topic(&self) -> &'static str {
        "balance"
    }

    async fn fetch_snapshot(&self, rest: &dyn RestApi) -> Result<Vec<Observation<String, Decimal>>> {
        let response = rest.fetch_balances().await?;
        let observed_at = response.timestamp;
        Ok(response
            .data
            .holding
            .into_iter()
            .map(|row| Observation::new(row.token, row.holding, observed_at))
            .collect())
    }

    fn decode_update(&self, message: &TopicMessage) -> Result<Vec<Observation<String, Decimal>>> {
        Ok(holdings_observations(HoldingsUpdate::from_balance_message(message)?))
    }
}

/// Running tasks of one account domain
pub struct AccountStream<K, V> {
    pub handle: AccountStateHandle<K, V>,
    pub tasks: Vec<JoinHandle<()>>,
}

/// Spawn the merger plus the snapshot and incremental producers of `feed`
pub fn spawn_account_stream<F: AccountFeed>(
    feed: F,
    rest: Arc<dyn RestApi>,
    transport: Arc<dyn StreamTransport>,
    reconnect_delay: Duration,
    metrics: Arc<Metrics>,
) -> AccountStream<F::Key, F::Value> {
    let feed = Arc::new(feed);
    let (merger, handle) = SnapshotMergeStream::new(feed.name(), metrics);
    let (tx, rx) = mpsc::channel(MERGE_QUEUE_CAPACITY);

    let tasks = vec![
        tokio::spawn(merger.run(rx)),
        tokio::spawn(run_snapshot_producer(
            feed.clone(),
            rest,
            tx.clone(),
            reconnect_delay,
        )),
        tokio::spawn(run_incremental_producer(feed, transport, tx, reconnect_delay)),
    ];

    AccountStream { handle, tasks }
}

/// Fetch the snapshot once, retrying until it succeeds
async fn run_snapshot_producer<F: AccountFeed>(
    feed: Arc<F>,
    rest: Arc<dyn RestApi>,
    tx: mpsc::Sender<FeedEvent<F::Key, F::Value>>,
    reconnect_delay: Duration,
) {
    loop {
        match feed.fetch_snapshot(rest.as_ref()).await {
            Ok(observations) => {
                info!(feed = feed.name(), entries = observations.len(), "Account snapshot fetched");
                let message = MergeMessage {
                    is_snapshot: true,
                    observations,
                };
                if tx.send(FeedEvent::Message(message)).await.is_err() {
                    debug!(feed = feed.name(), "Merge queue closed before snapshot");
                }
                return;
            }
            Err(e) => {
                warn!(feed = feed.name(), error = %e, "Account snapshot fetch failed, retrying");
                sleep(reconnect_delay).await;
            }
        }
    }
}

/// Forward pushes of the feed's topic, resubscribing when the stream ends
async fn run_incremental_producer<F: AccountFeed>(
    feed: Arc<F>,
    transport: Arc<dyn StreamTransport>,
    tx: mpsc::Sender<FeedEvent<F::Key, F::Value>>,
    reconnect_delay: Duration,
) {
    loop {
        match forward_updates(feed.as_ref(), transport.as_ref(), &tx).await {
            Ok(()) => {
                if tx.is_closed() {
                    return;
                }
                warn!(feed = feed.name(), "Account stream ended, resubscribing");
            }
            Err(e) if !e.is_recoverable() => {
                let _ = tx.send(FeedEvent::Failed(e.to_string())).await;
                return;
            }
            Err(e) => {
                warn!(feed = feed.name(), error = %e, "Account stream error, resubscribing");
            }
        }
        sleep(reconnect_delay).await;
    }
}

async fn forward_updates<F: AccountFeed>(
    feed: &F,
    transport: &dyn StreamTransport,
    tx: &mpsc::Sender<FeedEvent<F::Key, F::Value>>,
) -> Result<()> {
    let mut messages = transport.subscribe(Channel::Private, feed.topic()).await?;

    while let Some(item) = messages.next().await {
        let message = item?;
        let observations = match feed.decode_update(&message) {
            Ok(observations) => observations,
            Err(e) => {
                warn!(feed = feed.name(), error = %e, "Failed to decode account update");
                continue;
            }
        };

        let event = FeedEvent::Message(MergeMessage {
            is_snapshot: false,
            observations,
        });
        if tx.send(event).await.is_err() {
            return Ok(());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MarketMakerError;
    use crate::exchange::MockRestApi;
    use crate::parser::{
        BalanceRow, BalancesResponse, BalancesResponseData, PositionRow, PositionsResponse,
        PositionsResponseData,
    };
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_position_update_decoding() {
        let message: TopicMessage = serde_json::from_value(json!({
            "topic": "position",
            "ts": 1700000000123u64,
            "data": {
                "positions": {
                    "PERP_BTC_USDT": { "holding": 0.5, "pendingLongQty": 0 },
                    "PERP_ETH_USDT": { "holding": -2 }
                }
            }
        }))
        .unwrap();

        let mut observations = PositionFeed.decode_update(&message).unwrap();
        observations.sort_by(|a, b| a.key.cmp(&b.key));
        assert_eq!(observations.len(), 2);
        assert_eq!(observations[0].key, "PERP_BTC_USDT");
        assert_eq!(observations[0].value, dec!(0.5));
        assert_eq!(observations[0].observed_at, 1700000000123);
        assert_eq!(observations[1].value, dec!(-2));
    }

    #[tokio::test]
    async fn test_balance_snapshot_uses_envelope_timestamp() {
        let mut rest = MockRestApi::new();
        rest.expect_fetch_balances().returning(|| {
            Ok(BalancesResponse {
                success: true,
                data: BalancesResponseData {
                    holding: vec![
                        BalanceRow {
                            token: "USDT".to_string(),
                            holding: dec!(1000),
                        },
                        BalanceRow {
                            token: "BTC".to_string(),
                            holding: dec!(0.1),
                        },
                    ],
                },
                timestamp: 1700000000000,
            })
        });

        let observations = BalanceFeed.fetch_snapshot(&rest).await.unwrap();
        assert_eq!(observations.len(), 2);
        assert!(observations.iter().all(|o| o.observed_at == 1700000000000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_retried_until_success() {
        let mut rest = MockRestApi::new();
        let mut seq = mockall::Sequence::new();
        rest.expect_fetch_positions()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|| Err(MarketMakerError::RestApiError("503 Service Unavailable".into())));
        rest.expect_fetch_positions()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| {
                Ok(PositionsResponse {
                    success: true,
                    data: PositionsResponseData {
                        positions: vec![PositionRow {
                            symbol: "PERP_BTC_USDT".to_string(),
                            holding: dec!(0.5),
                            timestamp: dec!(1700000000.123),
                        }],
                    },
                })
            });

        let (tx, mut rx) = mpsc::channel(4);
        tokio::spawn(run_snapshot_producer(
            Arc::new(PositionFeed),
            Arc::new(rest),
            tx,
            Duration::from_secs(1),
        ));

        let Some(FeedEvent::Message(message)) = rx.recv().await else {
            panic!("expected the snapshot message");
        };
        assert!(message.is_snapshot);
        assert_eq!(message.observations.len(), 1);
        assert_eq!(message.observations[0].observed_at, 1700000000123);
        assert!(rx.recv().await.is_none());
    }
}
