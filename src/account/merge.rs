//! Snapshot/incremental merge for one account domain
//!
//! Both producers push into the same queue; a single merger applies every
//! message with the same last-writer-wins rule and publishes the table.

use std::hash::Hash;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

use super::{AccountStateTable, Observation};
use crate::engine::ResourceStatus;
use crate::telemetry::Metrics;

/// One batch of observations from a producer
#[derive(Debug, Clone)]
pub struct MergeMessage<K, V> {
    /// Set on the message carrying the REST snapshot
    pub is_snapshot: bool,
    pub observations: Vec<Observation<K, V>>,
}

/// What a producer hands to the merger
#[derive(Debug)]
pub enum FeedEvent<K, V> {
    Message(MergeMessage<K, V>),
    /// The producer stopped on an unrecoverable error
    Failed(String),
}

/// Read side of a merged table
#[derive(Debug, Clone)]
pub struct AccountStateHandle<K, V> {
    table_rx: watch::Receiver<Arc<AccountStateTable<K, V>>>,
    status_rx: watch::Receiver<ResourceStatus>,
}

impl<K, V> AccountStateHandle<K, V> {
    /// Latest published table
    pub fn current(&self) -> Arc<AccountStateTable<K, V>> {
        self.table_rx.borrow().clone()
    }

    pub fn status(&self) -> ResourceStatus {
        self.status_rx.borrow().clone()
    }

    /// True once the snapshot has been merged
    pub fn is_ready(&self) -> bool {
        self.status_rx.borrow().is_ready()
    }
}

/// Single consumer of a domain's merge queue
pub struct SnapshotMergeStream<K, V> {
    name: &'static str,
    table: AccountStateTable<K, V>,
    snapshot_observed: bool,
    table_tx: watch::Sender<Arc<AccountStateTable<K, V>>>,
    status_tx: watch::Sender<ResourceStatus>,
    metrics: Arc<Metrics>,
}

impl<K, V> SnapshotMergeStream<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(name: &'static str, metrics: Arc<Metrics>) -> (Self, AccountStateHandle<K, V>) {
        let (table_tx, table_rx) = watch::channel(Arc::new(AccountStateTable::new()));
        let (status_tx, status_rx) = watch::channel(ResourceStatus::Pending);

        let stream = Self {
            name,
            table: AccountStateTable::new(),
            snapshot_observed: false,
            table_tx,
            status_tx,
            metrics,
        };
        (stream, AccountStateHandle { table_rx, status_rx })
    }

    pub fn snapshot_observed(&self) -> bool {
        self.snapshot_observed
    }

    pub fn table(&self) -> &AccountStateTable<K, V> {
        &self.table
    }

    /// Merge one message and publish the result. Returns the number of
    /// accepted observations.
    pub fn process(&mut self, message: MergeMessage<K, V>) -> usize {
        let mut accepted = 0;
        for observation in message.observations {
            if self.table.merge(observation) {
                accepted += 1;
            }
        }

        if accepted > 0 {
            self.metrics
                .account_updates
                .with_label_values(&[self.name])
                .inc_by(accepted as u64);
        }

        if accepted > 0 || message.is_snapshot {
            self.table_tx.send_replace(Arc::new(self.table.clone()));
        }

        if message.is_snapshot && !self.snapshot_observed {
            self.snapshot_observed = true;
            self.status_tx.send_replace(ResourceStatus::Ready);
            info!(feed = self.name, entries = self.table.len(), "Account snapshot merged");
        }

        debug!(
            feed = self.name,
            accepted,
            version = self.table.version(),
            "Merged account update"
        );
        accepted
    }

    /// Consume the queue until every producer is gone or one fails
    pub async fn run(mut self, mut events: mpsc::Receiver<FeedEvent<K, V>>) {
        while let Some(event) = events.recv().await {
            match event {
                FeedEvent::Message(message) => {
                    self.process(message);
                }
                FeedEvent::Failed(reason) => {
                    error!(feed = self.name, reason = %reason, "Account feed failed");
                    self.status_tx.send_replace(ResourceStatus::Failed(reason));
                    return;
                }
            }
        }
        debug!(feed = self.name, "Account merge queue closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn stream() -> (
        SnapshotMergeStream<String, Decimal>,
        AccountStateHandle<String, Decimal>,
    ) {
        SnapshotMergeStream::new("positions", Arc::new(Metrics::new().unwrap()))
    }

    fn message(is_snapshot: bool, entries: &[(&str, Decimal, u64)]) -> MergeMessage<String, Decimal> {
        MergeMessage {
            is_snapshot,
            observations: entries
                .iter()
                .map(|(key, value, at)| Observation::new(key.to_string(), *value, *at))
                .collect(),
        }
    }

    #[test]
    fn test_incremental_before_snapshot_keeps_newest() {
        let (mut stream, handle) = stream();
        assert!(!handle.is_ready());

        stream.process(message(false, &[("X", dec!(1), 1)]));
        assert!(!handle.is_ready());
        assert!(!stream.snapshot_observed());

        stream.process(message(true, &[("X", dec!(2), 2)]));
        assert!(handle.is_ready());

        let table = handle.current();
        assert_eq!(table.get(&"X".to_string()), Some(&dec!(2)));
        assert_eq!(table.observed_at(&"X".to_string()), Some(2));
    }

    #[test]
    fn test_stale_snapshot_does_not_overwrite_incremental() {
        let (mut stream, handle) = stream();
        stream.process(message(false, &[("BTC", dec!(10), 5)]));
        let accepted = stream.process(message(true, &[("BTC", dec!(12), 3), ("ETH", dec!(1), 3)]));

        assert_eq!(accepted, 1);
        assert!(handle.is_ready());
        let table = handle.current();
        assert_eq!(table.get(&"BTC".to_string()), Some(&dec!(10)));
        assert_eq!(table.get(&"ETH".to_string()), Some(&dec!(1)));
    }

    #[test]
    fn test_ready_latch_fires_once() {
        let (mut stream, handle) = stream();
        stream.process(message(true, &[]));
        assert!(handle.is_ready());
        assert!(handle.current().is_empty());

        stream.process(message(true, &[("A", dec!(1), 1)]));
        assert!(stream.snapshot_observed());
        assert_eq!(handle.status(), ResourceStatus::Ready);
        assert_eq!(stream.table().version(), 1);
    }

    #[tokio::test]
    async fn test_failed_producer_marks_resource_failed() {
        let (stream, handle) = stream();
        let (tx, rx) = mpsc::channel(8);
        let merger = tokio::spawn(stream.run(rx));

        tx.send(FeedEvent::Message(message(true, &[("A", dec!(1), 1)])))
            .await
            .unwrap();
        tx.send(FeedEvent::Failed("subscription rejected".to_string()))
            .await
            .unwrap();
        merger.await.unwrap();

        assert_eq!(
            handle.status(),
            ResourceStatus::Failed("subscription rejected".to_string())
        );
        assert_eq!(handle.current().get(&"A".to_string()), Some(&dec!(1)));
    }
}
