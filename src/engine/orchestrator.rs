//! Background workers, readiness gate and the quoting loop

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::order_events::spawn_order_events;
use super::{Readiness, ResourceStatus};
use crate::account::{
    spawn_account_stream, AccountStateHandle, AccountStateTable, BalanceFeed, Balances,
    PositionFeed, Positions,
};
use crate::config::Config;
use crate::error::{MarketMakerError, Result};
use crate::exchange::{RestApi, StreamTransport};
use crate::orderbook::{BookFeed, BookHandle, PriceLevelBook};
use crate::quoting::{QuoteRequest, QuotingStrategy};
use crate::telemetry::Metrics;

/// Timing of the quoting loop
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub symbol: String,
    pub tick_interval: Duration,
    pub readiness_poll: Duration,
    pub reconnect_delay: Duration,
    pub max_inflight_orders: usize,
}

impl From<&Config> for LoopSettings {
    fn from(config: &Config) -> Self {
        Self {
            symbol: config.symbol.clone(),
            tick_interval: config.tick_interval(),
            readiness_poll: config.readiness_poll(),
            reconnect_delay: config.reconnect_delay(),
            max_inflight_orders: config.max_inflight_orders,
        }
    }
}

/// Owns the stream workers and runs the quoting loop over their state
pub struct Orchestrator {
    settings: LoopSettings,
    rest: Arc<dyn RestApi>,
    strategy: Arc<dyn QuotingStrategy>,
    metrics: Arc<Metrics>,
    book: BookHandle,
    order_events: watch::Receiver<ResourceStatus>,
    positions: AccountStateHandle<String, Decimal>,
    balances: AccountStateHandle<String, Decimal>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    order_slots: Arc<Semaphore>,
    shut_down: AtomicBool,
}

impl Orchestrator {
    /// Spawn the book, order event, positions and balances workers
    pub fn start(
        settings: LoopSettings,
        rest: Arc<dyn RestApi>,
        transport: Arc<dyn StreamTransport>,
        strategy: Arc<dyn QuotingStrategy>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let mut tasks = Vec::new();

        let (book_feed, book) = BookFeed::new(
            &settings.symbol,
            rest.clone(),
            transport.clone(),
            settings.reconnect_delay,
            metrics.clone(),
        );
        tasks.push(tokio::spawn(async move {
            // Failure is reported through the book status
            let _ = book_feed.run().await;
        }));

        let (order_events, order_task) =
            spawn_order_events(transport.clone(), settings.reconnect_delay);
        tasks.push(order_task);

        let positions = spawn_account_stream(
            PositionFeed,
            rest.clone(),
            transport.clone(),
            settings.reconnect_delay,
            metrics.clone(),
        );
        tasks.extend(positions.tasks);

        let balances = spawn_account_stream(
            BalanceFeed,
            rest.clone(),
            transport,
            settings.reconnect_delay,
            metrics.clone(),
        );
        tasks.extend(balances.tasks);

        info!(symbol = %settings.symbol, workers = tasks.len(), "Background workers started");

        Self {
            order_slots: Arc::new(Semaphore::new(settings.max_inflight_orders)),
            settings,
            rest,
            strategy,
            metrics,
            book,
            order_events,
            positions: positions.handle,
            balances: balances.handle,
            tasks: Mutex::new(tasks),
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn current_book(&self) -> Option<Arc<PriceLevelBook>> {
        self.book.current()
    }

    pub fn current_positions(&self) -> Arc<Positions> {
        self.positions.current()
    }

    pub fn current_balances(&self) -> Arc<Balances> {
        self.balances.current()
    }

    pub fn is_ready(&self) -> Readiness {
        Readiness {
            book: self.book.status(),
            order_events: self.order_events.borrow().clone(),
            positions: self.positions.status(),
            balances: self.balances.status(),
        }
    }

    pub fn all_ready(&self) -> bool {
        self.is_ready().all_ready()
    }

    fn check_failures(readiness: &Readiness) -> Result<()> {
        match readiness.failure() {
            Some((resource, reason)) => Err(MarketMakerError::ResourceFailed {
                resource: resource.to_string(),
                reason,
            }),
            None => Ok(()),
        }
    }

    /// Re-check readiness every poll interval until all resources are ready
    pub async fn wait_until_ready(&self) -> Result<()> {
        let mut poll = interval(self.settings.readiness_poll);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            poll.tick().await;

            let readiness = self.is_ready();
            Self::check_failures(&readiness)?;
            if readiness.all_ready() {
                info!("All resources ready");
                return Ok(());
            }
            info!(pending = ?readiness.pending(), "Waiting for resources");
        }
    }

    /// One quoting round: log state, cancel resting orders, submit the ladder
    pub async fn tick(&self) -> Result<()> {
        Self::check_failures(&self.is_ready())?;

        let book = self.current_book();
        match &book {
            Some(book) => {
                let positions = holdings(&self.current_positions());
                let balances = holdings(&self.current_balances());
                let metrics = book.metrics();
                info!(
                    symbol = %self.settings.symbol,
                    sequence = book.sequence(),
                    best_bid = ?book.best_bid().map(|l| l.price),
                    best_ask = ?book.best_ask().map(|l| l.price),
                    impact_spread = ?metrics.impact_spread,
                    depth_1pct = ?metrics.depth_1pct,
                    healthy = metrics.is_healthy(),
                    positions = ?positions,
                    balances = ?balances,
                    "Tick"
                );
            }
            None => debug!("No synchronized book, pulling quotes"),
        }

        // Quotes priced off a book that is resynchronizing must not stay live
        if let Err(e) = self.rest.cancel_all_orders(&self.settings.symbol).await {
            warn!(symbol = %self.settings.symbol, error = %e, "Failed to cancel resting orders");
            self.metrics.order_failures.inc();
        }

        let Some(book) = book else {
            self.metrics.ticks_skipped.inc();
            return Ok(());
        };

        let bbo = match book.best_bid_offer() {
            Ok(bbo) => bbo,
            Err(e) => {
                info!(error = %e, "Skipping tick");
                self.metrics.ticks_skipped.inc();
                return Ok(());
            }
        };

        for quote in self.strategy.quotes(&bbo) {
            self.submit(quote).await;
        }
        Ok(())
    }

    /// Dispatch one order as its own task once an in-flight slot is free
    async fn submit(&self, quote: QuoteRequest) {
        let Ok(permit) = self.order_slots.clone().acquire_owned().await else {
            return;
        };
        let rest = self.rest.clone();
        let metrics = self.metrics.clone();

        tokio::spawn(async move {
            let _permit = permit;
            match rest.submit_order(&quote).await {
                Ok(order_id) => {
                    metrics.orders_submitted.inc();
                    debug!(
                        order_id,
                        side = quote.side.as_str(),
                        price = %quote.price,
                        quantity = %quote.quantity,
                        "Order submitted"
                    );
                }
                Err(e) => {
                    metrics.order_failures.inc();
                    warn!(
                        side = quote.side.as_str(),
                        price = %quote.price,
                        error = %e,
                        "Order submission failed"
                    );
                }
            }
        });
    }

    /// Wait for readiness, then tick until a resource fails
    pub async fn run_forever(&self) -> Result<()> {
        self.wait_until_ready().await?;

        loop {
            self.tick().await?;
            sleep(self.settings.tick_interval).await;
        }
    }

    /// Stop the workers, wait for in-flight submissions and cancel resting
    /// orders. Only the first call has an effect.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Ok(mut tasks) = self.tasks.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }

        // Holding every slot means no submission is still in flight
        let slots = self.settings.max_inflight_orders as u32;
        if let Ok(permits) = self.order_slots.acquire_many(slots).await {
            self.order_slots.close();
            drop(permits);
        }

        match self.rest.cancel_all_orders(&self.settings.symbol).await {
            Ok(()) => info!(symbol = %self.settings.symbol, "Cancelled resting orders on shutdown"),
            Err(e) => warn!(symbol = %self.settings.symbol, error = %e, "Cancel on shutdown failed"),
        }
    }
}

fn holdings(table: &AccountStateTable<String, Decimal>) -> Vec<(String, Decimal)> {
    table.iter().map(|(key, value)| (key.clone(), *value)).collect()
}
