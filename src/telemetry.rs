//! Logging setup and Prometheus counters

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// JSON logs filtered by `RUST_LOG`, INFO by default
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();
}

/// Counters exported on `/metrics`
pub struct Metrics {
    registry: Registry,

    /// Deltas applied to a synchronized book
    pub applied_deltas: IntCounter,

    /// Book resynchronizations, labelled by reason
    pub resyncs: IntCounterVec,

    /// Accepted account observations, labelled by feed
    pub account_updates: IntCounterVec,

    pub orders_submitted: IntCounter,
    pub order_failures: IntCounter,

    /// Quoting ticks skipped for lack of a usable book
    pub ticks_skipped: IntCounter,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new_custom(Some("woo_mm".to_string()), None)?;

        let applied_deltas = IntCounter::new("book_applied_deltas_total", "Deltas applied to the book")?;
        let resyncs = IntCounterVec::new(
            Opts::new("book_resyncs_total", "Order book resynchronizations"),
            &["reason"],
        )?;
        let account_updates = IntCounterVec::new(
            Opts::new("account_updates_total", "Accepted account observations"),
            &["feed"],
        )?;
        let orders_submitted = IntCounter::new("orders_submitted_total", "Orders accepted by the exchange")?;
        let order_failures = IntCounter::new("order_failures_total", "Failed order submissions and cancels")?;
        let ticks_skipped = IntCounter::new("ticks_skipped_total", "Quoting ticks skipped")?;

        registry.register(Box::new(applied_deltas.clone()))?;
        registry.register(Box::new(resyncs.clone()))?;
        registry.register(Box::new(account_updates.clone()))?;
        registry.register(Box::new(orders_submitted.clone()))?;
        registry.register(Box::new(order_failures.clone()))?;
        registry.register(Box::new(ticks_skipped.clone()))?;

        Ok(Self {
            registry,
            applied_deltas,
            resyncs,
            account_updates,
            orders_submitted,
            order_failures,
            ticks_skipped,
        })
    }

    /// Prometheus text exposition of all counters
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            tracing::warn!(error = %e, "Failed to encode metrics");
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}
