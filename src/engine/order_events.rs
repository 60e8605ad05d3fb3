//! Own order events from the private `executionreport` topic

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use super::ResourceStatus;
use crate::error::Result;
use crate::exchange::{Channel, StreamTransport};
use crate::parser::ExecutionReport;

const TOPIC: &str = "executionreport";

/// Spawn the worker; its status turns `Ready` once subscribed
pub fn spawn_order_events(
    transport: Arc<dyn StreamTransport>,
    reconnect_delay: Duration,
) -> (watch::Receiver<ResourceStatus>, JoinHandle<()>) {
    let (status_tx, status_rx) = watch::channel(ResourceStatus::Pending);
    let task = tokio::spawn(run(transport, status_tx, reconnect_delay));
    (status_rx, task)
}

async fn run(
    transport: Arc<dyn StreamTransport>,
    status_tx: watch::Sender<ResourceStatus>,
    reconnect_delay: Duration,
) {
    loop {
        match follow(transport.as_ref(), &status_tx).await {
            Ok(()) => warn!("Order event stream ended, resubscribing"),
            Err(e) if !e.is_recoverable() => {
                error!(error = %e, "Order event stream failed");
                status_tx.send_replace(ResourceStatus::Failed(e.to_string()));
                return;
            }
            Err(e) => warn!(error = %e, "Order event stream error, resubscribing"),
        }
        sleep(reconnect_delay).await;
    }
}

async fn follow(
    transport: &dyn StreamTransport,
    status_tx: &watch::Sender<ResourceStatus>,
) -> Result<()> {
    let mut messages = transport.subscribe(Channel::Private, TOPIC).await?;

    if !status_tx.borrow().is_ready() {
        info!("Order event stream ready");
        status_tx.send_replace(ResourceStatus::Ready);
    }

    while let Some(item) = messages.next().await {
        let message = item?;
        match ExecutionReport::from_message(&message) {
            Ok(report) => log_execution_report(&report),
            Err(e) => warn!(error = %e, "Failed to parse execution report"),
        }
    }

    Ok(())
}

fn log_execution_report(report: &ExecutionReport) {
    match report.status.as_str() {
        "NEW" => info!(
            order_id = report.order_id,
            side = %report.side,
            price = %report.price,
            quantity = %report.quantity,
            "Order placed"
        ),
        "CANCELLED" => info!(
            order_id = report.order_id,
            side = %report.side,
            price = %report.price,
            quantity = %report.quantity,
            "Order cancelled"
        ),
        "PARTIAL_FILLED" | "FILLED" => info!(
            order_id = report.order_id,
            side = %report.side,
            status = %report.status,
            executed_quantity = %report.executed_quantity,
            executed_price = %report.executed_price,
            "Order filled"
        ),
        other => debug!(order_id = report.order_id, status = %other, "Order event"),
    }
}
