//! WOO X Market Maker
//!
//! Reconciles the order book, positions and balances of one symbol and
//! quotes a ladder around the best bid and offer.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use woo_market_maker::engine::LoopSettings;
use woo_market_maker::exchange::{RestApi, WooRestClient};
use woo_market_maker::quoting::{Instrument, LadderStrategy};
use woo_market_maker::telemetry::{init_tracing, Metrics};
use woo_market_maker::websocket::WsTransport;
use woo_market_maker::{AppState, Config, Orchestrator};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!("Starting WOO X Market Maker");

    let config = Arc::new(Config::load()?);
    info!(
        environment = ?config.environment,
        symbol = %config.symbol,
        quote_count = config.quote_count,
        quote_spread = %config.quote_spread,
        "Configuration loaded"
    );

    let metrics = Arc::new(Metrics::new()?);
    let rest = Arc::new(WooRestClient::new(&config.rest_endpoint, config.snapshot_depth));

    let instrument = Instrument::from(rest.instrument(&config.symbol).await?);
    let strategy = Arc::new(LadderStrategy::new(
        config.quote_count,
        config.quote_spread,
        config.quote_size,
        instrument,
    ));

    let transport = Arc::new(WsTransport::new(&config));
    let orchestrator = Arc::new(Orchestrator::start(
        LoopSettings::from(config.as_ref()),
        rest,
        transport,
        strategy,
        metrics.clone(),
    ));

    let state = Arc::new(AppState {
        orchestrator: orchestrator.clone(),
        metrics,
        config: config.clone(),
    });

    let health_state = state.clone();
    tokio::spawn(async move {
        if let Err(e) = start_health_server(health_state).await {
            warn!(error = %e, "Health server error");
        }
    });

    let outcome = tokio::select! {
        result = orchestrator.run_forever() => result.map_err(anyhow::Error::from),
        result = shutdown_signal() => {
            info!("Shutdown signal received");
            result
        }
    };

    orchestrator.shutdown().await;

    if let Err(e) = &outcome {
        error!(error = %e, "Market maker stopped");
    }
    outcome
}

/// Resolves on Ctrl-C or SIGTERM
async fn shutdown_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result?,
            _ = terminate.recv() => {}
        }
    }

    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;

    Ok(())
}

/// Start HTTP server for health checks and metrics
async fn start_health_server(state: Arc<AppState>) -> anyhow::Result<()> {
    let app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], state.config.health_port));
    info!(addr = %addr, "Starting health check server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let readiness = state.orchestrator.is_ready();
    Json(serde_json::json!({
        "status": if readiness.all_ready() { "ready" } else { "starting" },
        "component": "woo-market-maker",
        "symbol": state.config.symbol,
        "resources": readiness,
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn metrics(State(state): State<Arc<AppState>>) -> String {
    state.metrics.render()
}
