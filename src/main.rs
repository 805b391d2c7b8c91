mod api;
mod config;
mod db;
mod engine;
mod error;
mod escalation;
mod gatekeeper;
mod notify;
mod orchestrator;
mod snapshot;
mod types;

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::health::HealthState;
use crate::api::routes::{router, ApiState};
use crate::config::Config;
use crate::db::ListingStore;
use crate::error::Result;
use crate::escalation::EscalationDispatcher;
use crate::orchestrator::TickOrchestrator;
use crate::types::PriceChangedEvent;

/// Capacity for the price-changed event channel to the fan-out boundary.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    let once = std::env::args().any(|a| a == "--once");

    if let Err(e) = run(cfg, once).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config, once: bool) -> Result<()> {
    // --- Database setup ---
    let pool = sqlx::SqlitePool::connect(&format!("sqlite:{}?mode=rwc", cfg.db_path)).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database ready at {}", cfg.db_path);

    let store = ListingStore::new(pool.clone());

    // Weights and tunables, loaded once at startup; the orchestrator
    // hot-reloads between cycles when the store has newer rows.
    let pricing = store.load_pricing_config().await?;
    info!(
        price_step = pricing.price_step,
        floor = pricing.price_floor,
        ceiling = pricing.price_ceiling,
        loaded_at = pricing.loaded_at,
        "Pricing config loaded"
    );

    if cfg.reasoner_api_key.is_empty() {
        warn!("REASONER_API_KEY not set — escalation batches will fail until it is provided");
    }

    // --- Price-changed event channel (realtime fan-out boundary) ---
    let (event_tx, event_rx) = mpsc::channel::<PriceChangedEvent>(EVENT_CHANNEL_CAPACITY);
    tokio::spawn(async move { event_consumer(event_rx).await });

    // --- Orchestrator ---
    let dispatcher = EscalationDispatcher::new(cfg.clone(), store.clone(), event_tx.clone())?;
    let health = Arc::new(HealthState::new());
    let mut orchestrator = TickOrchestrator::new(
        cfg.clone(),
        store,
        dispatcher,
        event_tx,
        Arc::clone(&health),
        pricing,
    );

    if once {
        // Operational verification: one full cycle, then exit.
        let stats = orchestrator.run_once().await?;
        info!(
            processed = stats.processed,
            auto_applied = stats.auto_applied,
            escalated = stats.escalated,
            failed = stats.failed,
            "Single cycle complete, exiting"
        );
        return Ok(());
    }

    // --- HTTP health/stats probe ---
    let api_state = ApiState { pool: pool.clone(), health };
    let app = router(api_state);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("API server error: {e}");
        }
    });

    info!(interval_secs = cfg.cycle_interval_secs, "Entering continuous pricing loop");
    orchestrator.run().await;

    info!("Shutdown complete");
    Ok(())
}

/// Consumes committed price changes. The realtime fan-out layer is an
/// external collaborator; at this boundary every event is logged in its wire
/// shape so downstream consumers can be replayed from the logs if needed.
async fn event_consumer(mut rx: mpsc::Receiver<PriceChangedEvent>) {
    while let Some(event) = rx.recv().await {
        match serde_json::to_string(&event) {
            Ok(payload) => info!(
                event = "PRICE_CHANGED",
                listing_id = %event.listing_id,
                old_price = event.old_price,
                new_price = event.new_price,
                trend = event.trend,
                source = %event.source,
                "{payload}"
            ),
            Err(e) => warn!("event serialization failed: {e}"),
        }
    }
}
