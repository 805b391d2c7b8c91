//! Tick orchestrator: the periodic pricing loop.
//!
//! Each cycle: check config staleness (slower cadence), load the live listing
//! set, build snapshots concurrently, then compute + gate + commit strictly
//! sequentially per listing so the audit trail stays deterministically
//! ordered. Escalated listings accumulate into one capped batch handed to the
//! dispatcher at the end of the cycle.
//!
//! Per-listing failures are isolated (logged and counted); only shared-setup
//! failures abort a cycle. An atomic in-flight flag guarantees a slow cycle
//! never overlaps the next scheduled tick.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures_util::future::join_all;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::api::health::HealthState;
use crate::config::Config;
use crate::db::ListingStore;
use crate::engine;
use crate::error::Result;
use crate::escalation::EscalationDispatcher;
use crate::gatekeeper::should_auto_apply;
use crate::snapshot::SnapshotBuilder;
use crate::types::{EscalationEntry, PriceChangedEvent, PriceSource, PricingConfig};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleStats {
    pub processed: usize,
    pub auto_applied: usize,
    pub escalated: usize,
    pub unchanged: usize,
    pub failed: usize,
    /// Escalation entries dropped by the batch cap — a known coverage gap.
    pub dropped: usize,
}

pub struct TickOrchestrator {
    cfg: Config,
    store: ListingStore,
    builder: SnapshotBuilder,
    dispatcher: EscalationDispatcher,
    event_tx: mpsc::Sender<PriceChangedEvent>,
    health: Arc<HealthState>,
    /// Owned pricing config, replaced wholesale on hot reload — never mutated
    /// in place, never swapped mid-cycle.
    pricing: PricingConfig,
    last_config_check: i64,
    in_flight: AtomicBool,
}

impl TickOrchestrator {
    pub fn new(
        cfg: Config,
        store: ListingStore,
        dispatcher: EscalationDispatcher,
        event_tx: mpsc::Sender<PriceChangedEvent>,
        health: Arc<HealthState>,
        pricing: PricingConfig,
    ) -> Self {
        let builder = SnapshotBuilder::new(store.pool().clone());
        Self {
            cfg,
            store,
            builder,
            dispatcher,
            event_tx,
            health,
            pricing,
            last_config_check: 0,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Continuous mode: tick forever until a shutdown signal arrives. The
    /// signal stops new cycles; an in-flight cycle always runs to completion.
    pub async fn run(self) {
        let shutdown = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("shutdown signal listener failed: {e}");
            }
        };
        self.run_until(shutdown).await;
    }

    /// The shutdown future is created once and pinned outside the loop, so a
    /// signal delivered while a cycle is in flight is latched and honored on
    /// the next loop iteration instead of being dropped with the select arm.
    async fn run_until(mut self, shutdown: impl Future<Output = ()>) {
        let mut ticker = interval(Duration::from_secs(self.cfg.cycle_interval_secs));
        // A stalled cycle delays subsequent ticks rather than bursting them.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.cycle().await {
                        error!("pricing cycle failed: {e}");
                    }
                }
                _ = &mut shutdown => {
                    info!("shutdown signal received, no further cycles");
                    break;
                }
            }
        }
    }

    /// Single-cycle mode (`--once`) for operational verification.
    pub async fn run_once(&mut self) -> Result<CycleStats> {
        self.cycle().await
    }

    async fn cycle(&mut self) -> Result<CycleStats> {
        // Single-flight guard. The run loop awaits cycles serially, so within
        // it this flag stays false; it makes the no-overlap invariant explicit
        // and trips if any future entry point ever runs a cycle concurrently
        // (e.g. an operational run_once against a live instance).
        if self.in_flight.swap(true, Ordering::SeqCst) {
            warn!("previous cycle still in flight, skipping this tick");
            return Ok(CycleStats::default());
        }
        let result = self.cycle_inner().await;
        self.in_flight.store(false, Ordering::SeqCst);
        result
    }

    async fn cycle_inner(&mut self) -> Result<CycleStats> {
        let now = now_secs();
        self.maybe_reload_config(now).await;

        // Shared setup: failure here aborts the cycle.
        let listings = self.store.load_live_listings().await?;

        // Independent reads fan out concurrently; compute/commit below stays
        // sequential for deterministic audit ordering.
        let snapshots = join_all(
            listings
                .iter()
                .map(|listing| self.builder.build(listing, now)),
        )
        .await;

        let mut stats = CycleStats { processed: listings.len(), ..Default::default() };
        let mut batch: Vec<EscalationEntry> = Vec::new();

        for (listing, built) in listings.iter().zip(snapshots) {
            let snapshot = match built {
                Ok(s) => s,
                Err(e) => {
                    stats.failed += 1;
                    warn!(listing_id = %listing.id, "snapshot build failed: {e}");
                    continue;
                }
            };

            let result = engine::compute(&snapshot, &self.pricing, now);
            if result.price == snapshot.current_price {
                stats.unchanged += 1;
                continue;
            }

            if should_auto_apply(result.delta, snapshot.hours_remaining, self.pricing.price_step) {
                match self
                    .store
                    .commit_price(&snapshot, result.price, "worker", result.drift_applied, now)
                    .await
                {
                    Ok(()) => {
                        stats.auto_applied += 1;
                        let event = PriceChangedEvent::new(
                            snapshot.listing_id.clone(),
                            snapshot.current_price,
                            result.price,
                            now,
                            PriceSource::Worker,
                        );
                        if let Err(e) = self.event_tx.send(event).await {
                            error!("price event channel closed: {e}");
                        }
                    }
                    Err(e) => {
                        stats.failed += 1;
                        warn!(listing_id = %snapshot.listing_id, "commit failed: {e}");
                    }
                }
            } else {
                stats.escalated += 1;
                batch.push(EscalationEntry {
                    delta: result.delta,
                    suggested_price: result.price,
                    snapshot,
                });
            }
        }

        stats.dropped = cap_batch(&mut batch, self.cfg.escalation_batch_cap);
        if stats.dropped > 0 {
            warn!(
                dropped = stats.dropped,
                cap = self.cfg.escalation_batch_cap,
                "escalation batch overflow, entries dropped until next cycle"
            );
        }

        if !batch.is_empty() {
            // Batch failure (timeout, transport, bad schema) is not a cycle
            // failure — the affected listings retry next cycle.
            if let Err(e) = self.dispatcher.dispatch(&batch, &self.pricing, now).await {
                warn!(batch = batch.len(), "escalation batch dropped: {e}");
            }
        }

        self.health.record_cycle(now, stats.auto_applied as u64, stats.escalated as u64);

        info!(
            processed = stats.processed,
            auto_applied = stats.auto_applied,
            escalated = stats.escalated,
            unchanged = stats.unchanged,
            failed = stats.failed,
            dropped = stats.dropped,
            "cycle complete"
        );
        Ok(stats)
    }

    /// Hot reload on a slower cadence than the cycle itself. The config is
    /// only ever swapped between cycles, wholesale.
    async fn maybe_reload_config(&mut self, now: i64) {
        if now - self.last_config_check < self.cfg.config_recheck_secs as i64 {
            return;
        }
        self.last_config_check = now;

        match self.store.config_updated_since(self.pricing.loaded_at).await {
            Ok(false) => {}
            Ok(true) => match self.store.load_pricing_config().await {
                Ok(fresh) => {
                    info!(
                        old_loaded_at = self.pricing.loaded_at,
                        new_loaded_at = fresh.loaded_at,
                        "pricing config hot-reloaded"
                    );
                    self.pricing = fresh;
                }
                Err(e) => warn!("config reload failed, keeping cached copy: {e}"),
            },
            Err(e) => warn!("config staleness check failed: {e}"),
        }
    }
}

/// Truncate the batch to the cap; returns how many entries were dropped.
fn cap_batch(batch: &mut Vec<EscalationEntry>, cap: usize) -> usize {
    let dropped = batch.len().saturating_sub(cap);
    batch.truncate(cap);
    dropped
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
