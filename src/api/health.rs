//! Shared health state for the /health endpoint.
//! Updated by the orchestrator at the end of every cycle.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Worker liveness counters. Written by the orchestrator, read by the API.
#[derive(Default)]
pub struct HealthState {
    /// Completed pricing cycles since process start.
    pub cycles_completed: AtomicU64,
    /// Unix seconds of the last completed cycle (0 = none yet).
    pub last_cycle_at: AtomicI64,
    /// Running totals across all cycles.
    pub auto_applied_total: AtomicU64,
    pub escalated_total: AtomicU64,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_cycle(&self, at: i64, auto_applied: u64, escalated: u64) {
        self.cycles_completed.fetch_add(1, Ordering::Relaxed);
        self.last_cycle_at.store(at, Ordering::Relaxed);
        self.auto_applied_total.fetch_add(auto_applied, Ordering::Relaxed);
        self.escalated_total.fetch_add(escalated, Ordering::Relaxed);
    }

    pub fn cycles_completed(&self) -> u64 {
        self.cycles_completed.load(Ordering::Relaxed)
    }

    pub fn last_cycle_at(&self) -> i64 {
        self.last_cycle_at.load(Ordering::Relaxed)
    }

    pub fn auto_applied_total(&self) -> u64 {
        self.auto_applied_total.load(Ordering::Relaxed)
    }

    pub fn escalated_total(&self) -> u64 {
        self.escalated_total.load(Ordering::Relaxed)
    }
}
