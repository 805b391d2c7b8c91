//! Auto-apply vs escalate decision.
//!
//! Small, low-urgency moves are routine and safe to commit without review.
//! Larger moves, or any move close to the deadline, can cross tier price
//! bands or promotional triggers and must go through the escalation path.

use crate::config::GATE_URGENCY_HOURS;

/// Auto-apply iff |delta| < price_step AND hours_remaining > 12.
/// Both boundaries escalate: |delta| == step and hours == 12 fail the gate.
pub fn should_auto_apply(delta: f64, hours_remaining: f64, price_step: f64) -> bool {
    delta.abs() < price_step && hours_remaining > GATE_URGENCY_HOURS
}
