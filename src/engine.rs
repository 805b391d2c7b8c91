//! Pure pricing engine: snapshot + config -> new price + telemetry.
//!
//! The engine is deliberately a bounded-step controller, not proportional
//! control: whatever the aggregate signal says, the price moves by exactly one
//! configured step per cycle (or not at all), then gets clamped to the
//! [floor, ceiling] band. Arbitrarily large counters cannot cause a jump.

use crate::config::{urgency, NOISE_DELTA_EPS};
use crate::types::{PricingConfig, PricingResult, PricingSnapshot};

/// Supply pressure as a function of signed hours remaining.
///
/// A smooth, bounded urgency curve: 0 at or beyond the 24h horizon, ~0.7 at
/// 12h, capped at 1.5 as remaining time approaches 0 or goes negative.
/// Overdue listings (negative hours) sit at the cap.
pub fn supply_pressure(hours_remaining: f64) -> f64 {
    let u = ((urgency::HORIZON_HOURS - hours_remaining) / urgency::HORIZON_HOURS).clamp(0.0, 1.0);
    urgency::MAX_PRESSURE * u.powf(urgency::EXPONENT)
}

/// Compute the next price for one listing. Pure: same inputs, same output.
/// `now` is the cycle timestamp (unix seconds), stamped into the telemetry.
pub fn compute(snapshot: &PricingSnapshot, cfg: &PricingConfig, now: i64) -> PricingResult {
    let demand_score = snapshot.pitch_count as f64 * cfg.weight_pitches
        + snapshot.click_count as f64 * cfg.weight_clicks
        + snapshot.save_count as f64 * cfg.weight_saves
        + snapshot.draft_count as f64 * cfg.weight_drafts
        + snapshot.email_clicks_last_hour as f64 * cfg.weight_email_clicks;

    let pressure = supply_pressure(snapshot.hours_remaining);

    // Pull toward the outlet's historical norm when an average is known.
    let yield_pull = match snapshot.outlet_avg_price {
        Some(avg) if avg > 0.0 => (avg - snapshot.current_price) / avg,
        _ => 0.0,
    };

    // Discount for historically low-converting outlets.
    let risk_adjustment = match snapshot.success_rate {
        Some(rate) => (1.0 - rate.clamp(0.0, 1.0)) * cfg.weight_success_rate.abs(),
        None => 0.0,
    };

    let delta = cfg.elasticity * demand_score + yield_pull - pressure - risk_adjustment;

    // Sign-based single step. Non-positive delta drifts downward — with no
    // signals at all a listing decays one step per cycle.
    let step = if cfg.price_step == 0.0 {
        0.0
    } else if delta > 0.0 {
        cfg.price_step
    } else {
        -cfg.price_step
    };

    let price = cfg.clamp_price(snapshot.current_price + step);

    PricingResult {
        price,
        delta,
        score: demand_score + yield_pull - pressure - risk_adjustment,
        drift_applied: price != snapshot.current_price && delta.abs() < NOISE_DELTA_EPS,
        outlet_pull: yield_pull.abs(),
        computed_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Tier;

    fn snapshot(price: f64, hours: f64) -> PricingSnapshot {
        PricingSnapshot {
            listing_id: "l1".to_string(),
            tier: Tier::Standard,
            current_price: price,
            pitch_count: 0,
            click_count: 0,
            save_count: 0,
            draft_count: 0,
            email_clicks_last_hour: 0,
            hours_remaining: hours,
            outlet_avg_price: None,
            success_rate: None,
            inventory: 1,
            category: None,
            recent: None,
        }
    }

    #[test]
    fn pressure_zero_at_and_beyond_horizon() {
        assert_eq!(supply_pressure(24.0), 0.0);
        assert_eq!(supply_pressure(30.0), 0.0);
        assert_eq!(supply_pressure(1000.0), 0.0);
    }

    #[test]
    fn pressure_midpoint_near_point_seven() {
        let p = supply_pressure(12.0);
        assert!((p - 0.7).abs() < 0.1, "pressure(12) = {p}");
    }

    #[test]
    fn pressure_capped_for_overdue() {
        assert!((supply_pressure(0.0) - 1.5).abs() < 1e-9);
        assert!((supply_pressure(-5.0) - 1.5).abs() < 1e-9);
        for h in [-48.0, -1.0, 0.25, 3.0, 12.0, 23.9, 24.0, 100.0] {
            assert!(supply_pressure(h) <= 1.5);
            assert!(supply_pressure(h) >= 0.0);
        }
    }

    #[test]
    fn five_pitches_move_one_step_up() {
        // 5 pitches at weight 1.0, $200, default config -> $205.
        let mut s = snapshot(200.0, 48.0);
        s.pitch_count = 5;
        let r = compute(&s, &PricingConfig::default(), 0);
        assert_eq!(r.price, 205.0);
        assert!(!r.drift_applied);
    }

    #[test]
    fn zero_signals_drift_one_step_down() {
        // No demand, 30h remaining (no supply pressure): ambient drift -$5.
        let s = snapshot(200.0, 30.0);
        let r = compute(&s, &PricingConfig::default(), 0);
        assert_eq!(r.price, 195.0);
        assert!(r.drift_applied);
    }

    #[test]
    fn fire_sale_clamps_to_floor() {
        let s = snapshot(55.0, 0.25);
        let cfg = PricingConfig { price_floor: 50.0, ..Default::default() };
        let r = compute(&s, &cfg, 0);
        assert_eq!(r.price, 50.0);
    }

    #[test]
    fn price_always_within_bounds() {
        let cfg = PricingConfig { price_floor: 50.0, price_ceiling: 500.0, ..Default::default() };
        for price in [0.0, 49.0, 50.0, 200.0, 499.0, 500.0, 10_000.0] {
            for hours in [-10.0, 0.5, 12.0, 48.0] {
                let mut s = snapshot(price, hours);
                s.pitch_count = 1_000_000;
                let r = compute(&s, &cfg, 0);
                assert!(r.price >= cfg.price_floor && r.price <= cfg.price_ceiling);
            }
        }
    }

    #[test]
    fn move_is_zero_or_exactly_one_step() {
        let cfg = PricingConfig::default();
        for pitches in [0, 1, 5, 10_000, i64::MAX / 2] {
            let mut s = snapshot(200.0, 6.0);
            s.pitch_count = pitches;
            let r = compute(&s, &cfg, 0);
            let moved = (r.price - s.current_price).abs();
            assert!(moved == 0.0 || moved == cfg.price_step, "moved {moved}");
        }
    }

    #[test]
    fn inverted_bounds_do_not_panic() {
        // Inverted floor/ceiling rows must degrade to a bounded clamp, never
        // a panic that takes the worker down every cycle.
        let mut cfg = PricingConfig::default();
        cfg.apply_kv("price_floor", 100.0);
        cfg.apply_kv("price_ceiling", 50.0);
        let r = compute(&snapshot(75.0, 6.0), &cfg, 0);
        assert!(r.price >= 50.0 && r.price <= 100.0);
    }

    #[test]
    fn zero_price_step_is_a_noop() {
        let mut s = snapshot(200.0, 6.0);
        s.pitch_count = 50;
        let cfg = PricingConfig { price_step: 0.0, ..Default::default() };
        let r = compute(&s, &cfg, 0);
        assert_eq!(r.price, 200.0);
        assert!(!r.drift_applied);
    }

    #[test]
    fn missing_optionals_contribute_zero() {
        let bare = snapshot(200.0, 48.0);
        let r = compute(&bare, &PricingConfig::default(), 0);
        assert_eq!(r.outlet_pull, 0.0);
        // score is exactly zero: no demand, no pressure, no optionals
        assert_eq!(r.score, 0.0);
    }

    #[test]
    fn outlet_average_pulls_toward_norm() {
        let mut s = snapshot(100.0, 48.0);
        s.outlet_avg_price = Some(200.0);
        let r = compute(&s, &PricingConfig::default(), 0);
        // (200 - 100) / 200 = +0.5 pull, price steps up
        assert_eq!(r.price, 105.0);
        assert!((r.outlet_pull - 0.5).abs() < 1e-9);
    }

    #[test]
    fn low_success_rate_discounts() {
        let mut s = snapshot(200.0, 48.0);
        s.pitch_count = 2;
        s.success_rate = Some(0.0);
        // demand 2.0 vs risk (1-0)*5.0 -> delta negative, one step down
        let r = compute(&s, &PricingConfig::default(), 0);
        assert_eq!(r.price, 195.0);
    }

    #[test]
    fn success_rate_clamped_to_unit_interval() {
        let mut s = snapshot(200.0, 48.0);
        s.pitch_count = 2;
        s.success_rate = Some(7.5); // dirty data: treated as 1.0, zero risk
        let r = compute(&s, &PricingConfig::default(), 0);
        assert_eq!(r.price, 205.0);
    }

    #[test]
    fn compute_is_idempotent() {
        let mut s = snapshot(200.0, 9.0);
        s.pitch_count = 3;
        s.outlet_avg_price = Some(180.0);
        s.success_rate = Some(0.6);
        let cfg = PricingConfig::default();
        let a = compute(&s, &cfg, 1234);
        let b = compute(&s, &cfg, 1234);
        assert_eq!(a, b);
    }
}
