use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Tier
// ---------------------------------------------------------------------------

/// Listing tier, ordinal: Standard < Featured < Premium.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Standard,
    Featured,
    Premium,
}

impl Tier {
    /// Stored in the DB as 1/2/3; anything else maps to Standard.
    pub fn from_level(level: i64) -> Self {
        match level {
            3 => Tier::Premium,
            2 => Tier::Featured,
            _ => Tier::Standard,
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Tier::Standard => "standard",
            Tier::Featured => "featured",
            Tier::Premium => "premium",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Pricing snapshot — the frozen per-listing scoring input for one cycle
// ---------------------------------------------------------------------------

/// Short-window refinement counters (trailing 10 minutes).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecentActivity {
    pub clicks_10m: i64,
    pub pitches_10m: i64,
    /// Submitted pitches / clicks over the listing lifetime, 0 when no clicks.
    pub conversion_rate: f64,
    /// Open listings for the same outlet in the trailing 7 days.
    pub outlet_load: i64,
    pub minutes_since_last_interaction: Option<f64>,
}

/// Built fresh each cycle, never mutated. Persisted only as the audit copy
/// written alongside a committed price.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingSnapshot {
    pub listing_id: String,
    pub tier: Tier,
    pub current_price: f64,
    pub pitch_count: i64,
    pub click_count: i64,
    pub save_count: i64,
    pub draft_count: i64,
    pub email_clicks_last_hour: i64,
    /// Signed: negative means the deadline has passed.
    pub hours_remaining: f64,
    pub outlet_avg_price: Option<f64>,
    /// Historical success rate in [0, 1].
    pub success_rate: Option<f64>,
    pub inventory: i64,
    pub category: Option<String>,
    pub recent: Option<RecentActivity>,
}

// ---------------------------------------------------------------------------
// Pricing config — hot-reloadable weights and tunables
// ---------------------------------------------------------------------------

/// Loaded from pricing_config key/value rows at startup and replaced wholesale
/// on hot reload. Never mutated in place, never swapped mid-cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct PricingConfig {
    pub weight_pitches: f64,
    pub weight_clicks: f64,
    pub weight_saves: f64,
    pub weight_drafts: f64,
    pub weight_email_clicks: f64,
    pub weight_success_rate: f64,
    /// The only unit of movement: price moves by exactly one step per cycle.
    pub price_step: f64,
    pub elasticity: f64,
    pub price_floor: f64,
    pub price_ceiling: f64,
    /// MAX(updated_at) over the source rows at load time (unix seconds).
    /// Compared against the store to decide staleness on reload checks.
    pub loaded_at: i64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            weight_pitches: 1.0,
            weight_clicks: 0.2,
            weight_saves: 0.3,
            weight_drafts: 0.5,
            weight_email_clicks: 0.4,
            weight_success_rate: 5.0,
            price_step: 5.0,
            elasticity: 1.0,
            price_floor: 50.0,
            price_ceiling: 500.0,
            loaded_at: 0,
        }
    }
}

impl PricingConfig {
    /// Apply one persisted key/value row. Unknown keys are ignored so new rows
    /// can be introduced ahead of a deploy.
    pub fn apply_kv(&mut self, key: &str, value: f64) {
        match key {
            "weight_pitches" => self.weight_pitches = value,
            "weight_clicks" => self.weight_clicks = value,
            "weight_saves" => self.weight_saves = value,
            "weight_drafts" => self.weight_drafts = value,
            "weight_email_clicks" => self.weight_email_clicks = value,
            "weight_success_rate" => self.weight_success_rate = value,
            "price_step" => self.price_step = value,
            "elasticity" => self.elasticity = value,
            "price_floor" => self.price_floor = value,
            "price_ceiling" => self.price_ceiling = value,
            _ => {}
        }
    }

    /// Clamp a candidate price into the configured band. Order-safe: an
    /// inverted floor/ceiling pair still yields a bounded price rather than
    /// panicking, so a bad config row can never take a cycle down.
    pub fn clamp_price(&self, price: f64) -> f64 {
        let lo = self.price_floor.min(self.price_ceiling);
        let hi = self.price_floor.max(self.price_ceiling);
        price.clamp(lo, hi)
    }

    /// Reject configs that cannot price safely. Checked at load time so a bad
    /// hot-reload row keeps the cached copy instead of poisoning every cycle.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !self.price_floor.is_finite() || !self.price_ceiling.is_finite() {
            return Err(format!(
                "non-finite price bounds: floor {} ceiling {}",
                self.price_floor, self.price_ceiling
            ));
        }
        if self.price_floor > self.price_ceiling {
            return Err(format!(
                "price_floor {} exceeds price_ceiling {}",
                self.price_floor, self.price_ceiling
            ));
        }
        if !self.price_step.is_finite() || self.price_step < 0.0 {
            return Err(format!("invalid price_step {}", self.price_step));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Pricing result
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingResult {
    /// Always within [price_floor, price_ceiling].
    pub price: f64,
    /// Raw elasticity-weighted delta, fed to the gatekeeper.
    pub delta: f64,
    /// Aggregate score: demand + yield pull - supply pressure - risk.
    pub score: f64,
    /// True when a nonzero move occurred with |delta| under the noise
    /// threshold — baseline decay rather than a signal-driven move.
    pub drift_applied: bool,
    /// Magnitude of the pull toward the outlet's historical average.
    pub outlet_pull: f64,
    /// Unix seconds when the result was computed.
    pub computed_at: i64,
}

// ---------------------------------------------------------------------------
// Escalation
// ---------------------------------------------------------------------------

/// A snapshot whose suggested change failed the gatekeeper and awaits review.
#[derive(Debug, Clone)]
pub struct EscalationEntry {
    pub snapshot: PricingSnapshot,
    pub suggested_price: f64,
    pub delta: f64,
}

/// One reviewed action from the reasoning service.
#[derive(Debug, Clone, Deserialize)]
pub struct ReviewAction {
    pub listing_id: String,
    pub action: ReviewVerb,
    pub price: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewVerb {
    Set,
    Increase,
    Decrease,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReviewNotification {
    pub listing_id: String,
    pub template: String,
}

/// The strict response schema. Anything that does not deserialize into this
/// fails the whole batch — no partial application.
#[derive(Debug, Clone, Deserialize)]
pub struct ReviewResponse {
    pub actions: Vec<ReviewAction>,
    #[serde(default)]
    pub notifications: Vec<ReviewNotification>,
}

// ---------------------------------------------------------------------------
// Price-changed events — emitted on every commit, consumed by the realtime
// fan-out boundary at the process edge
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceSource {
    Worker,
    Gpt,
    Admin,
}

impl std::fmt::Display for PriceSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PriceSource::Worker => "worker",
            PriceSource::Gpt => "gpt",
            PriceSource::Admin => "admin",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PriceChangedEvent {
    pub listing_id: String,
    pub old_price: f64,
    pub new_price: f64,
    /// Sign of the move: +1 up, -1 down, 0 unchanged.
    pub trend: i8,
    pub timestamp: i64,
    pub source: PriceSource,
}

impl PriceChangedEvent {
    pub fn new(listing_id: String, old_price: f64, new_price: f64, timestamp: i64, source: PriceSource) -> Self {
        let trend = if new_price > old_price {
            1
        } else if new_price < old_price {
            -1
        } else {
            0
        };
        Self { listing_id, old_price, new_price, trend, timestamp, source }
    }
}
