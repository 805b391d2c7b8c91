use crate::error::{AppError, Result};

pub const REASONER_URL: &str = "https://api.openai.com/v1/chat/completions";

/// How often the orchestrator runs a full pricing cycle (seconds).
pub const CYCLE_INTERVAL_SECS: u64 = 60;

/// How often the orchestrator checks the config store for newer rows (seconds).
/// Staleness is decided by comparing MAX(updated_at) against the cached copy.
pub const CONFIG_RECHECK_SECS: u64 = 300;

/// Hard cap on escalation batch size. Entries beyond the cap are dropped with
/// a warning — a known coverage gap, listings retry next cycle.
pub const ESCALATION_BATCH_CAP: usize = 50;

/// Hours-remaining threshold for the gatekeeper's urgency condition.
pub const GATE_URGENCY_HOURS: f64 = 12.0;

/// |delta| below this is treated as noise; a nonzero move with |delta| under
/// the threshold is recorded as ambient drift rather than a signal-driven move.
pub const NOISE_DELTA_EPS: f64 = 0.05;

/// Urgency curve parameters. Pressure is 0 at or beyond the horizon, rises
/// smoothly as the deadline approaches, and is capped for h <= 0 (overdue).
pub mod urgency {
    pub const HORIZON_HOURS: f64 = 24.0;
    pub const MAX_PRESSURE: f64 = 1.5;
    pub const EXPONENT: f64 = 1.1;
}

/// Rolling windows used by the snapshot builder (seconds).
pub mod windows {
    pub const EMAIL_CLICK_SECS: i64 = 3_600;
    pub const RECENT_SECS: i64 = 600;
    pub const OUTLET_LOAD_SECS: i64 = 7 * 86_400;
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub db_path: String,
    pub api_port: u16,
    /// Seconds between pricing cycles (CYCLE_INTERVAL_SECS)
    pub cycle_interval_secs: u64,
    /// Seconds between config staleness checks (CONFIG_RECHECK_SECS)
    pub config_recheck_secs: u64,
    /// Max snapshots per escalation batch (ESCALATION_BATCH_CAP)
    pub escalation_batch_cap: usize,
    /// Reasoning service endpoint (REASONER_URL)
    pub reasoner_url: String,
    /// Bearer token for the reasoning service (REASONER_API_KEY)
    pub reasoner_api_key: String,
    /// Model identifier sent with every batch call (REASONER_MODEL)
    pub reasoner_model: String,
    /// Upper bound on a single batch call (REASONER_TIMEOUT_SECS)
    pub reasoner_timeout_secs: u64,
    /// Feature gate for escalation-driven notifications (NOTIFICATIONS_ENABLED)
    pub notifications_enabled: bool,
    /// Optional webhook the notifier posts to (NOTIFY_WEBHOOK_URL)
    pub notify_webhook_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "pricer.db".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            cycle_interval_secs: std::env::var("CYCLE_INTERVAL_SECS")
                .unwrap_or_else(|_| CYCLE_INTERVAL_SECS.to_string())
                .parse::<u64>()
                .unwrap_or(CYCLE_INTERVAL_SECS),
            config_recheck_secs: std::env::var("CONFIG_RECHECK_SECS")
                .unwrap_or_else(|_| CONFIG_RECHECK_SECS.to_string())
                .parse::<u64>()
                .unwrap_or(CONFIG_RECHECK_SECS),
            escalation_batch_cap: std::env::var("ESCALATION_BATCH_CAP")
                .unwrap_or_else(|_| ESCALATION_BATCH_CAP.to_string())
                .parse::<usize>()
                .unwrap_or(ESCALATION_BATCH_CAP),
            reasoner_url: std::env::var("REASONER_URL")
                .unwrap_or_else(|_| REASONER_URL.to_string()),
            reasoner_api_key: std::env::var("REASONER_API_KEY").unwrap_or_default(),
            reasoner_model: std::env::var("REASONER_MODEL")
                .unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            reasoner_timeout_secs: std::env::var("REASONER_TIMEOUT_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse::<u64>()
                .unwrap_or(60),
            notifications_enabled: std::env::var("NOTIFICATIONS_ENABLED")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            notify_webhook_url: std::env::var("NOTIFY_WEBHOOK_URL").ok().filter(|s| !s.is_empty()),
        })
    }
}
