//! Escalation batch dispatcher.
//!
//! Takes the cycle's escalated snapshots (already capped by the orchestrator),
//! sends them to the external reasoning service in one bounded call, validates
//! the structured response, and applies the reviewed actions. Schema failures
//! fail the whole batch; per-action failures are isolated and never abort the
//! remaining actions.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::db::ListingStore;
use crate::error::{AppError, Result};
use crate::notify::Notifier;
use crate::types::{
    EscalationEntry, PriceChangedEvent, PriceSource, PricingConfig, ReviewResponse, ReviewVerb,
};

/// Fixed policy preamble sent with every batch.
const POLICY_PREAMBLE: &str = "\
You are the pricing reviewer for a marketplace of media opportunities. \
Each listing below carries a worker-suggested price change that was too large \
or too close to the deadline to apply automatically. For each listing decide \
whether to accept, adjust, or reverse the suggestion. Respect tier price \
bands: premium listings must not be priced below featured ones at the same \
outlet. Respond with JSON only, matching exactly: \
{\"actions\":[{\"listing_id\":\"...\",\"action\":\"set|increase|decrease\",\"price\":123.0}],\
\"notifications\":[{\"listing_id\":\"...\",\"template\":\"...\"}]}. \
A \"set\" action requires a price; \"increase\" and \"decrease\" move one step \
from the current price. Notifications are optional (templates: \
price_drop_alert, last_call).";

pub struct EscalationDispatcher {
    cfg: Config,
    store: ListingStore,
    event_tx: mpsc::Sender<PriceChangedEvent>,
    client: reqwest::Client,
    notifier: Notifier,
}

impl EscalationDispatcher {
    pub fn new(
        cfg: Config,
        store: ListingStore,
        event_tx: mpsc::Sender<PriceChangedEvent>,
    ) -> Result<Self> {
        // The client timeout bounds the batch call — a stalled reasoning
        // service fails the batch instead of hanging the cycle.
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.reasoner_timeout_secs))
            .build()?;
        let notifier = Notifier::new(cfg.notify_webhook_url.clone())?;
        Ok(Self { cfg, store, event_tx, client, notifier })
    }

    /// Review and apply one cycle's escalation batch.
    ///
    /// Errors returned here mean the whole batch was dropped for this cycle
    /// (transport failure, timeout, invalid schema); the affected listings
    /// simply retry next cycle.
    pub async fn dispatch(
        &self,
        batch: &[EscalationEntry],
        pricing: &PricingConfig,
        now: i64,
    ) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let response = self.review(batch).await?;

        let by_id: HashMap<&str, &EscalationEntry> = batch
            .iter()
            .map(|e| (e.snapshot.listing_id.as_str(), e))
            .collect();

        let mut applied = 0usize;
        let mut skipped = 0usize;
        for action in &response.actions {
            match self.apply_action(action, &by_id, pricing, now).await {
                Ok(()) => applied += 1,
                Err(e) => {
                    skipped += 1;
                    warn!(listing_id = %action.listing_id, "escalation action skipped: {e}");
                }
            }
        }

        if self.cfg.notifications_enabled {
            for n in &response.notifications {
                if let Err(e) = self.notifier.send(&n.listing_id, &n.template).await {
                    warn!(listing_id = %n.listing_id, template = %n.template, "notification failed: {e}");
                }
            }
        } else if !response.notifications.is_empty() {
            info!(count = response.notifications.len(), "notifications suppressed (feature disabled)");
        }

        info!(
            batch = batch.len(),
            actions = response.actions.len(),
            applied,
            skipped,
            "escalation batch applied"
        );
        Ok(())
    }

    /// One bounded call to the reasoning service, strict response parsing.
    async fn review(&self, batch: &[EscalationEntry]) -> Result<ReviewResponse> {
        let context = build_context(batch);

        let body = json!({
            "model": self.cfg.reasoner_model,
            "temperature": 0,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": POLICY_PREAMBLE },
                { "role": "user", "content": context },
            ],
        });

        let resp: serde_json::Value = self
            .client
            .post(&self.cfg.reasoner_url)
            .bearer_auth(&self.cfg.reasoner_api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let content = resp
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|a| a.first())
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .ok_or_else(|| AppError::Reasoner("response missing choices[0].message.content".to_string()))?;

        parse_review(content)
    }

    async fn apply_action(
        &self,
        action: &crate::types::ReviewAction,
        by_id: &HashMap<&str, &EscalationEntry>,
        pricing: &PricingConfig,
        now: i64,
    ) -> Result<()> {
        let entry = by_id
            .get(action.listing_id.as_str())
            .ok_or_else(|| AppError::Reasoner(format!("no snapshot in batch for {}", action.listing_id)))?;

        let price = resolve_price(action.action, action.price, entry.snapshot.current_price, pricing)?;
        let old_price = entry.snapshot.current_price;
        if price == old_price {
            return Ok(());
        }

        self.store
            .commit_price(&entry.snapshot, price, "gpt", false, now)
            .await?;

        let event = PriceChangedEvent::new(
            entry.snapshot.listing_id.clone(),
            old_price,
            price,
            now,
            PriceSource::Gpt,
        );
        if let Err(e) = self.event_tx.send(event).await {
            error!("price event channel closed: {e}");
        }

        info!(
            listing_id = %entry.snapshot.listing_id,
            old_price,
            new_price = price,
            "escalated price committed"
        );
        Ok(())
    }
}

/// Parse the strict action schema out of the model's content string.
pub fn parse_review(content: &str) -> Result<ReviewResponse> {
    serde_json::from_str::<ReviewResponse>(content)
        .map_err(|e| AppError::Reasoner(format!("invalid review schema: {e}")))
}

/// Resolve the final price for one reviewed action.
///
/// `increase`/`decrease` move one configured step from the *original*
/// snapshot's current price; `set` requires an explicit price. Every result
/// passes through the same [floor, ceiling] clamp as the engine — no commit
/// path skips the bounds.
pub fn resolve_price(
    verb: ReviewVerb,
    price: Option<f64>,
    current_price: f64,
    pricing: &PricingConfig,
) -> Result<f64> {
    let raw = match verb {
        ReviewVerb::Set => {
            price.ok_or_else(|| AppError::Reasoner("set action without a price".to_string()))?
        }
        ReviewVerb::Increase => current_price + pricing.price_step,
        ReviewVerb::Decrease => current_price - pricing.price_step,
    };
    Ok(pricing.clamp_price(raw))
}

/// Bounded textual context: one block per listing plus the field legend the
/// preamble refers to.
pub fn build_context(batch: &[EscalationEntry]) -> String {
    let mut out = String::with_capacity(batch.len() * 160);
    out.push_str(&format!("{} listings await review:\n", batch.len()));
    for entry in batch {
        let s = &entry.snapshot;
        out.push_str(&format!(
            "- listing {} | tier {} | current ${:.2} -> suggested ${:.2} (delta {:+.2}) | \
             pitches {} drafts {} clicks {} saves {} email_clicks_1h {} | \
             hours_remaining {:.1} | inventory {}",
            s.listing_id,
            s.tier,
            s.current_price,
            entry.suggested_price,
            entry.delta,
            s.pitch_count,
            s.draft_count,
            s.click_count,
            s.save_count,
            s.email_clicks_last_hour,
            s.hours_remaining,
            s.inventory,
        ));
        if let Some(avg) = s.outlet_avg_price {
            out.push_str(&format!(" | outlet_avg ${avg:.2}"));
        }
        if let Some(rate) = s.success_rate {
            out.push_str(&format!(" | success_rate {rate:.2}"));
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PricingSnapshot, Tier};

    fn entry(id: &str, current: f64, suggested: f64) -> EscalationEntry {
        EscalationEntry {
            snapshot: PricingSnapshot {
                listing_id: id.to_string(),
                tier: Tier::Featured,
                current_price: current,
                pitch_count: 4,
                click_count: 10,
                save_count: 2,
                draft_count: 1,
                email_clicks_last_hour: 0,
                hours_remaining: 6.0,
                outlet_avg_price: Some(180.0),
                success_rate: None,
                inventory: 1,
                category: None,
                recent: None,
            },
            suggested_price: suggested,
            delta: suggested - current,
        }
    }

    #[test]
    fn set_requires_a_price() {
        let pricing = PricingConfig::default();
        assert!(resolve_price(ReviewVerb::Set, None, 200.0, &pricing).is_err());
        let p = resolve_price(ReviewVerb::Set, Some(220.0), 200.0, &pricing).unwrap();
        assert_eq!(p, 220.0);
    }

    #[test]
    fn increase_and_decrease_step_from_snapshot_price() {
        let pricing = PricingConfig::default();
        assert_eq!(resolve_price(ReviewVerb::Increase, None, 200.0, &pricing).unwrap(), 205.0);
        assert_eq!(resolve_price(ReviewVerb::Decrease, None, 200.0, &pricing).unwrap(), 195.0);
        // an explicit price on increase/decrease is ignored — the step rules
        assert_eq!(resolve_price(ReviewVerb::Increase, Some(999.0), 200.0, &pricing).unwrap(), 205.0);
    }

    #[test]
    fn resolved_prices_are_clamped_to_bounds() {
        let pricing = PricingConfig { price_floor: 50.0, price_ceiling: 500.0, ..Default::default() };
        assert_eq!(resolve_price(ReviewVerb::Set, Some(10_000.0), 200.0, &pricing).unwrap(), 500.0);
        assert_eq!(resolve_price(ReviewVerb::Set, Some(1.0), 200.0, &pricing).unwrap(), 50.0);
        assert_eq!(resolve_price(ReviewVerb::Decrease, None, 52.0, &pricing).unwrap(), 50.0);
        assert_eq!(resolve_price(ReviewVerb::Increase, None, 498.0, &pricing).unwrap(), 500.0);
    }

    #[test]
    fn inverted_bounds_never_panic_resolution() {
        let mut pricing = PricingConfig::default();
        pricing.apply_kv("price_floor", 100.0);
        pricing.apply_kv("price_ceiling", 50.0);
        let p = resolve_price(ReviewVerb::Set, Some(10_000.0), 75.0, &pricing).unwrap();
        assert!(p >= 50.0 && p <= 100.0);
    }

    #[test]
    fn invalid_schema_fails_whole_batch() {
        assert!(parse_review("not json").is_err());
        assert!(parse_review(r#"{"verdicts": []}"#).is_err());
        assert!(parse_review(r#"{"actions": [{"listing_id": "a"}]}"#).is_err());
    }

    #[test]
    fn valid_schema_parses() {
        let resp = parse_review(
            r#"{"actions":[{"listing_id":"a","action":"set","price":150.0}]}"#,
        )
        .unwrap();
        assert_eq!(resp.actions.len(), 1);
        assert!(resp.notifications.is_empty());
    }

    #[test]
    fn context_includes_outlet_stats_when_present() {
        let batch = vec![entry("abc", 200.0, 210.0)];
        let ctx = build_context(&batch);
        assert!(ctx.contains("listing abc"));
        assert!(ctx.contains("current $200.00 -> suggested $210.00"));
        assert!(ctx.contains("outlet_avg $180.00"));
        assert!(!ctx.contains("success_rate"));
    }
}
