//! Signal snapshot builder: per-listing counters -> PricingSnapshot.
//!
//! Counters must reflect store state at call time. Config/weights may be
//! cached by the orchestrator; signal counters never are — every cycle reads
//! them fresh.

use sqlx::SqlitePool;

use crate::config::windows;
use crate::db::models::{ListingRow, OutletStatsRow};
use crate::error::Result;
use crate::types::{PricingSnapshot, RecentActivity, Tier};

pub struct SnapshotBuilder {
    pool: SqlitePool,
}

impl SnapshotBuilder {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Assemble the frozen scoring input for one listing. `now` is the cycle
    /// timestamp (unix seconds); hours_remaining is signed — overdue listings
    /// get a negative value, which the engine treats as maximum pressure.
    pub async fn build(&self, listing: &ListingRow, now: i64) -> Result<PricingSnapshot> {
        let pitch_count = self
            .count("SELECT COUNT(*) FROM pitches WHERE listing_id = ? AND status != 'draft'", &listing.id)
            .await?;
        let draft_count = self
            .count("SELECT COUNT(*) FROM pitches WHERE listing_id = ? AND status = 'draft'", &listing.id)
            .await?;
        let click_count = self
            .count("SELECT COUNT(*) FROM listing_events WHERE listing_id = ? AND kind = 'click'", &listing.id)
            .await?;
        let save_count = self
            .count("SELECT COUNT(*) FROM listing_events WHERE listing_id = ? AND kind = 'save'", &listing.id)
            .await?;

        let email_clicks_last_hour: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM listing_events WHERE listing_id = ? AND kind = 'email_click' AND created_at > ?",
        )
        .bind(&listing.id)
        .bind(now - windows::EMAIL_CLICK_SECS)
        .fetch_one(&self.pool)
        .await?;

        let outlet = self.outlet_stats(&listing.outlet).await?;
        let recent = self.recent_activity(listing, now, pitch_count, click_count).await?;

        Ok(PricingSnapshot {
            listing_id: listing.id.clone(),
            tier: Tier::from_level(listing.tier),
            current_price: listing.current_price,
            pitch_count,
            click_count,
            save_count,
            draft_count,
            email_clicks_last_hour,
            hours_remaining: (listing.deadline_ts - now) as f64 / 3600.0,
            outlet_avg_price: outlet.as_ref().and_then(|o| o.avg_price),
            success_rate: outlet.as_ref().and_then(|o| o.success_rate),
            inventory: listing.inventory,
            category: listing.category.clone(),
            recent: Some(recent),
        })
    }

    async fn count(&self, sql: &str, listing_id: &str) -> Result<i64> {
        let n: i64 = sqlx::query_scalar(sql)
            .bind(listing_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    async fn outlet_stats(&self, outlet: &str) -> Result<Option<OutletStatsRow>> {
        let row = sqlx::query_as::<_, OutletStatsRow>(
            "SELECT outlet, avg_price, success_rate, updated_at FROM outlet_stats WHERE outlet = ?",
        )
        .bind(outlet)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Short-window refinement counters: trailing 10-minute activity, lifetime
    /// conversion, sibling outlet load over the trailing 7 days, and minutes
    /// since the last recorded interaction of any kind.
    async fn recent_activity(
        &self,
        listing: &ListingRow,
        now: i64,
        pitch_count: i64,
        click_count: i64,
    ) -> Result<RecentActivity> {
        let recent_cutoff = now - windows::RECENT_SECS;

        let clicks_10m: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM listing_events WHERE listing_id = ? AND kind = 'click' AND created_at > ?",
        )
        .bind(&listing.id)
        .bind(recent_cutoff)
        .fetch_one(&self.pool)
        .await?;

        let pitches_10m: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM pitches WHERE listing_id = ? AND status != 'draft' AND created_at > ?",
        )
        .bind(&listing.id)
        .bind(recent_cutoff)
        .fetch_one(&self.pool)
        .await?;

        let outlet_load: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM listings WHERE outlet = ? AND status = 'open' AND created_at > ?",
        )
        .bind(&listing.outlet)
        .bind(now - windows::OUTLET_LOAD_SECS)
        .fetch_one(&self.pool)
        .await?;

        let last_event: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT MAX(ts) FROM (
                SELECT MAX(created_at) AS ts FROM listing_events WHERE listing_id = ?
                UNION ALL
                SELECT MAX(created_at) AS ts FROM pitches WHERE listing_id = ?
            )
            "#,
        )
        .bind(&listing.id)
        .bind(&listing.id)
        .fetch_one(&self.pool)
        .await?;

        Ok(RecentActivity {
            clicks_10m,
            pitches_10m,
            conversion_rate: if click_count > 0 {
                pitch_count as f64 / click_count as f64
            } else {
                0.0
            },
            outlet_load,
            minutes_since_last_interaction: last_event.map(|ts| (now - ts) as f64 / 60.0),
        })
    }
}
