//! Listing store: the worker's single write path into SQLite.
//!
//! The orchestrator (and the escalation dispatcher, through the same commit
//! method) is the only mutator of listing prices. Every commit updates the
//! listing row and appends an immutable audit record in one transaction, so
//! a crash can never leave a price change without its audit copy.

use sqlx::SqlitePool;
use tracing::debug;

use crate::db::models::{ConfigRow, ListingRow};
use crate::error::{AppError, Result};
use crate::types::{PricingConfig, PricingSnapshot};

#[derive(Clone)]
pub struct ListingStore {
    pool: SqlitePool,
}

impl ListingStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// All listings the pricing cycle considers live. Overdue-but-open
    /// listings are included — the engine treats their negative hours as
    /// maximum urgency and the gatekeeper routes them to escalation.
    pub async fn load_live_listings(&self) -> Result<Vec<ListingRow>> {
        let rows = sqlx::query_as::<_, ListingRow>(
            r#"
            SELECT id, title, outlet, tier, status, deadline_ts, current_price,
                   inventory, category, meta, last_drift_ts, created_at
            FROM listings
            WHERE status = 'open'
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Load weights/tunables from the key/value rows. Missing keys keep their
    /// compiled defaults; `loaded_at` records the newest row seen so the
    /// orchestrator can compare staleness later without re-reading values.
    pub async fn load_pricing_config(&self) -> Result<PricingConfig> {
        let rows = sqlx::query_as::<_, ConfigRow>(
            "SELECT key, value, updated_at FROM pricing_config",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut cfg = PricingConfig::default();
        for row in &rows {
            cfg.apply_kv(&row.key, row.value);
            cfg.loaded_at = cfg.loaded_at.max(row.updated_at);
        }
        // A bad row set must never reach the engine; the reload path keeps
        // the cached copy when this errors, startup fails fast.
        cfg.validate().map_err(|reason| {
            AppError::Config(format!(
                "rejecting pricing config (loaded_at {}): {reason}",
                cfg.loaded_at
            ))
        })?;
        debug!(rows = rows.len(), loaded_at = cfg.loaded_at, "pricing config loaded");
        Ok(cfg)
    }

    /// True when any config row is newer than the cached copy.
    pub async fn config_updated_since(&self, loaded_at: i64) -> Result<bool> {
        let newest: Option<i64> =
            sqlx::query_scalar("SELECT MAX(updated_at) FROM pricing_config")
                .fetch_one(&self.pool)
                .await?;
        Ok(newest.unwrap_or(0) > loaded_at)
    }

    /// Commit a price change: update the listing row and append the audit
    /// record atomically. `drift` stamps last_drift_ts on the listing.
    pub async fn commit_price(
        &self,
        snapshot: &PricingSnapshot,
        new_price: f64,
        source: &str,
        drift: bool,
        now: i64,
    ) -> Result<()> {
        let snapshot_json = serde_json::to_string(snapshot)?;

        let mut tx = self.pool.begin().await?;

        if drift {
            sqlx::query("UPDATE listings SET current_price = ?, last_drift_ts = ? WHERE id = ?")
                .bind(new_price)
                .bind(now)
                .bind(&snapshot.listing_id)
                .execute(&mut *tx)
                .await?;
        } else {
            sqlx::query("UPDATE listings SET current_price = ? WHERE id = ?")
                .bind(new_price)
                .bind(&snapshot.listing_id)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query(
            r#"
            INSERT INTO price_audit (listing_id, suggested_price, snapshot, source, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&snapshot.listing_id)
        .bind(new_price)
        .bind(snapshot_json)
        .bind(source)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::types::{PricingSnapshot, Tier};

    async fn set_config_row(pool: &sqlx::SqlitePool, key: &str, value: f64, updated_at: i64) {
        sqlx::query(
            r#"
            INSERT INTO pricing_config (key, value, updated_at) VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(updated_at)
        .execute(pool)
        .await
        .unwrap();
    }

    fn snapshot(id: &str, price: f64) -> PricingSnapshot {
        PricingSnapshot {
            listing_id: id.to_string(),
            tier: Tier::Standard,
            current_price: price,
            pitch_count: 2,
            click_count: 5,
            save_count: 1,
            draft_count: 0,
            email_clicks_last_hour: 0,
            hours_remaining: 30.0,
            outlet_avg_price: None,
            success_rate: None,
            inventory: 1,
            category: None,
            recent: None,
        }
    }

    #[tokio::test]
    async fn config_rows_override_defaults_and_track_staleness() {
        let pool = test_pool().await;
        let store = ListingStore::new(pool.clone());

        set_config_row(&pool, "price_step", 2.0, 100).await;
        set_config_row(&pool, "weight_pitches", 0.7, 200).await;

        let cfg = store.load_pricing_config().await.unwrap();
        assert_eq!(cfg.price_step, 2.0);
        assert_eq!(cfg.weight_pitches, 0.7);
        assert_eq!(cfg.loaded_at, 200);
        // untouched keys keep their compiled defaults
        assert_eq!(cfg.price_floor, 50.0);

        assert!(!store.config_updated_since(cfg.loaded_at).await.unwrap());
        set_config_row(&pool, "elasticity", 1.2, 300).await;
        assert!(store.config_updated_since(cfg.loaded_at).await.unwrap());
    }

    #[tokio::test]
    async fn config_updated_since_is_false_on_empty_table() {
        let pool = test_pool().await;
        let store = ListingStore::new(pool);
        assert!(!store.config_updated_since(0).await.unwrap());
    }

    #[tokio::test]
    async fn inverted_bounds_rows_are_rejected_at_load() {
        let pool = test_pool().await;
        let store = ListingStore::new(pool.clone());

        set_config_row(&pool, "price_floor", 100.0, 10).await;
        set_config_row(&pool, "price_ceiling", 50.0, 10).await;

        let err = store.load_pricing_config().await.unwrap_err();
        assert!(err.to_string().contains("price_floor"));
    }

    #[tokio::test]
    async fn commit_updates_listing_and_appends_audit_atomically() {
        let pool = test_pool().await;
        let store = ListingStore::new(pool.clone());

        sqlx::query(
            r#"
            INSERT INTO listings (id, title, outlet, tier, status, deadline_ts, current_price, inventory, created_at)
            VALUES ('l1', 'Feature slot', 'daily-bugle', 1, 'open', 999999, 200.0, 1, 0)
            "#,
        )
        .execute(&pool)
        .await
        .unwrap();

        let snap = snapshot("l1", 200.0);
        store.commit_price(&snap, 205.0, "worker", true, 1_000).await.unwrap();

        let (price, drift_ts): (f64, Option<i64>) = sqlx::query_as(
            "SELECT current_price, last_drift_ts FROM listings WHERE id = 'l1'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(price, 205.0);
        assert_eq!(drift_ts, Some(1_000));

        let (suggested, source, payload): (f64, String, String) = sqlx::query_as(
            "SELECT suggested_price, source, snapshot FROM price_audit WHERE listing_id = 'l1'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(suggested, 205.0);
        assert_eq!(source, "worker");
        // audit payload is the full snapshot, round-trippable
        let restored: PricingSnapshot = serde_json::from_str(&payload).unwrap();
        assert_eq!(restored.listing_id, "l1");
        assert_eq!(restored.current_price, 200.0);
    }
}
