use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::api::health::HealthState;
use crate::error::AppError;

#[derive(Clone)]
pub struct ApiState {
    pub pool: sqlx::SqlitePool,
    pub health: Arc<HealthState>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/stats/summary", get(get_stats_summary))
        .with_state(state)
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub cycles_completed: u64,
    pub last_cycle_at: i64,
    pub auto_applied_total: u64,
    pub escalated_total: u64,
}

async fn get_health(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        cycles_completed: state.health.cycles_completed(),
        last_cycle_at: state.health.last_cycle_at(),
        auto_applied_total: state.health.auto_applied_total(),
        escalated_total: state.health.escalated_total(),
    })
}

#[derive(Serialize)]
pub struct SummaryResponse {
    pub open_listings: i64,
    pub audits_24h: i64,
    pub worker_commits_24h: i64,
    pub gpt_commits_24h: i64,
}

async fn get_stats_summary(
    State(state): State<ApiState>,
) -> Result<Json<SummaryResponse>, AppError> {
    let since = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
        - 86_400;

    let open_listings: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM listings WHERE status = 'open'")
            .fetch_one(&state.pool)
            .await?;

    let audits_24h: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM price_audit WHERE created_at > ?")
            .bind(since)
            .fetch_one(&state.pool)
            .await?;

    let worker_commits_24h: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM price_audit WHERE created_at > ? AND source = 'worker'",
    )
    .bind(since)
    .fetch_one(&state.pool)
    .await?;

    let gpt_commits_24h: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM price_audit WHERE created_at > ? AND source = 'gpt'",
    )
    .bind(since)
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(SummaryResponse {
        open_listings,
        audits_24h,
        worker_commits_24h,
        gpt_commits_24h,
    }))
}
