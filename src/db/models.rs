/// Database row types matching the schema in migrations/0001_init.sql.
/// Used by sqlx for typed queries.

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ListingRow {
    pub id: String,
    pub title: String,
    pub outlet: String,
    pub tier: i64,
    pub status: String,
    pub deadline_ts: i64,
    pub current_price: f64,
    pub inventory: i64,
    pub category: Option<String>,
    pub meta: Option<String>,
    pub last_drift_ts: Option<i64>,
    pub created_at: i64,
}

#[derive(Debug, sqlx::FromRow)]
pub struct ConfigRow {
    pub key: String,
    pub value: f64,
    pub updated_at: i64,
}

#[derive(Debug, sqlx::FromRow)]
pub struct OutletStatsRow {
    pub outlet: String,
    pub avg_price: Option<f64>,
    pub success_rate: Option<f64>,
    pub updated_at: i64,
}
