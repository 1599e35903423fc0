use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Unified view over the platform `reference_images` and `generated_images`
/// tables. `asset_type` is "reference" or "generated", injected as a literal
/// by the UNION query.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ImageAsset {
    pub id: i32,
    pub user_id: i32,
    pub asset_type: String,
    pub file_name: String,
    pub file_size: Option<i64>,
    pub mime_type: Option<String>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub gcp_url: String,
    pub thumbnail_url: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Aggregated storage consumption, grouped by user or by project.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StorageUsage {
    pub group_id: i32,
    pub total_bytes: i64,
    pub asset_count: i64,
}
