use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Admin-relevant subset of the platform `generation_jobs` table. Queries
/// select these columns explicitly; the table carries many more prompt and
/// versioning fields the dashboard does not surface.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GenerationJob {
    pub id: i32,
    pub user_id: i32,
    pub session_id: Option<i32>,
    pub name: Option<String>,
    pub prompt: String,
    pub model_used: Option<String>,
    pub status: String,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Job states that may still be cancelled.
pub const CANCELLABLE_STATUSES: &[&str] = &["pending", "running", "processing"];

/// Queue state counters for the dashboard.
#[derive(Debug, Default, Serialize)]
pub struct QueueHealth {
    pub pending: i64,
    pub running: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
    pub cancelled: i64,
}

impl QueueHealth {
    pub fn from_counts(counts: impl IntoIterator<Item = (String, i64)>) -> Self {
        let mut health = Self::default();
        for (status, count) in counts {
            match status.as_str() {
                "pending" => health.pending = count,
                "running" => health.running = count,
                "processing" => health.processing = count,
                "completed" => health.completed = count,
                "failed" => health.failed = count,
                "cancelled" => health.cancelled = count,
                _ => {}
            }
        }
        health
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_health_maps_known_statuses() {
        let health = QueueHealth::from_counts([
            ("pending".to_string(), 4),
            ("failed".to_string(), 2),
            ("weird".to_string(), 9),
        ]);
        assert_eq!(health.pending, 4);
        assert_eq!(health.failed, 2);
        assert_eq!(health.running, 0);
    }
}
