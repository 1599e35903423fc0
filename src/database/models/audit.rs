use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

/// Immutable record of a privileged mutation. Rows are inserted in the same
/// transaction as the mutation they describe and never updated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AuditLog {
    pub id: Uuid,
    pub actor_id: Option<Uuid>,
    pub action: String,
    pub target_type: Option<String>,
    pub target_id: Option<String>,
    pub before_json: Option<Value>,
    pub after_json: Option<Value>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Platform activity feed (generation started, image saved, ...). Written by
/// the platform backend; this service only reads it.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EventLog {
    pub id: Uuid,
    pub event_type: String,
    pub user_id: Option<String>,
    pub org_id: Option<String>,
    pub project_id: Option<String>,
    pub shot_id: Option<String>,
    pub payload_json: Option<Value>,
    pub created_at: DateTime<Utc>,
}
