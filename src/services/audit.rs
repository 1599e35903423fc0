//! Audit trail writer.
//!
//! Entries are inserted through the caller's transaction so a privileged
//! mutation and its audit record commit or roll back together. Rows are
//! append-only; nothing in this crate updates or deletes `audit_logs`.

use axum::http::HeaderMap;
use chrono::Utc;
use serde_json::Value;
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

/// Audit actions are plain CRUD verbs; the target type and before/after
/// snapshots carry the specifics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    Create,
    Update,
    Delete,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "create",
            AuditAction::Update => "update",
            AuditAction::Delete => "delete",
        }
    }
}

/// Client metadata captured alongside each entry.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestMeta {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let ip = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_string());
        let user_agent = headers
            .get("user-agent")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());
        Self { ip, user_agent }
    }
}

pub struct NewAuditEntry<'a> {
    pub actor_id: Option<Uuid>,
    pub action: AuditAction,
    pub target_type: &'a str,
    pub target_id: String,
    /// None only for pure-create actions.
    pub before: Option<Value>,
    pub after: Option<Value>,
    pub meta: &'a RequestMeta,
}

/// Insert one audit entry inside `tx`. A failure here propagates to the
/// caller and rolls back the mutation it describes.
pub async fn record(
    tx: &mut Transaction<'_, Postgres>,
    entry: NewAuditEntry<'_>,
) -> Result<Uuid, sqlx::Error> {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO audit_logs
           (id, actor_id, action, target_type, target_id,
            before_json, after_json, ip, user_agent, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
    )
    .bind(id)
    .bind(entry.actor_id)
    .bind(entry.action.as_str())
    .bind(entry.target_type)
    .bind(&entry.target_id)
    .bind(&entry.before)
    .bind(&entry.after)
    .bind(&entry.meta.ip)
    .bind(&entry.meta.user_agent)
    .bind(Utc::now())
    .execute(&mut **tx)
    .await?;

    tracing::debug!(
        action = entry.action.as_str(),
        target_type = entry.target_type,
        target_id = %entry.target_id,
        "audit entry recorded"
    );
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn action_verbs_serialize_lowercase() {
        assert_eq!(AuditAction::Create.as_str(), "create");
        assert_eq!(AuditAction::Update.as_str(), "update");
        assert_eq!(AuditAction::Delete.as_str(), "delete");
    }

    #[test]
    fn request_meta_reads_forwarded_chain() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.9, 10.0.0.1"),
        );
        headers.insert("user-agent", HeaderValue::from_static("curl/8.0"));
        let meta = RequestMeta::from_headers(&headers);
        assert_eq!(meta.ip.as_deref(), Some("203.0.113.9"));
        assert_eq!(meta.user_agent.as_deref(), Some("curl/8.0"));
    }

    #[test]
    fn request_meta_tolerates_missing_headers() {
        let meta = RequestMeta::from_headers(&HeaderMap::new());
        assert!(meta.ip.is_none());
        assert!(meta.user_agent.is_none());
    }
}
