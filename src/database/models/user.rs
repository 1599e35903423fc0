use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Shared `users` table, owned by the platform backend. Serial integer keys,
/// and most columns are nullable at the schema level.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PlatformUser {
    pub id: i32,
    pub email: String,
    pub username: Option<String>,
    pub auth_provider: Option<String>,
    pub avatar_url: Option<String>,
    pub is_confirmed: Option<bool>,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Admin-owned suspension overlay. Suspension state lives here so the shared
/// `users` table is never written by the dashboard.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserOverride {
    pub user_id: i32,
    pub is_suspended: bool,
    pub suspended_at: Option<DateTime<Utc>>,
    pub suspended_reason: Option<String>,
    pub plan: String,
    pub notes: Option<String>,
}

impl UserOverride {
    /// Status string used in API responses and audit snapshots.
    pub fn status(&self) -> &'static str {
        if self.is_suspended {
            "suspended"
        } else {
            "active"
        }
    }
}

/// User row joined with its overlay for list/detail responses.
#[derive(Debug, Serialize)]
pub struct UserOut {
    pub id: i32,
    pub email: String,
    pub username: Option<String>,
    pub auth_provider: String,
    pub avatar_url: Option<String>,
    pub is_confirmed: bool,
    pub status: String,
    pub plan: String,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub oauth_providers: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_status_strings() {
        let mut ovr = UserOverride {
            user_id: 1,
            is_suspended: false,
            suspended_at: None,
            suspended_reason: None,
            plan: "free".to_string(),
            notes: None,
        };
        assert_eq!(ovr.status(), "active");
        ovr.is_suspended = true;
        assert_eq!(ovr.status(), "suspended");
    }
}
