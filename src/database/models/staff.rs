use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Internal staff account. Platform end-users never appear in this table.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StaffAccount {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing)]
    pub hashed_password: String,
    pub is_active: bool,
    pub mfa_enabled: bool,
    pub created_at: DateTime<Utc>,
}

/// Staff row plus resolved role names, as returned by the API.
#[derive(Debug, Serialize)]
pub struct StaffOut {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub is_active: bool,
    pub mfa_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub roles: Vec<String>,
}

impl StaffOut {
    pub fn from_account(account: StaffAccount, roles: Vec<String>) -> Self {
        Self {
            id: account.id,
            email: account.email,
            name: account.name,
            is_active: account.is_active,
            mfa_enabled: account.mfa_enabled,
            created_at: account.created_at,
            roles,
        }
    }
}
