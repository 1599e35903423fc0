use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

/// Per-model generation settings.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ModelConfig {
    pub id: Uuid,
    pub name: String,
    pub enabled: bool,
    pub token_cost: i32,
    pub concurrency_limit: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FeatureFlag {
    pub id: Uuid,
    pub name: String,
    pub enabled: bool,
    pub rollout_percent: i32,
    pub description: Option<String>,
}

/// Stored API key. Only the SHA-256 digest of the secret is kept; `scopes`
/// is a JSON array of role names granted to the key.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ApiKey {
    pub id: Uuid,
    pub name: String,
    #[serde(skip_serializing)]
    pub key_hash: String,
    pub scopes: Value,
    pub created_by: Option<Uuid>,
    pub expires_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ApiKey {
    pub fn scope_names(&self) -> Vec<String> {
        self.scopes
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(|s| s.to_string()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key_with_scopes(scopes: Value) -> ApiKey {
        ApiKey {
            id: Uuid::new_v4(),
            name: "ci".to_string(),
            key_hash: "0".repeat(64),
            scopes,
            created_by: None,
            expires_at: None,
            revoked_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn scope_names_reads_string_array() {
        let key = key_with_scopes(json!(["viewer", "ops"]));
        assert_eq!(key.scope_names(), vec!["viewer", "ops"]);
    }

    #[test]
    fn scope_names_tolerates_malformed_json() {
        assert!(key_with_scopes(json!({})).scope_names().is_empty());
        assert_eq!(key_with_scopes(json!(["viewer", 42])).scope_names(), vec!["viewer"]);
    }
}
