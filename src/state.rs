use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tokio::sync::RwLock;

use crate::config::AppConfig;
use crate::database;

/// Shared application context, built once at startup and injected into every
/// handler via `axum::extract::State`. Holds the connection pool, the parsed
/// configuration, and the small amount of operator-set system state.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<AppConfig>,
    pub system: Arc<SystemState>,
}

impl AppState {
    pub async fn new(config: AppConfig) -> Result<Self, sqlx::Error> {
        let pool = database::connect_pool(&config.database).await?;
        Ok(Self {
            pool,
            config: Arc::new(config),
            system: Arc::new(SystemState::default()),
        })
    }
}

/// Operator-set flags with no backing table: the incident banner shown in
/// the dashboard and the platform maintenance toggle. Kept in the shared
/// state rather than module-level globals.
#[derive(Default)]
pub struct SystemState {
    pub banner: RwLock<Option<IncidentBanner>>,
    pub maintenance: RwLock<Option<MaintenanceMode>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentBanner {
    pub message: String,
    pub severity: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceMode {
    pub enabled: bool,
    pub message: String,
}
