//! /admin system controls: model configs, feature flags, incident banner,
//! maintenance mode, and job retry/cancel.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::auth::gate;
use crate::auth::rbac::Permission;
use crate::database::models::jobs::CANCELLABLE_STATUSES;
use crate::database::models::system::{FeatureFlag, ModelConfig};
use crate::error::ApiError;
use crate::middleware::auth::StaffContext;
use crate::middleware::response::{ApiResponse, ApiResult};
use crate::services::audit::{self, AuditAction, NewAuditEntry, RequestMeta};
use crate::state::{AppState, IncidentBanner, MaintenanceMode};

#[derive(Debug, Deserialize)]
pub struct ModelConfigUpdate {
    pub enabled: Option<bool>,
    pub token_cost: Option<i32>,
    pub concurrency_limit: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct FeatureFlagUpdate {
    pub enabled: Option<bool>,
    pub rollout_percent: Option<i32>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BannerUpdate {
    pub message: Option<String>,
    pub severity: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MaintenanceUpdate {
    pub enabled: bool,
    pub message: Option<String>,
}

/// GET /admin/models
pub async fn list_models(
    State(state): State<AppState>,
    Extension(ctx): Extension<StaffContext>,
) -> ApiResult<Vec<ModelConfig>> {
    gate::authorize(&ctx.roles, Permission::SystemView)?;

    let models: Vec<ModelConfig> = sqlx::query_as(
        "SELECT id, name, enabled, token_cost, concurrency_limit
         FROM model_configs ORDER BY name",
    )
    .fetch_all(&state.pool)
    .await?;

    Ok(ApiResponse::success(models))
}

/// GET /admin/models/:id
pub async fn get_model(
    State(state): State<AppState>,
    Extension(ctx): Extension<StaffContext>,
    Path(model_id): Path<Uuid>,
) -> ApiResult<ModelConfig> {
    gate::authorize(&ctx.roles, Permission::SystemView)?;

    let model: ModelConfig = sqlx::query_as(
        "SELECT id, name, enabled, token_cost, concurrency_limit
         FROM model_configs WHERE id = $1",
    )
    .bind(model_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| ApiError::not_found("Model config not found"))?;

    Ok(ApiResponse::success(model))
}

/// PUT /admin/models/:id
pub async fn update_model(
    State(state): State<AppState>,
    Extension(ctx): Extension<StaffContext>,
    Path(model_id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<ModelConfigUpdate>,
) -> ApiResult<ModelConfig> {
    gate::authorize(&ctx.roles, Permission::SystemConfigure)?;

    if let Some(cost) = body.token_cost {
        if cost < 0 {
            return Err(ApiError::validation_error("token_cost must be >= 0"));
        }
    }
    if let Some(limit) = body.concurrency_limit {
        if limit < 1 {
            return Err(ApiError::validation_error("concurrency_limit must be >= 1"));
        }
    }

    let mut tx = state.pool.begin().await?;

    let before: ModelConfig = sqlx::query_as(
        "SELECT id, name, enabled, token_cost, concurrency_limit
         FROM model_configs WHERE id = $1 FOR UPDATE",
    )
    .bind(model_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| ApiError::not_found("Model config not found"))?;

    let after: ModelConfig = sqlx::query_as(
        "UPDATE model_configs
         SET enabled = COALESCE($2, enabled),
             token_cost = COALESCE($3, token_cost),
             concurrency_limit = COALESCE($4, concurrency_limit)
         WHERE id = $1
         RETURNING id, name, enabled, token_cost, concurrency_limit",
    )
    .bind(model_id)
    .bind(body.enabled)
    .bind(body.token_cost)
    .bind(body.concurrency_limit)
    .fetch_one(&mut *tx)
    .await?;

    let meta = RequestMeta::from_headers(&headers);
    audit::record(
        &mut tx,
        NewAuditEntry {
            actor_id: Some(ctx.id),
            action: AuditAction::Update,
            target_type: "model_config",
            target_id: model_id.to_string(),
            before: Some(json!(&before)),
            after: Some(json!(&after)),
            meta: &meta,
        },
    )
    .await?;

    tx.commit().await?;
    tracing::info!(model = %after.name, "model config updated");
    Ok(ApiResponse::success(after))
}

/// GET /admin/feature-flags
pub async fn list_feature_flags(
    State(state): State<AppState>,
    Extension(ctx): Extension<StaffContext>,
) -> ApiResult<Vec<FeatureFlag>> {
    gate::authorize(&ctx.roles, Permission::SystemView)?;

    let flags: Vec<FeatureFlag> = sqlx::query_as(
        "SELECT id, name, enabled, rollout_percent, description
         FROM feature_flags ORDER BY name",
    )
    .fetch_all(&state.pool)
    .await?;

    Ok(ApiResponse::success(flags))
}

/// GET /admin/feature-flags/:id
pub async fn get_feature_flag(
    State(state): State<AppState>,
    Extension(ctx): Extension<StaffContext>,
    Path(flag_id): Path<Uuid>,
) -> ApiResult<FeatureFlag> {
    gate::authorize(&ctx.roles, Permission::SystemView)?;

    let flag: FeatureFlag = sqlx::query_as(
        "SELECT id, name, enabled, rollout_percent, description
         FROM feature_flags WHERE id = $1",
    )
    .bind(flag_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| ApiError::not_found("Feature flag not found"))?;

    Ok(ApiResponse::success(flag))
}

/// PUT /admin/feature-flags/:id
pub async fn update_feature_flag(
    State(state): State<AppState>,
    Extension(ctx): Extension<StaffContext>,
    Path(flag_id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<FeatureFlagUpdate>,
) -> ApiResult<FeatureFlag> {
    gate::authorize(&ctx.roles, Permission::SystemConfigure)?;

    if let Some(pct) = body.rollout_percent {
        if !(0..=100).contains(&pct) {
            return Err(ApiError::validation_error(
                "rollout_percent must be between 0 and 100",
            ));
        }
    }

    let mut tx = state.pool.begin().await?;

    let before: FeatureFlag = sqlx::query_as(
        "SELECT id, name, enabled, rollout_percent, description
         FROM feature_flags WHERE id = $1 FOR UPDATE",
    )
    .bind(flag_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| ApiError::not_found("Feature flag not found"))?;

    let after: FeatureFlag = sqlx::query_as(
        "UPDATE feature_flags
         SET enabled = COALESCE($2, enabled),
             rollout_percent = COALESCE($3, rollout_percent),
             description = COALESCE($4, description)
         WHERE id = $1
         RETURNING id, name, enabled, rollout_percent, description",
    )
    .bind(flag_id)
    .bind(body.enabled)
    .bind(body.rollout_percent)
    .bind(&body.description)
    .fetch_one(&mut *tx)
    .await?;

    let meta = RequestMeta::from_headers(&headers);
    audit::record(
        &mut tx,
        NewAuditEntry {
            actor_id: Some(ctx.id),
            action: AuditAction::Update,
            target_type: "feature_flag",
            target_id: flag_id.to_string(),
            before: Some(json!(&before)),
            after: Some(json!(&after)),
            meta: &meta,
        },
    )
    .await?;

    tx.commit().await?;
    tracing::info!(flag = %after.name, "feature flag updated");
    Ok(ApiResponse::success(after))
}

/// GET /admin/system/incident-banner
pub async fn get_banner(
    State(state): State<AppState>,
    Extension(ctx): Extension<StaffContext>,
) -> ApiResult<Value> {
    gate::authorize(&ctx.roles, Permission::SystemView)?;
    let banner = state.system.banner.read().await.clone();
    Ok(ApiResponse::success(json!({ "banner": banner })))
}

/// An empty or absent message clears the banner.
fn banner_from_update(body: BannerUpdate) -> Option<IncidentBanner> {
    match body.message.as_deref().map(str::trim) {
        Some(message) if !message.is_empty() => Some(IncidentBanner {
            message: message.to_string(),
            severity: body.severity.unwrap_or_else(|| "info".to_string()),
        }),
        _ => None,
    }
}

/// Replace the contents of an in-memory state slot, but only after `persist`
/// (the audit write) has succeeded. The write lock is held across the
/// persist call, so on failure the slot is exactly as it was: the in-memory
/// mutation and its audit entry land together or not at all, matching the
/// transactional handlers.
async fn swap_after_commit<T, F, Fut>(
    slot: &tokio::sync::RwLock<Option<T>>,
    next: Option<T>,
    persist: F,
) -> Result<Option<T>, ApiError>
where
    T: Clone,
    F: FnOnce(Option<T>, Option<T>) -> Fut,
    Fut: std::future::Future<Output = Result<(), ApiError>>,
{
    let mut slot = slot.write().await;
    let previous = slot.clone();
    persist(previous, next.clone()).await?;
    *slot = next.clone();
    Ok(next)
}

/// PUT /admin/system/incident-banner
pub async fn set_banner(
    State(state): State<AppState>,
    Extension(ctx): Extension<StaffContext>,
    headers: HeaderMap,
    Json(body): Json<BannerUpdate>,
) -> ApiResult<Value> {
    gate::authorize(&ctx.roles, Permission::SystemConfigure)?;

    let meta = RequestMeta::from_headers(&headers);
    let pool = state.pool.clone();
    let actor_id = ctx.id;

    let next = swap_after_commit(&state.system.banner, banner_from_update(body), {
        let meta = meta.clone();
        move |previous, next| async move {
            let mut tx = pool.begin().await?;
            audit::record(
                &mut tx,
                NewAuditEntry {
                    actor_id: Some(actor_id),
                    action: AuditAction::Update,
                    target_type: "incident_banner",
                    target_id: "incident_banner".to_string(),
                    before: Some(json!({ "banner": previous })),
                    after: Some(json!({ "banner": next })),
                    meta: &meta,
                },
            )
            .await?;
            tx.commit().await?;
            Ok(())
        }
    })
    .await?;

    Ok(ApiResponse::success(json!({ "banner": next })))
}

/// PUT /admin/system/maintenance-mode
pub async fn set_maintenance(
    State(state): State<AppState>,
    Extension(ctx): Extension<StaffContext>,
    headers: HeaderMap,
    Json(body): Json<MaintenanceUpdate>,
) -> ApiResult<Value> {
    gate::authorize(&ctx.roles, Permission::SystemConfigure)?;

    let enabled = body.enabled;
    let update = Some(MaintenanceMode {
        enabled,
        message: body
            .message
            .unwrap_or_else(|| "Platform maintenance in progress".to_string()),
    });

    let meta = RequestMeta::from_headers(&headers);
    let pool = state.pool.clone();
    let actor_id = ctx.id;

    let next = swap_after_commit(&state.system.maintenance, update, {
        let meta = meta.clone();
        move |previous, next| async move {
            let mut tx = pool.begin().await?;
            audit::record(
                &mut tx,
                NewAuditEntry {
                    actor_id: Some(actor_id),
                    action: AuditAction::Update,
                    target_type: "maintenance_mode",
                    target_id: "maintenance_mode".to_string(),
                    before: Some(json!({ "maintenance": previous })),
                    after: Some(json!({ "maintenance": next })),
                    meta: &meta,
                },
            )
            .await?;
            tx.commit().await?;
            Ok(())
        }
    })
    .await?;

    tracing::info!(enabled, "maintenance mode changed");
    Ok(ApiResponse::success(json!({ "maintenance": next })))
}

/// POST /admin/generation-jobs/:id/retry
///
/// Only failed jobs can be retried; the job is reset to pending and the
/// platform worker picks it up again.
pub async fn retry_job(
    State(state): State<AppState>,
    Extension(ctx): Extension<StaffContext>,
    Path(job_id): Path<i32>,
    headers: HeaderMap,
) -> ApiResult<Value> {
    gate::authorize(&ctx.roles, Permission::JobControl)?;

    let mut tx = state.pool.begin().await?;

    let status: String = sqlx::query_scalar(
        "SELECT COALESCE(status, 'pending') FROM generation_jobs WHERE id = $1 FOR UPDATE",
    )
    .bind(job_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| ApiError::not_found("Generation job not found"))?;

    if status != "failed" {
        return Err(ApiError::conflict("Only failed jobs can be retried"));
    }

    sqlx::query(
        "UPDATE generation_jobs
         SET status = 'pending', error_message = NULL, started_at = NULL, completed_at = NULL
         WHERE id = $1",
    )
    .bind(job_id)
    .execute(&mut *tx)
    .await?;

    let meta = RequestMeta::from_headers(&headers);
    audit::record(
        &mut tx,
        NewAuditEntry {
            actor_id: Some(ctx.id),
            action: AuditAction::Update,
            target_type: "generation_job",
            target_id: job_id.to_string(),
            before: Some(json!({ "status": status })),
            after: Some(json!({ "status": "pending" })),
            meta: &meta,
        },
    )
    .await?;

    tx.commit().await?;
    tracing::info!(job_id, "job queued for retry");
    Ok(ApiResponse::success(json!({
        "job_id": job_id,
        "status": "pending",
    })))
}

/// POST /admin/generation-jobs/:id/cancel
pub async fn cancel_job(
    State(state): State<AppState>,
    Extension(ctx): Extension<StaffContext>,
    Path(job_id): Path<i32>,
    headers: HeaderMap,
) -> ApiResult<Value> {
    gate::authorize(&ctx.roles, Permission::JobControl)?;

    let mut tx = state.pool.begin().await?;

    let status: String = sqlx::query_scalar(
        "SELECT COALESCE(status, 'pending') FROM generation_jobs WHERE id = $1 FOR UPDATE",
    )
    .bind(job_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| ApiError::not_found("Generation job not found"))?;

    if !CANCELLABLE_STATUSES.contains(&status.as_str()) {
        return Err(ApiError::conflict(
            "Only pending, running or processing jobs can be cancelled",
        ));
    }

    sqlx::query(
        "UPDATE generation_jobs SET status = 'cancelled', completed_at = NOW() WHERE id = $1",
    )
    .bind(job_id)
    .execute(&mut *tx)
    .await?;

    let meta = RequestMeta::from_headers(&headers);
    audit::record(
        &mut tx,
        NewAuditEntry {
            actor_id: Some(ctx.id),
            action: AuditAction::Update,
            target_type: "generation_job",
            target_id: job_id.to_string(),
            before: Some(json!({ "status": status })),
            after: Some(json!({ "status": "cancelled" })),
            meta: &meta,
        },
    )
    .await?;

    tx.commit().await?;
    tracing::info!(job_id, "job cancelled");
    Ok(ApiResponse::success(json!({
        "job_id": job_id,
        "status": "cancelled",
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::RwLock;

    #[tokio::test]
    async fn slot_unchanged_when_persist_fails() {
        let slot = RwLock::new(Some("maintenance on".to_string()));
        let result = swap_after_commit(&slot, Some("maintenance off".to_string()), |_, _| async {
            Err(ApiError::internal_server_error("audit insert failed"))
        })
        .await;
        assert!(result.is_err());
        // The failed write left no trace in the in-memory state.
        assert_eq!(slot.read().await.as_deref(), Some("maintenance on"));
    }

    #[tokio::test]
    async fn slot_swapped_after_persist_succeeds() {
        let slot = RwLock::new(None::<String>);
        let next = swap_after_commit(&slot, Some("incident".to_string()), |previous, next| {
            async move {
                assert!(previous.is_none());
                assert_eq!(next.as_deref(), Some("incident"));
                Ok(())
            }
        })
        .await
        .unwrap();
        assert_eq!(next.as_deref(), Some("incident"));
        assert_eq!(slot.read().await.as_deref(), Some("incident"));
    }

    #[test]
    fn empty_banner_message_clears() {
        let cleared = banner_from_update(BannerUpdate {
            message: None,
            severity: None,
        });
        assert!(cleared.is_none());

        let blank = banner_from_update(BannerUpdate {
            message: Some("   ".to_string()),
            severity: None,
        });
        assert!(blank.is_none());

        let banner = banner_from_update(BannerUpdate {
            message: Some("degraded renders".to_string()),
            severity: None,
        })
        .unwrap();
        assert_eq!(banner.message, "degraded renders");
        assert_eq!(banner.severity, "info");
    }
}
