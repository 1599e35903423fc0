//! /admin activity feeds: platform events, audit trail, job history.

use axum::extract::{Path, Query, State};
use axum::Extension;
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::gate;
use crate::auth::rbac::Permission;
use crate::database::models::audit::{AuditLog, EventLog};
use crate::database::models::jobs::GenerationJob;
use crate::database::page::{Page, PageParams};
use crate::error::ApiError;
use crate::middleware::auth::StaffContext;
use crate::middleware::response::{ApiResponse, ApiResult};
use crate::state::AppState;

// page/limit stay inline: serde_urlencoded cannot flatten numeric fields.
#[derive(Debug, Deserialize)]
pub struct EventQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    #[serde(rename = "type")]
    pub event_type: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub action: Option<String>,
    pub target_type: Option<String>,
    pub actor_id: Option<uuid::Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct JobQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub status: Option<String>,
    pub user_id: Option<i32>,
}

fn page_params(page: Option<i64>, limit: Option<i64>) -> PageParams {
    PageParams { page, limit }
}

const JOB_COLUMNS: &str = "id, user_id, session_id, name, prompt, model_used,
    COALESCE(status, 'pending') AS status, error_message,
    started_at, completed_at, created_at";

/// GET /admin/events
pub async fn events(
    State(state): State<AppState>,
    Extension(ctx): Extension<StaffContext>,
    Query(query): Query<EventQuery>,
) -> ApiResult<Page<EventLog>> {
    gate::authorize(&ctx.roles, Permission::ActivityView)?;

    let page = page_params(query.page, query.limit);
    let (_, limit) = page.clamped();

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM event_logs
         WHERE ($1::text IS NULL OR type = $1)
           AND ($2::text IS NULL OR user_id = $2)",
    )
    .bind(&query.event_type)
    .bind(&query.user_id)
    .fetch_one(&state.pool)
    .await?;

    let items: Vec<EventLog> = sqlx::query_as(
        "SELECT id, type AS event_type, user_id, org_id, project_id, shot_id,
                payload_json, created_at
         FROM event_logs
         WHERE ($1::text IS NULL OR type = $1)
           AND ($2::text IS NULL OR user_id = $2)
         ORDER BY created_at DESC LIMIT $3 OFFSET $4",
    )
    .bind(&query.event_type)
    .bind(&query.user_id)
    .bind(limit)
    .bind(page.offset())
    .fetch_all(&state.pool)
    .await?;

    Ok(ApiResponse::success(Page::new(items, total, &page)))
}

/// GET /admin/audit-logs
pub async fn audit_logs(
    State(state): State<AppState>,
    Extension(ctx): Extension<StaffContext>,
    Query(query): Query<AuditQuery>,
) -> ApiResult<Page<AuditLog>> {
    gate::authorize(&ctx.roles, Permission::AuditView)?;

    let page = page_params(query.page, query.limit);
    let (_, limit) = page.clamped();

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM audit_logs
         WHERE ($1::text IS NULL OR action = $1)
           AND ($2::text IS NULL OR target_type = $2)
           AND ($3::uuid IS NULL OR actor_id = $3)",
    )
    .bind(&query.action)
    .bind(&query.target_type)
    .bind(query.actor_id)
    .fetch_one(&state.pool)
    .await?;

    let items: Vec<AuditLog> = sqlx::query_as(
        "SELECT id, actor_id, action, target_type, target_id,
                before_json, after_json, ip, user_agent, created_at
         FROM audit_logs
         WHERE ($1::text IS NULL OR action = $1)
           AND ($2::text IS NULL OR target_type = $2)
           AND ($3::uuid IS NULL OR actor_id = $3)
         ORDER BY created_at DESC LIMIT $4 OFFSET $5",
    )
    .bind(&query.action)
    .bind(&query.target_type)
    .bind(query.actor_id)
    .bind(limit)
    .bind(page.offset())
    .fetch_all(&state.pool)
    .await?;

    Ok(ApiResponse::success(Page::new(items, total, &page)))
}

/// GET /admin/generation-jobs
pub async fn generation_jobs(
    State(state): State<AppState>,
    Extension(ctx): Extension<StaffContext>,
    Query(query): Query<JobQuery>,
) -> ApiResult<Page<GenerationJob>> {
    gate::authorize(&ctx.roles, Permission::ActivityView)?;

    let page = page_params(query.page, query.limit);
    let (_, limit) = page.clamped();

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM generation_jobs
         WHERE ($1::text IS NULL OR COALESCE(status, 'pending') = $1)
           AND ($2::int4 IS NULL OR user_id = $2)",
    )
    .bind(&query.status)
    .bind(query.user_id)
    .fetch_one(&state.pool)
    .await?;

    let items: Vec<GenerationJob> = sqlx::query_as(&format!(
        "SELECT {JOB_COLUMNS} FROM generation_jobs
         WHERE ($1::text IS NULL OR COALESCE(status, 'pending') = $1)
           AND ($2::int4 IS NULL OR user_id = $2)
         ORDER BY created_at DESC LIMIT $3 OFFSET $4"
    ))
    .bind(&query.status)
    .bind(query.user_id)
    .bind(limit)
    .bind(page.offset())
    .fetch_all(&state.pool)
    .await?;

    Ok(ApiResponse::success(Page::new(items, total, &page)))
}

/// GET /admin/generation-jobs/:id
pub async fn generation_job(
    State(state): State<AppState>,
    Extension(ctx): Extension<StaffContext>,
    Path(job_id): Path<i32>,
) -> ApiResult<GenerationJob> {
    gate::authorize(&ctx.roles, Permission::ActivityView)?;

    let job: GenerationJob = sqlx::query_as(&format!(
        "SELECT {JOB_COLUMNS} FROM generation_jobs WHERE id = $1"
    ))
    .bind(job_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| ApiError::not_found("Generation job not found"))?;

    Ok(ApiResponse::success(job))
}

/// GET /admin/errors/dashboard
pub async fn errors_dashboard(
    State(state): State<AppState>,
    Extension(ctx): Extension<StaffContext>,
) -> ApiResult<Value> {
    gate::authorize(&ctx.roles, Permission::ActivityView)?;

    let day_ago = Utc::now() - Duration::days(1);
    let week_ago = Utc::now() - Duration::days(7);

    let failed_24h: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM generation_jobs WHERE status = 'failed' AND created_at >= $1",
    )
    .bind(day_ago)
    .fetch_one(&state.pool)
    .await?;
    let failed_7d: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM generation_jobs WHERE status = 'failed' AND created_at >= $1",
    )
    .bind(week_ago)
    .fetch_one(&state.pool)
    .await?;
    let total_7d: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM generation_jobs WHERE created_at >= $1")
            .bind(week_ago)
            .fetch_one(&state.pool)
            .await?;

    // Top recurring error messages over the last week.
    let top_errors: Vec<(String, i64)> = sqlx::query_as(
        "SELECT COALESCE(error_message, 'Unknown error'), COUNT(*)
         FROM generation_jobs
         WHERE status = 'failed' AND created_at >= $1
         GROUP BY 1 ORDER BY COUNT(*) DESC LIMIT 10",
    )
    .bind(week_ago)
    .fetch_all(&state.pool)
    .await?;

    let failure_rate_7d = if total_7d > 0 {
        failed_7d as f64 / total_7d as f64
    } else {
        0.0
    };

    Ok(ApiResponse::success(json!({
        "failed_jobs_24h": failed_24h,
        "failed_jobs_7d": failed_7d,
        "total_jobs_7d": total_7d,
        "failure_rate_7d": failure_rate_7d,
        "top_errors": top_errors
            .into_iter()
            .map(|(message, count)| {
                let summary: String = message.chars().take(200).collect();
                json!({ "message": summary, "count": count })
            })
            .collect::<Vec<_>>(),
    })))
}
