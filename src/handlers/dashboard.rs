//! /admin/dashboard: KPIs, trends, incidents, queue health.

use axum::extract::{Query, State};
use axum::Extension;
use chrono::{Duration, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::gate;
use crate::auth::rbac::Permission;
use crate::database::models::jobs::QueueHealth;
use crate::middleware::auth::StaffContext;
use crate::middleware::response::{ApiResponse, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct TrendQuery {
    pub days: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct IncidentQuery {
    pub limit: Option<i64>,
}

/// GET /admin/dashboard/kpis
pub async fn kpis(
    State(state): State<AppState>,
    Extension(ctx): Extension<StaffContext>,
) -> ApiResult<Value> {
    gate::authorize(&ctx.roles, Permission::DashboardView)?;

    let now = Utc::now();
    let day_ago = now - Duration::days(1);
    let today_start = now.date_naive().and_hms_opt(0, 0, 0).unwrap().and_utc();

    let total_users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(&state.pool)
        .await?;
    let active_users_24h: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE last_login >= $1")
            .bind(day_ago)
            .fetch_one(&state.pool)
            .await?;
    let total_generations: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM generation_jobs")
        .fetch_one(&state.pool)
        .await?;
    let generations_today: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM generation_jobs WHERE created_at >= $1")
            .bind(today_start)
            .fetch_one(&state.pool)
            .await?;
    let total_issued: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(amount), 0)::int8 FROM token_transactions WHERE amount > 0",
    )
    .fetch_one(&state.pool)
    .await?;
    let total_consumed: i64 = sqlx::query_scalar(
        "SELECT ABS(COALESCE(SUM(amount), 0))::int8 FROM token_transactions WHERE amount < 0",
    )
    .fetch_one(&state.pool)
    .await?;
    let failed_24h: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM generation_jobs WHERE status = 'failed' AND created_at >= $1",
    )
    .bind(day_ago)
    .fetch_one(&state.pool)
    .await?;
    let avg_latency_ms: Option<f64> = sqlx::query_scalar(
        "SELECT (AVG(EXTRACT(EPOCH FROM (completed_at - started_at))) * 1000.0)::float8
         FROM generation_jobs
         WHERE completed_at IS NOT NULL AND started_at IS NOT NULL",
    )
    .fetch_one(&state.pool)
    .await?;

    Ok(ApiResponse::success(json!({
        "total_users": total_users,
        "active_users_24h": active_users_24h,
        "total_generations": total_generations,
        "generations_today": generations_today,
        "total_tokens_issued": total_issued,
        "total_tokens_consumed": total_consumed,
        "failed_jobs_24h": failed_24h,
        "avg_latency_ms": avg_latency_ms,
    })))
}

/// GET /admin/dashboard/trends?days=7
pub async fn trends(
    State(state): State<AppState>,
    Extension(ctx): Extension<StaffContext>,
    Query(query): Query<TrendQuery>,
) -> ApiResult<Value> {
    gate::authorize(&ctx.roles, Permission::DashboardView)?;

    let days = query.days.unwrap_or(7).clamp(1, 90);
    let today = Utc::now().date_naive();
    let window_start = (today - Duration::days(days - 1))
        .and_hms_opt(0, 0, 0)
        .unwrap()
        .and_utc();

    let counts: Vec<(NaiveDate, i64)> = sqlx::query_as(
        "SELECT created_at::date AS day, COUNT(*) FROM generation_jobs
         WHERE created_at >= $1 GROUP BY day ORDER BY day",
    )
    .bind(window_start)
    .fetch_all(&state.pool)
    .await?;

    // Fill days with no jobs so charts get a continuous series
    let trend: Vec<Value> = (0..days)
        .map(|i| {
            let day = today - Duration::days(days - 1 - i);
            let value = counts
                .iter()
                .find(|(d, _)| *d == day)
                .map(|(_, c)| *c)
                .unwrap_or(0);
            json!({ "date": day.to_string(), "value": value, "label": "generations" })
        })
        .collect();

    Ok(ApiResponse::success(json!({ "trends": trend })))
}

/// GET /admin/dashboard/incidents?limit=20
pub async fn incidents(
    State(state): State<AppState>,
    Extension(ctx): Extension<StaffContext>,
    Query(query): Query<IncidentQuery>,
) -> ApiResult<Value> {
    gate::authorize(&ctx.roles, Permission::DashboardView)?;

    let limit = query.limit.unwrap_or(20).clamp(1, 100);
    let rows: Vec<(i32, Option<String>, Option<chrono::DateTime<Utc>>)> = sqlx::query_as(
        "SELECT id, error_message, created_at FROM generation_jobs
         WHERE status = 'failed' ORDER BY created_at DESC LIMIT $1",
    )
    .bind(limit)
    .fetch_all(&state.pool)
    .await?;

    let incidents: Vec<Value> = rows
        .into_iter()
        .map(|(id, error_message, created_at)| {
            let summary: String = error_message
                .unwrap_or_else(|| "Unknown error".to_string())
                .chars()
                .take(200)
                .collect();
            json!({
                "id": id,
                "job_id": id,
                "error_summary": summary,
                "created_at": created_at,
            })
        })
        .collect();

    Ok(ApiResponse::success(json!(incidents)))
}

/// GET /admin/dashboard/queue-health
pub async fn queue_health(
    State(state): State<AppState>,
    Extension(ctx): Extension<StaffContext>,
) -> ApiResult<QueueHealth> {
    gate::authorize(&ctx.roles, Permission::DashboardView)?;

    let counts: Vec<(String, i64)> = sqlx::query_as(
        "SELECT COALESCE(status, 'pending') AS status, COUNT(*)
         FROM generation_jobs GROUP BY 1",
    )
    .fetch_all(&state.pool)
    .await?;

    Ok(ApiResponse::success(QueueHealth::from_counts(counts)))
}
