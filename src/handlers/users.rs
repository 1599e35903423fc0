//! /admin/users: platform user visibility and moderation.

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::FromRow;

use crate::auth::gate;
use crate::auth::rbac::Permission;
use crate::auth::{self, ImpersonationClaims};
use crate::database::models::user::UserOut;
use crate::database::page::{sort_clause, Page, PageParams};
use crate::error::ApiError;
use crate::middleware::auth::StaffContext;
use crate::middleware::response::{ApiResponse, ApiResult};
use crate::services::audit::{self, AuditAction, NewAuditEntry, RequestMeta};
use crate::state::AppState;

const IMPERSONATION_EXPIRY_MINUTES: i64 = 60;

// Query structs keep page/limit inline: serde_urlencoded cannot flatten
// numeric fields.
#[derive(Debug, Deserialize)]
pub struct UserListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub search: Option<String>,
    pub status: Option<String>,
    pub plan: Option<String>,
    pub sort: Option<String>,
    pub order: Option<String>,
}

impl UserListQuery {
    fn page_params(&self) -> PageParams {
        PageParams {
            page: self.page,
            limit: self.limit,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SuspendRequest {
    pub reason: Option<String>,
}

/// User row joined with its admin overlay.
#[derive(Debug, FromRow)]
struct UserListRow {
    id: i32,
    email: String,
    username: Option<String>,
    auth_provider: Option<String>,
    avatar_url: Option<String>,
    is_confirmed: Option<bool>,
    last_login: Option<DateTime<Utc>>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    is_suspended: bool,
    plan: String,
}

impl UserListRow {
    fn into_out(self, oauth_providers: Vec<String>) -> UserOut {
        UserOut {
            id: self.id,
            email: self.email,
            username: self.username,
            auth_provider: self.auth_provider.unwrap_or_else(|| "email".to_string()),
            avatar_url: self.avatar_url,
            is_confirmed: self.is_confirmed.unwrap_or(false),
            status: if self.is_suspended {
                "suspended".to_string()
            } else {
                "active".to_string()
            },
            plan: self.plan,
            last_login: self.last_login,
            created_at: self.created_at,
            updated_at: self.updated_at,
            oauth_providers,
        }
    }
}

/// Escape LIKE wildcards so a search term matches literally.
fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

const USER_COLUMNS: &str = "u.id, u.email, u.username, u.auth_provider, u.avatar_url,
    u.is_confirmed, u.last_login, u.created_at, u.updated_at,
    COALESCE(o.is_suspended, FALSE) AS is_suspended,
    COALESCE(o.plan, 'free') AS plan";

const USER_FILTER: &str = "($1::text IS NULL OR u.email ILIKE $1 OR u.username ILIKE $1)
    AND ($2::text IS NULL
         OR ($2 = 'suspended' AND COALESCE(o.is_suspended, FALSE))
         OR ($2 = 'active' AND NOT COALESCE(o.is_suspended, FALSE)))
    AND ($3::text IS NULL OR COALESCE(o.plan, 'free') = $3)";

/// GET /admin/users
pub async fn list(
    State(state): State<AppState>,
    Extension(ctx): Extension<StaffContext>,
    Query(query): Query<UserListQuery>,
) -> ApiResult<Page<UserOut>> {
    gate::authorize(&ctx.roles, Permission::UserView)?;

    let page = query.page_params();
    let (_, limit) = page.clamped();
    let offset = page.offset();
    let search = query.search.as_deref().map(like_pattern);
    let order_by = sort_clause(
        query.sort.as_deref().unwrap_or("created_at"),
        &["created_at", "updated_at", "email", "username", "last_login"],
        "created_at",
        query.order.as_deref().unwrap_or("desc"),
    );

    let total: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM users u
         LEFT JOIN admin_user_overrides o ON o.user_id = u.id
         WHERE {USER_FILTER}"
    ))
    .bind(&search)
    .bind(&query.status)
    .bind(&query.plan)
    .fetch_one(&state.pool)
    .await?;

    let rows: Vec<UserListRow> = sqlx::query_as(&format!(
        "SELECT {USER_COLUMNS} FROM users u
         LEFT JOIN admin_user_overrides o ON o.user_id = u.id
         WHERE {USER_FILTER}
         ORDER BY u.{order_by} LIMIT $4 OFFSET $5"
    ))
    .bind(&search)
    .bind(&query.status)
    .bind(&query.plan)
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.pool)
    .await?;

    let ids: Vec<i32> = rows.iter().map(|r| r.id).collect();
    let providers: Vec<(i32, Vec<String>)> = sqlx::query_as(
        "SELECT user_id, ARRAY_AGG(provider) FROM oauth_accounts
         WHERE user_id = ANY($1) GROUP BY user_id",
    )
    .bind(&ids)
    .fetch_all(&state.pool)
    .await?;

    let items = rows
        .into_iter()
        .map(|row| {
            let linked = providers
                .iter()
                .find(|(uid, _)| *uid == row.id)
                .map(|(_, p)| p.clone())
                .unwrap_or_default();
            row.into_out(linked)
        })
        .collect();

    Ok(ApiResponse::success(Page::new(items, total, &page)))
}

/// GET /admin/users/:id
pub async fn get(
    State(state): State<AppState>,
    Extension(ctx): Extension<StaffContext>,
    Path(user_id): Path<i32>,
) -> ApiResult<Value> {
    gate::authorize(&ctx.roles, Permission::UserView)?;

    let row: UserListRow = sqlx::query_as(&format!(
        "SELECT {USER_COLUMNS} FROM users u
         LEFT JOIN admin_user_overrides o ON o.user_id = u.id
         WHERE u.id = $1"
    ))
    .bind(user_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| ApiError::not_found("User not found"))?;

    let oauth_providers: Vec<String> =
        sqlx::query_scalar("SELECT provider FROM oauth_accounts WHERE user_id = $1")
            .bind(user_id)
            .fetch_all(&state.pool)
            .await?;

    let balance: i64 =
        sqlx::query_scalar("SELECT COALESCE(balance, 0) FROM token_wallets WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&state.pool)
            .await?
            .unwrap_or(0);
    let project_count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM projects WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&state.pool)
            .await?;
    let generation_count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM generation_jobs WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&state.pool)
            .await?;

    Ok(ApiResponse::success(json!({
        "user": row.into_out(oauth_providers),
        "token_balance": balance,
        "project_count": project_count,
        "generation_count": generation_count,
    })))
}

/// POST /admin/users/:id/suspend
pub async fn suspend(
    State(state): State<AppState>,
    Extension(ctx): Extension<StaffContext>,
    Path(user_id): Path<i32>,
    headers: HeaderMap,
    Json(body): Json<SuspendRequest>,
) -> ApiResult<Value> {
    gate::authorize(&ctx.roles, Permission::UserSuspend)?;
    set_suspension(&state, &ctx, user_id, true, body.reason, &headers).await?;
    Ok(ApiResponse::success(json!({
        "message": "User suspended",
        "user_id": user_id,
    })))
}

/// POST /admin/users/:id/unsuspend
pub async fn unsuspend(
    State(state): State<AppState>,
    Extension(ctx): Extension<StaffContext>,
    Path(user_id): Path<i32>,
    headers: HeaderMap,
    Json(body): Json<SuspendRequest>,
) -> ApiResult<Value> {
    gate::authorize(&ctx.roles, Permission::UserSuspend)?;
    set_suspension(&state, &ctx, user_id, false, body.reason, &headers).await?;
    Ok(ApiResponse::success(json!({
        "message": "User unsuspended",
        "user_id": user_id,
    })))
}

async fn set_suspension(
    state: &AppState,
    ctx: &StaffContext,
    user_id: i32,
    suspend: bool,
    reason: Option<String>,
    headers: &HeaderMap,
) -> Result<(), ApiError> {
    let user_exists: Option<i32> = sqlx::query_scalar("SELECT id FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(&state.pool)
        .await?;
    if user_exists.is_none() {
        return Err(ApiError::not_found("User not found"));
    }

    let mut tx = state.pool.begin().await?;

    let currently_suspended: bool = sqlx::query_scalar(
        "SELECT COALESCE(is_suspended, FALSE) FROM admin_user_overrides
         WHERE user_id = $1 FOR UPDATE",
    )
    .bind(user_id)
    .fetch_optional(&mut *tx)
    .await?
    .unwrap_or(false);

    if suspend && currently_suspended {
        return Err(ApiError::bad_request("User already suspended"));
    }
    if !suspend && !currently_suspended {
        return Err(ApiError::bad_request("User is not suspended"));
    }

    let suspended_at = if suspend { Some(Utc::now()) } else { None };
    let stored_reason = if suspend { reason.clone() } else { None };
    sqlx::query(
        "INSERT INTO admin_user_overrides (user_id, is_suspended, suspended_at, suspended_reason, plan)
         VALUES ($1, $2, $3, $4, 'free')
         ON CONFLICT (user_id) DO UPDATE
         SET is_suspended = EXCLUDED.is_suspended,
             suspended_at = EXCLUDED.suspended_at,
             suspended_reason = EXCLUDED.suspended_reason",
    )
    .bind(user_id)
    .bind(suspend)
    .bind(suspended_at)
    .bind(&stored_reason)
    .execute(&mut *tx)
    .await?;

    let (before_status, after_status) = if suspend {
        ("active", "suspended")
    } else {
        ("suspended", "active")
    };
    let meta = RequestMeta::from_headers(headers);
    audit::record(
        &mut tx,
        NewAuditEntry {
            actor_id: Some(ctx.id),
            action: AuditAction::Update,
            target_type: "user",
            target_id: user_id.to_string(),
            before: Some(json!({ "status": before_status })),
            after: Some(json!({ "status": after_status, "reason": reason })),
            meta: &meta,
        },
    )
    .await?;

    tx.commit().await?;
    tracing::info!(user_id, suspend, "user suspension changed");
    Ok(())
}

/// POST /admin/users/:id/impersonate
///
/// Mints a short-lived platform token for the target user. Requires a fresh
/// step-up proof on top of the impersonation permission.
pub async fn impersonate(
    State(state): State<AppState>,
    Extension(ctx): Extension<StaffContext>,
    Path(user_id): Path<i32>,
    headers: HeaderMap,
) -> ApiResult<Value> {
    gate::authorize(&ctx.roles, Permission::UserImpersonate)?;
    gate::require_step_up(ctx.step_up_until, Utc::now())?;

    let user_exists: Option<i32> = sqlx::query_scalar("SELECT id FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(&state.pool)
        .await?;
    if user_exists.is_none() {
        return Err(ApiError::not_found("User not found"));
    }

    let claims = ImpersonationClaims::new(user_id, ctx.id, IMPERSONATION_EXPIRY_MINUTES);
    let token = auth::generate_token(&claims, &state.config.security.jwt_secret)?;

    let meta = RequestMeta::from_headers(&headers);
    let mut tx = state.pool.begin().await?;
    audit::record(
        &mut tx,
        NewAuditEntry {
            actor_id: Some(ctx.id),
            action: AuditAction::Create,
            target_type: "impersonation_token",
            target_id: user_id.to_string(),
            before: None,
            after: Some(json!({
                "user_id": user_id,
                "expires_in": IMPERSONATION_EXPIRY_MINUTES * 60,
            })),
            meta: &meta,
        },
    )
    .await?;
    tx.commit().await?;

    tracing::info!(user_id, staff_id = %ctx.id, "impersonation token issued");
    Ok(ApiResponse::success(json!({
        "access_token": token,
        "token_type": "bearer",
        "user_id": user_id,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_pattern_wraps_plain_terms() {
        assert_eq!(like_pattern("ripley"), "%ripley%");
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        // A term containing % or _ must match those characters literally
        // instead of widening the search.
        assert_eq!(like_pattern("100%"), "%100\\%%");
        assert_eq!(like_pattern("a_b"), "%a\\_b%");
        assert_eq!(like_pattern("back\\slash"), "%back\\\\slash%");
    }
}
