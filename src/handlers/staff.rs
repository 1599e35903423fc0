//! /admin/staff and /admin/api-keys: staff account and key management.

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::auth::rbac::{Permission, Role};
use crate::auth::{self, apikey, gate};
use crate::database::models::staff::{StaffAccount, StaffOut};
use crate::database::models::system::ApiKey;
use crate::database::page::{Page, PageParams};
use crate::error::ApiError;
use crate::middleware::auth::{load_staff, StaffContext};
use crate::middleware::response::{ApiResponse, ApiResult};
use crate::services::audit::{self, AuditAction, NewAuditEntry, RequestMeta};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateStaffRequest {
    pub email: String,
    pub name: String,
    pub password: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStaffRequest {
    pub name: Option<String>,
    pub is_active: Option<bool>,
    pub roles: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct CreateApiKeyRequest {
    pub name: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

const STAFF_COLUMNS: &str =
    "id, email, name, hashed_password, is_active, mfa_enabled, created_at";

fn validate_role_names(names: &[String]) -> Result<(), ApiError> {
    for name in names {
        if name.parse::<Role>().is_err() {
            return Err(ApiError::validation_error("Unknown role name"));
        }
    }
    Ok(())
}

async fn replace_roles(
    tx: &mut Transaction<'_, Postgres>,
    staff_id: Uuid,
    names: &[String],
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM staff_roles WHERE staff_id = $1")
        .bind(staff_id)
        .execute(&mut **tx)
        .await?;
    sqlx::query(
        "INSERT INTO staff_roles (staff_id, role_id)
         SELECT $1, id FROM roles WHERE name = ANY($2)",
    )
    .bind(staff_id)
    .bind(names)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn role_names_for(
    pool: &sqlx::PgPool,
    staff_id: Uuid,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT r.name FROM roles r
         JOIN staff_roles sr ON sr.role_id = r.id
         WHERE sr.staff_id = $1 ORDER BY r.name",
    )
    .bind(staff_id)
    .fetch_all(pool)
    .await
}

/// GET /admin/staff
pub async fn list(
    State(state): State<AppState>,
    Extension(ctx): Extension<StaffContext>,
    Query(page): Query<PageParams>,
) -> ApiResult<Page<StaffOut>> {
    gate::authorize(&ctx.roles, Permission::StaffManage)?;

    let (_, limit) = page.clamped();
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM staff_accounts")
        .fetch_one(&state.pool)
        .await?;
    let accounts: Vec<StaffAccount> = sqlx::query_as(&format!(
        "SELECT {STAFF_COLUMNS} FROM staff_accounts
         ORDER BY created_at DESC LIMIT $1 OFFSET $2"
    ))
    .bind(limit)
    .bind(page.offset())
    .fetch_all(&state.pool)
    .await?;

    let mut items = Vec::with_capacity(accounts.len());
    for account in accounts {
        let roles = role_names_for(&state.pool, account.id).await?;
        items.push(StaffOut::from_account(account, roles));
    }

    Ok(ApiResponse::success(Page::new(items, total, &page)))
}

/// POST /admin/staff
pub async fn create(
    State(state): State<AppState>,
    Extension(ctx): Extension<StaffContext>,
    headers: HeaderMap,
    Json(body): Json<CreateStaffRequest>,
) -> ApiResult<StaffOut> {
    gate::authorize(&ctx.roles, Permission::StaffManage)?;

    let email = body.email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(ApiError::validation_error("A valid email is required"));
    }
    if body.name.trim().is_empty() {
        return Err(ApiError::validation_error("Name is required"));
    }
    if body.password.len() < 8 {
        return Err(ApiError::validation_error(
            "Password must be at least 8 characters",
        ));
    }
    validate_role_names(&body.roles)?;

    let existing: Option<Uuid> =
        sqlx::query_scalar("SELECT id FROM staff_accounts WHERE email = $1")
            .bind(&email)
            .fetch_optional(&state.pool)
            .await?;
    if existing.is_some() {
        return Err(ApiError::conflict("A staff account with this email exists"));
    }

    let hashed = auth::hash_password(&body.password)?;
    let staff_id = Uuid::new_v4();

    let mut tx = state.pool.begin().await?;

    let account: StaffAccount = sqlx::query_as(&format!(
        "INSERT INTO staff_accounts (id, email, name, hashed_password, is_active, mfa_enabled, created_at)
         VALUES ($1, $2, $3, $4, TRUE, FALSE, NOW())
         RETURNING {STAFF_COLUMNS}"
    ))
    .bind(staff_id)
    .bind(&email)
    .bind(body.name.trim())
    .bind(&hashed)
    .fetch_one(&mut *tx)
    .await
    // The existence check above can race a concurrent insert; the unique
    // index on email is authoritative.
    .map_err(|e| ApiError::conflict_on_unique(e, "A staff account with this email exists"))?;

    replace_roles(&mut tx, staff_id, &body.roles).await?;

    let meta = RequestMeta::from_headers(&headers);
    audit::record(
        &mut tx,
        NewAuditEntry {
            actor_id: Some(ctx.id),
            action: AuditAction::Create,
            target_type: "staff_account",
            target_id: staff_id.to_string(),
            before: None,
            after: Some(json!({
                "email": email,
                "name": account.name,
                "roles": body.roles,
            })),
            meta: &meta,
        },
    )
    .await?;

    tx.commit().await?;
    tracing::info!(staff_id = %staff_id, "staff account created");

    Ok(ApiResponse::created(StaffOut::from_account(
        account, body.roles,
    )))
}

/// PUT /admin/staff/:id
pub async fn update(
    State(state): State<AppState>,
    Extension(ctx): Extension<StaffContext>,
    Path(staff_id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<UpdateStaffRequest>,
) -> ApiResult<StaffOut> {
    gate::authorize(&ctx.roles, Permission::StaffManage)?;

    if let Some(roles) = &body.roles {
        validate_role_names(roles)?;
    }
    if body.is_active == Some(false) && staff_id == ctx.id {
        return Err(ApiError::bad_request("Cannot deactivate your own account"));
    }

    let mut tx = state.pool.begin().await?;

    let before: StaffAccount = sqlx::query_as(&format!(
        "SELECT {STAFF_COLUMNS} FROM staff_accounts WHERE id = $1 FOR UPDATE"
    ))
    .bind(staff_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| ApiError::not_found("Staff account not found"))?;

    let before_roles: Vec<String> = sqlx::query_scalar(
        "SELECT r.name FROM roles r
         JOIN staff_roles sr ON sr.role_id = r.id
         WHERE sr.staff_id = $1 ORDER BY r.name",
    )
    .bind(staff_id)
    .fetch_all(&mut *tx)
    .await?;

    let after: StaffAccount = sqlx::query_as(&format!(
        "UPDATE staff_accounts
         SET name = COALESCE($2, name), is_active = COALESCE($3, is_active)
         WHERE id = $1
         RETURNING {STAFF_COLUMNS}"
    ))
    .bind(staff_id)
    .bind(body.name.as_deref().map(str::trim))
    .bind(body.is_active)
    .fetch_one(&mut *tx)
    .await?;

    let after_roles = match &body.roles {
        Some(roles) => {
            replace_roles(&mut tx, staff_id, roles).await?;
            roles.clone()
        }
        None => before_roles.clone(),
    };

    let meta = RequestMeta::from_headers(&headers);
    audit::record(
        &mut tx,
        NewAuditEntry {
            actor_id: Some(ctx.id),
            action: AuditAction::Update,
            target_type: "staff_account",
            target_id: staff_id.to_string(),
            before: Some(json!({
                "name": before.name,
                "is_active": before.is_active,
                "roles": before_roles,
            })),
            after: Some(json!({
                "name": after.name,
                "is_active": after.is_active,
                "roles": after_roles,
            })),
            meta: &meta,
        },
    )
    .await?;

    tx.commit().await?;
    Ok(ApiResponse::success(StaffOut::from_account(after, after_roles)))
}

/// DELETE /admin/staff/:id
///
/// Deactivation, not row deletion: the account stays for the audit trail.
pub async fn deactivate(
    State(state): State<AppState>,
    Extension(ctx): Extension<StaffContext>,
    Path(staff_id): Path<Uuid>,
    headers: HeaderMap,
) -> ApiResult<Value> {
    gate::authorize(&ctx.roles, Permission::StaffManage)?;

    if staff_id == ctx.id {
        return Err(ApiError::bad_request("Cannot deactivate your own account"));
    }

    let mut tx = state.pool.begin().await?;

    let before: StaffAccount = sqlx::query_as(&format!(
        "SELECT {STAFF_COLUMNS} FROM staff_accounts WHERE id = $1 FOR UPDATE"
    ))
    .bind(staff_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| ApiError::not_found("Staff account not found"))?;

    if !before.is_active {
        return Err(ApiError::bad_request("Account is already inactive"));
    }

    sqlx::query("UPDATE staff_accounts SET is_active = FALSE WHERE id = $1")
        .bind(staff_id)
        .execute(&mut *tx)
        .await?;

    let meta = RequestMeta::from_headers(&headers);
    audit::record(
        &mut tx,
        NewAuditEntry {
            actor_id: Some(ctx.id),
            action: AuditAction::Delete,
            target_type: "staff_account",
            target_id: staff_id.to_string(),
            before: Some(json!({ "is_active": true })),
            after: Some(json!({ "is_active": false })),
            meta: &meta,
        },
    )
    .await?;

    tx.commit().await?;
    tracing::info!(staff_id = %staff_id, "staff account deactivated");
    Ok(ApiResponse::success(json!({
        "message": "Staff account deactivated",
        "staff_id": staff_id,
    })))
}

/// POST /admin/staff/:id/mfa/reset
///
/// Clears the MFA enrollment so the account re-enrolls at next login.
/// Requires a fresh step-up proof.
pub async fn reset_mfa(
    State(state): State<AppState>,
    Extension(ctx): Extension<StaffContext>,
    Path(staff_id): Path<Uuid>,
    headers: HeaderMap,
) -> ApiResult<Value> {
    gate::authorize(&ctx.roles, Permission::StaffManage)?;
    gate::require_step_up(ctx.step_up_until, Utc::now())?;

    let target = load_staff(&state, staff_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Staff account not found"))?;

    let mut tx = state.pool.begin().await?;

    sqlx::query("UPDATE staff_accounts SET mfa_enabled = FALSE WHERE id = $1")
        .bind(staff_id)
        .execute(&mut *tx)
        .await?;

    let meta = RequestMeta::from_headers(&headers);
    audit::record(
        &mut tx,
        NewAuditEntry {
            actor_id: Some(ctx.id),
            action: AuditAction::Update,
            target_type: "staff_account",
            target_id: staff_id.to_string(),
            before: Some(json!({ "mfa_enabled": target.mfa_enabled })),
            after: Some(json!({ "mfa_enabled": false })),
            meta: &meta,
        },
    )
    .await?;

    tx.commit().await?;
    tracing::info!(staff_id = %staff_id, "MFA reset");
    Ok(ApiResponse::success(json!({
        "message": "MFA reset",
        "staff_id": staff_id,
    })))
}

/// GET /admin/api-keys
pub async fn list_api_keys(
    State(state): State<AppState>,
    Extension(ctx): Extension<StaffContext>,
) -> ApiResult<Vec<ApiKey>> {
    gate::authorize(&ctx.roles, Permission::ApiKeyManage)?;

    let keys: Vec<ApiKey> = sqlx::query_as(
        "SELECT id, name, key_hash, scopes, created_by, expires_at, revoked_at, created_at
         FROM api_keys ORDER BY created_at DESC",
    )
    .fetch_all(&state.pool)
    .await?;

    Ok(ApiResponse::success(keys))
}

/// POST /admin/api-keys
///
/// The raw secret appears in this response and nowhere else.
pub async fn create_api_key(
    State(state): State<AppState>,
    Extension(ctx): Extension<StaffContext>,
    headers: HeaderMap,
    Json(body): Json<CreateApiKeyRequest>,
) -> ApiResult<Value> {
    gate::authorize(&ctx.roles, Permission::ApiKeyManage)?;

    if body.name.trim().is_empty() {
        return Err(ApiError::validation_error("Name is required"));
    }
    validate_role_names(&body.scopes)?;
    if let Some(expiry) = body.expires_at {
        if expiry <= Utc::now() {
            return Err(ApiError::validation_error("expires_at must be in the future"));
        }
    }

    let (raw_key, digest) = apikey::generate_key();
    let key_id = Uuid::new_v4();

    let mut tx = state.pool.begin().await?;

    sqlx::query(
        "INSERT INTO api_keys (id, name, key_hash, scopes, created_by, expires_at, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, NOW())",
    )
    .bind(key_id)
    .bind(body.name.trim())
    .bind(&digest)
    .bind(json!(body.scopes))
    .bind(ctx.id)
    .bind(body.expires_at)
    .execute(&mut *tx)
    .await?;

    let meta = RequestMeta::from_headers(&headers);
    audit::record(
        &mut tx,
        NewAuditEntry {
            actor_id: Some(ctx.id),
            action: AuditAction::Create,
            target_type: "api_key",
            target_id: key_id.to_string(),
            before: None,
            after: Some(json!({
                "name": body.name.trim(),
                "scopes": body.scopes,
                "expires_at": body.expires_at,
            })),
            meta: &meta,
        },
    )
    .await?;

    tx.commit().await?;
    tracing::info!(key_id = %key_id, "API key created");

    Ok(ApiResponse::created(json!({
        "id": key_id,
        "name": body.name.trim(),
        "key": raw_key,
        "scopes": body.scopes,
        "expires_at": body.expires_at,
    })))
}

/// DELETE /admin/api-keys/:id
///
/// Revocation is terminal; revoking twice is a conflict.
pub async fn revoke_api_key(
    State(state): State<AppState>,
    Extension(ctx): Extension<StaffContext>,
    Path(key_id): Path<Uuid>,
    headers: HeaderMap,
) -> ApiResult<Value> {
    gate::authorize(&ctx.roles, Permission::ApiKeyManage)?;

    let mut tx = state.pool.begin().await?;

    let revoked_at: Option<DateTime<Utc>> = sqlx::query_scalar(
        "SELECT revoked_at FROM api_keys WHERE id = $1 FOR UPDATE",
    )
    .bind(key_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| ApiError::not_found("API key not found"))?;

    if revoked_at.is_some() {
        return Err(ApiError::conflict("API key is already revoked"));
    }

    sqlx::query("UPDATE api_keys SET revoked_at = NOW() WHERE id = $1")
        .bind(key_id)
        .execute(&mut *tx)
        .await?;

    let meta = RequestMeta::from_headers(&headers);
    audit::record(
        &mut tx,
        NewAuditEntry {
            actor_id: Some(ctx.id),
            action: AuditAction::Delete,
            target_type: "api_key",
            target_id: key_id.to_string(),
            before: Some(json!({ "revoked": false })),
            after: Some(json!({ "revoked": true })),
            meta: &meta,
        },
    )
    .await?;

    tx.commit().await?;
    tracing::info!(key_id = %key_id, "API key revoked");
    Ok(ApiResponse::success(json!({
        "message": "API key revoked",
        "key_id": key_id,
    })))
}
