//! /admin/auth: staff session management.

use axum::{extract::State, Extension, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::{self, Claims};
use crate::database::models::staff::{StaffAccount, StaffOut};
use crate::error::ApiError;
use crate::middleware::auth::{load_staff, load_staff_role_names, StaffContext};
use crate::middleware::response::{ApiResponse, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct StepUpRequest {
    pub password: String,
}

/// POST /admin/auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> ApiResult<Value> {
    let staff = sqlx::query_as::<_, StaffAccount>(
        "SELECT id, email, name, hashed_password, is_active, mfa_enabled, created_at
         FROM staff_accounts WHERE email = $1",
    )
    .bind(&body.email)
    .fetch_optional(&state.pool)
    .await?;

    // Same error for unknown email and bad password
    let staff = match staff {
        Some(s) if auth::verify_password(&body.password, &s.hashed_password) => s,
        _ => return Err(ApiError::unauthorized("Invalid email or password")),
    };

    if !staff.is_active {
        return Err(ApiError::forbidden("Account is inactive"));
    }

    let expiry = state.config.security.token_expiry_minutes;
    let token = auth::generate_token(
        &Claims::new(staff.id, expiry),
        &state.config.security.jwt_secret,
    )?;

    tracing::info!(staff_id = %staff.id, "staff login");
    Ok(ApiResponse::success(json!({
        "access_token": token,
        "token_type": "bearer",
        "expires_in": expiry * 60,
    })))
}

/// POST /admin/auth/logout. Tokens are stateless; the client discards its
/// copy. Kept for frontend symmetry.
pub async fn logout() -> ApiResult<Value> {
    Ok(ApiResponse::success(json!({ "message": "Logged out" })))
}

/// GET /admin/auth/me
pub async fn me(
    State(state): State<AppState>,
    Extension(ctx): Extension<StaffContext>,
) -> ApiResult<StaffOut> {
    let staff = load_staff(&state, ctx.id)
        .await?
        .ok_or_else(|| ApiError::not_found("Staff account not found"))?;
    let roles = load_staff_role_names(&state, ctx.id).await?;
    Ok(ApiResponse::success(StaffOut::from_account(staff, roles)))
}

/// POST /admin/auth/step-up
///
/// Re-proves the caller's password and issues a replacement token whose
/// `step_up_exp` claim unlocks sensitive actions for a short window.
pub async fn step_up(
    State(state): State<AppState>,
    Extension(ctx): Extension<StaffContext>,
    Json(body): Json<StepUpRequest>,
) -> ApiResult<Value> {
    let staff = load_staff(&state, ctx.id)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Staff account not found"))?;

    if !auth::verify_password(&body.password, &staff.hashed_password) {
        return Err(ApiError::unauthorized("Invalid password"));
    }

    let security = &state.config.security;
    let claims = Claims::with_step_up(
        staff.id,
        security.token_expiry_minutes,
        security.step_up_window_minutes,
    );
    let token = auth::generate_token(&claims, &security.jwt_secret)?;

    tracing::info!(staff_id = %staff.id, "step-up granted");
    Ok(ApiResponse::success(json!({
        "access_token": token,
        "token_type": "bearer",
        "expires_in": security.token_expiry_minutes * 60,
        "step_up_expires_in": security.step_up_window_minutes * 60,
    })))
}
