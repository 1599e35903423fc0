//! /admin/tokens: wallet overview and the grant operation.

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::{Extension, Json};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::gate;
use crate::auth::rbac::Permission;
use crate::database::models::tokens::TokenTransaction;
use crate::database::page::{Page, PageParams};
use crate::error::ApiError;
use crate::middleware::auth::StaffContext;
use crate::middleware::response::{ApiResponse, ApiResult};
use crate::services::audit::RequestMeta;
use crate::services::tokens;
use crate::state::AppState;

// page/limit stay inline: serde_urlencoded cannot flatten numeric fields.
#[derive(Debug, Deserialize)]
pub struct LedgerQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub user_id: Option<i32>,
    #[serde(rename = "type")]
    pub tx_type: Option<String>,
}

impl LedgerQuery {
    fn page_params(&self) -> PageParams {
        PageParams {
            page: self.page,
            limit: self.limit,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct GrantRequest {
    pub amount: i64,
    pub reason: String,
}

const TX_COLUMNS: &str = "id, user_id, amount, type AS tx_type, reason,
    ref_type, ref_id, created_at, created_by_admin_id";

/// GET /admin/tokens/dashboard
pub async fn dashboard(
    State(state): State<AppState>,
    Extension(ctx): Extension<StaffContext>,
) -> ApiResult<Value> {
    gate::authorize(&ctx.roles, Permission::TokenView)?;

    let total_balance: i64 =
        sqlx::query_scalar("SELECT COALESCE(SUM(balance), 0)::int8 FROM token_wallets")
            .fetch_one(&state.pool)
            .await?;
    let wallet_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM token_wallets")
        .fetch_one(&state.pool)
        .await?;
    let issued: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(amount), 0)::int8 FROM token_transactions WHERE amount > 0",
    )
    .fetch_one(&state.pool)
    .await?;
    let consumed: i64 = sqlx::query_scalar(
        "SELECT ABS(COALESCE(SUM(amount), 0))::int8 FROM token_transactions WHERE amount < 0",
    )
    .fetch_one(&state.pool)
    .await?;

    let top_wallets: Vec<(i32, i64, String)> = sqlx::query_as(
        "SELECT w.user_id, w.balance, u.email
         FROM token_wallets w JOIN users u ON u.id = w.user_id
         ORDER BY w.balance DESC LIMIT 10",
    )
    .fetch_all(&state.pool)
    .await?;

    let by_type: Vec<(String, i64, i64)> = sqlx::query_as(
        "SELECT type, COUNT(*), COALESCE(SUM(amount), 0)::int8
         FROM token_transactions GROUP BY type ORDER BY type",
    )
    .fetch_all(&state.pool)
    .await?;

    Ok(ApiResponse::success(json!({
        "total_balance": total_balance,
        "wallet_count": wallet_count,
        "total_issued": issued,
        "total_consumed": consumed,
        "top_wallets": top_wallets
            .into_iter()
            .map(|(user_id, balance, email)| json!({
                "user_id": user_id,
                "balance": balance,
                "email": email,
            }))
            .collect::<Vec<_>>(),
        "by_type": by_type
            .into_iter()
            .map(|(tx_type, count, total)| json!({
                "type": tx_type,
                "count": count,
                "total": total,
            }))
            .collect::<Vec<_>>(),
    })))
}

/// GET /admin/tokens/ledger
pub async fn ledger(
    State(state): State<AppState>,
    Extension(ctx): Extension<StaffContext>,
    Query(query): Query<LedgerQuery>,
) -> ApiResult<Page<TokenTransaction>> {
    gate::authorize(&ctx.roles, Permission::TokenView)?;

    let page = query.page_params();
    let (_, limit) = page.clamped();
    let offset = page.offset();

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM token_transactions
         WHERE ($1::int4 IS NULL OR user_id = $1)
           AND ($2::text IS NULL OR type = $2)",
    )
    .bind(query.user_id)
    .bind(&query.tx_type)
    .fetch_one(&state.pool)
    .await?;

    let items: Vec<TokenTransaction> = sqlx::query_as(&format!(
        "SELECT {TX_COLUMNS} FROM token_transactions
         WHERE ($1::int4 IS NULL OR user_id = $1)
           AND ($2::text IS NULL OR type = $2)
         ORDER BY created_at DESC LIMIT $3 OFFSET $4"
    ))
    .bind(query.user_id)
    .bind(&query.tx_type)
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.pool)
    .await?;

    Ok(ApiResponse::success(Page::new(items, total, &page)))
}

/// GET /admin/users/:id/tokens
pub async fn user_tokens(
    State(state): State<AppState>,
    Extension(ctx): Extension<StaffContext>,
    Path(user_id): Path<i32>,
    Query(page): Query<PageParams>,
) -> ApiResult<Value> {
    gate::authorize(&ctx.roles, Permission::TokenView)?;

    let user_exists: Option<i32> = sqlx::query_scalar("SELECT id FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(&state.pool)
        .await?;
    if user_exists.is_none() {
        return Err(ApiError::not_found("User not found"));
    }

    let balance: i64 =
        sqlx::query_scalar("SELECT COALESCE(balance, 0) FROM token_wallets WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&state.pool)
            .await?
            .unwrap_or(0);

    let (_, limit) = page.clamped();
    let total: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM token_transactions WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&state.pool)
            .await?;
    let transactions: Vec<TokenTransaction> = sqlx::query_as(&format!(
        "SELECT {TX_COLUMNS} FROM token_transactions
         WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3"
    ))
    .bind(user_id)
    .bind(limit)
    .bind(page.offset())
    .fetch_all(&state.pool)
    .await?;

    Ok(ApiResponse::success(json!({
        "user_id": user_id,
        "balance": balance,
        "transactions": Page::new(transactions, total, &page),
    })))
}

/// POST /admin/users/:id/tokens/grant
///
/// Requires both the grant permission and a fresh step-up proof.
pub async fn grant(
    State(state): State<AppState>,
    Extension(ctx): Extension<StaffContext>,
    Path(user_id): Path<i32>,
    headers: HeaderMap,
    Json(body): Json<GrantRequest>,
) -> ApiResult<Value> {
    gate::authorize(&ctx.roles, Permission::TokenGrant)?;
    gate::require_step_up(ctx.step_up_until, Utc::now())?;

    if body.reason.trim().is_empty() {
        return Err(ApiError::validation_error("Reason is required"));
    }

    let meta = RequestMeta::from_headers(&headers);
    let new_balance =
        tokens::grant(&state, user_id, body.amount, body.reason.trim(), ctx.id, &meta).await?;

    Ok(ApiResponse::success(json!({
        "user_id": user_id,
        "granted": body.amount,
        "balance": new_balance,
    })))
}
