//! Token wallet mutations.
//!
//! All balance writes go through here: the wallet upsert, the ledger insert
//! and the audit entry share one transaction, which keeps the cached balance
//! equal to the signed sum of the ledger.

use serde_json::json;
use uuid::Uuid;

use crate::error::ApiError;
use crate::services::audit::{self, AuditAction, NewAuditEntry, RequestMeta};
use crate::state::AppState;

pub const TX_TYPE_CREDIT_GRANT: &str = "credit_grant";

/// Grant `amount` tokens to a platform user. Returns the new balance.
pub async fn grant(
    state: &AppState,
    user_id: i32,
    amount: i64,
    reason: &str,
    actor_id: Uuid,
    meta: &RequestMeta,
) -> Result<i64, ApiError> {
    if amount <= 0 {
        return Err(ApiError::validation_error("Amount must be positive"));
    }

    let user_exists: Option<i32> = sqlx::query_scalar("SELECT id FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(&state.pool)
        .await?;
    if user_exists.is_none() {
        return Err(ApiError::not_found("User not found"));
    }

    let mut tx = state.pool.begin().await?;

    let before_balance: i64 =
        sqlx::query_scalar("SELECT balance FROM token_wallets WHERE user_id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?
            .unwrap_or(0);

    let new_balance: i64 = sqlx::query_scalar(
        "INSERT INTO token_wallets (user_id, balance) VALUES ($1, $2)
         ON CONFLICT (user_id) DO UPDATE SET balance = token_wallets.balance + EXCLUDED.balance
         RETURNING balance",
    )
    .bind(user_id)
    .bind(amount)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query(
        "INSERT INTO token_transactions
           (id, user_id, amount, type, reason, created_at, created_by_admin_id)
         VALUES ($1, $2, $3, $4, $5, NOW(), $6)",
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(amount)
    .bind(TX_TYPE_CREDIT_GRANT)
    .bind(reason)
    .bind(actor_id)
    .execute(&mut *tx)
    .await?;

    audit::record(
        &mut tx,
        NewAuditEntry {
            actor_id: Some(actor_id),
            action: AuditAction::Update,
            target_type: "user",
            target_id: user_id.to_string(),
            before: Some(json!({ "balance": before_balance })),
            after: Some(json!({
                "balance": new_balance,
                "amount": amount,
                "reason": reason,
            })),
            meta,
        },
    )
    .await?;

    tx.commit().await?;

    tracing::info!(user_id, amount, new_balance, "tokens granted");
    Ok(new_balance)
}
