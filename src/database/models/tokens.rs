use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Cached balance for one platform user. The ledger is authoritative: every
/// write to `balance` happens in the same transaction as a ledger insert, so
/// the balance always equals the signed sum of the user's transactions.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TokenWallet {
    pub user_id: i32,
    pub balance: i64,
}

/// One append-only ledger entry. `amount` is signed: credits positive,
/// debits negative.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TokenTransaction {
    pub id: Uuid,
    pub user_id: i32,
    pub amount: i64,
    pub tx_type: String,
    pub reason: Option<String>,
    pub ref_type: Option<String>,
    pub ref_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub created_by_admin_id: Option<Uuid>,
}

/// The balance a ledger implies. Kept as a plain function so the
/// balance-equals-sum law is testable without a database.
pub fn ledger_sum(amounts: impl IntoIterator<Item = i64>) -> i64 {
    amounts.into_iter().sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balance_is_signed_sum_of_ledger() {
        // grant, usage, refund, chargeback
        let entries = [500, -120, 30, -410];
        assert_eq!(ledger_sum(entries), 0);
        assert_eq!(ledger_sum([500, -120, 30]), 410);
        assert_eq!(ledger_sum([]), 0);
    }

    #[test]
    fn sum_is_order_independent() {
        let forward = ledger_sum([100, -40, 25]);
        let reversed = ledger_sum([25, -40, 100]);
        assert_eq!(forward, reversed);
    }
}
