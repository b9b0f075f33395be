use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::repo_types::{Transaction, TransactionKind};

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub balance: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct SetBalanceRequest {
    pub balance: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct PostTransactionRequest {
    #[serde(rename = "type", default)]
    pub kind: String, // "deposit" | "withdraw", checked by the engine
    #[serde(default)]
    pub category: Option<String>,
    pub amount: Decimal,
}

#[derive(Debug, Serialize)]
pub struct TransactionItem {
    pub transaction_id: i64,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub category: String,
    pub amount: Decimal,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<Transaction> for TransactionItem {
    fn from(t: Transaction) -> Self {
        Self {
            transaction_id: t.id,
            kind: t.kind,
            category: t.category.unwrap_or_default(),
            amount: t.amount,
            created_at: t.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TransactionCreatedResponse {
    pub status: &'static str,
    pub transaction: TransactionItem,
}
