use std::{fmt, str::FromStr};

use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::store::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Deposit,
    Withdraw,
}

impl TransactionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Deposit => "deposit",
            Self::Withdraw => "withdraw",
        }
    }

    /// The delta this kind applies to a balance for a positive `amount`.
    pub fn signed(self, amount: Decimal) -> Decimal {
        match self {
            Self::Deposit => amount,
            Self::Withdraw => -amount,
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(Self::Deposit),
            "withdraw" => Ok(Self::Withdraw),
            other => Err(format!("invalid transaction type: {other:?}")),
        }
    }
}

/// Immutable ledger entry. `amount` is the signed delta that was applied.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub id: i64,
    pub user_id: Uuid,
    pub kind: TransactionKind,
    pub category: Option<String>,
    pub amount: Decimal,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub user_id: Uuid,
    pub kind: TransactionKind,
    pub category: Option<String>,
    pub amount: Decimal,
}

#[derive(Debug, FromRow)]
pub struct TransactionRow {
    pub id: i64,
    pub user_id: Uuid,
    pub kind: String,
    pub category: Option<String>,
    pub amount: Decimal,
    pub created_at: OffsetDateTime,
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = StoreError;

    fn try_from(r: TransactionRow) -> Result<Self, Self::Error> {
        let kind = r
            .kind
            .parse()
            .map_err(|e: String| StoreError::Corrupt(format!("transaction {}: {e}", r.id)))?;
        Ok(Self {
            id: r.id,
            user_id: r.user_id,
            kind,
            category: r.category,
            amount: r.amount,
            created_at: r.created_at,
        })
    }
}
