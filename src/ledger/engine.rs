use std::sync::Arc;

use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::{
    repo_types::{NewTransaction, Transaction, TransactionKind},
    store::LedgerStore,
};
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("insufficient funds: balance {balance}, requested {requested}")]
    InsufficientFunds { balance: Decimal, requested: Decimal },

    #[error(transparent)]
    Storage(StoreError),
}

impl From<StoreError> for LedgerError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { entity, id } => Self::NotFound(format!("{entity} not found: {id}")),
            other => Self::Storage(other),
        }
    }
}

/// Owns the balance-per-user invariant and the append-only transaction log.
///
/// Nothing is cached here; every call goes to the store.
#[derive(Clone)]
pub struct LedgerEngine {
    store: Arc<dyn LedgerStore>,
}

impl LedgerEngine {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub async fn get_balance(&self, user_id: Uuid) -> Result<Decimal, LedgerError> {
        self.store
            .balance(user_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("balance not found: {user_id}")))
    }

    /// Administrative override: replaces the balance without writing a ledger
    /// entry.
    ///
    /// After this call the balance no longer equals the sum of the user's
    /// transactions. It is not part of the guarded financial path and must
    /// not be used to move money.
    #[instrument(skip(self))]
    pub async fn set_balance(&self, user_id: Uuid, amount: Decimal) -> Result<(), LedgerError> {
        let mut scope = self.store.lock_balance(user_id).await?;
        let previous = scope.balance();
        scope.overwrite(amount).await?;
        scope.commit().await?;
        warn!(%user_id, %previous, %amount, "balance overwritten outside the ledger");
        Ok(())
    }

    pub async fn list_transactions(&self, user_id: Uuid) -> Result<Vec<Transaction>, LedgerError> {
        Ok(self.store.transactions(user_id).await?)
    }

    /// Validates and applies a deposit or withdrawal, then appends it to the
    /// ledger. Balance update and ledger entry commit together or not at all.
    #[instrument(skip(self))]
    pub async fn post_transaction(
        &self,
        user_id: Uuid,
        kind: &str,
        category: Option<&str>,
        raw_amount: Decimal,
    ) -> Result<Transaction, LedgerError> {
        let kind: TransactionKind = kind.parse().map_err(LedgerError::Validation)?;
        if raw_amount <= Decimal::ZERO {
            return Err(LedgerError::Validation("amount must be positive".into()));
        }
        let category = normalize_category(category);
        let delta = kind.signed(raw_amount);

        // Held until commit or drop; serializes writers for this user only.
        let mut scope = self.store.lock_balance(user_id).await?;

        let current = scope.balance();
        let projected = current.checked_add(delta).ok_or_else(|| {
            warn!(%user_id, balance = %current, amount = %delta, "balance out of range");
            LedgerError::Validation("amount out of range".into())
        })?;
        if kind == TransactionKind::Withdraw && projected < Decimal::ZERO {
            warn!(%user_id, balance = %current, requested = %raw_amount, "withdrawal rejected");
            return Err(LedgerError::InsufficientFunds {
                balance: current,
                requested: raw_amount,
            });
        }

        let new_balance = scope.apply_delta(delta).await?;
        let entry = scope
            .append(NewTransaction {
                user_id,
                kind,
                category,
                amount: delta,
            })
            .await?;
        scope.commit().await?;

        debug!(transaction_id = entry.id, %new_balance, "ledger entry committed");
        info!(%user_id, %kind, amount = %delta, "transaction posted");
        Ok(entry)
    }
}

fn normalize_category(category: Option<&str>) -> Option<String> {
    category
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_owned)
}
