use async_trait::async_trait;
use rust_decimal::Decimal;
use uuid::Uuid;

use super::repo_types::{NewTransaction, Transaction};
use crate::store::StoreError;

/// Storage required by the ledger engine.
///
/// Reads go straight to storage. Every mutation happens inside a
/// [`BalanceScope`], which holds the user's balance row exclusively until it
/// is committed or dropped.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn balance(&self, user_id: Uuid) -> Result<Option<Decimal>, StoreError>;

    /// Newest first.
    async fn transactions(&self, user_id: Uuid) -> Result<Vec<Transaction>, StoreError>;

    /// Opens a storage transaction holding the lock on `user_id`'s balance.
    /// Fails with `StoreError::NotFound` if the user has no balance row.
    async fn lock_balance(&self, user_id: Uuid) -> Result<Box<dyn BalanceScope>, StoreError>;
}

/// An open, exclusive storage transaction on one user's balance.
///
/// Nothing written through a scope is visible to others until
/// [`commit`](BalanceScope::commit) succeeds. Dropping the scope rolls back.
#[async_trait]
pub trait BalanceScope: Send {
    /// Balance as seen inside the scope, including staged changes.
    fn balance(&self) -> Decimal;

    /// Adds `delta` to the balance and returns the new amount.
    async fn apply_delta(&mut self, delta: Decimal) -> Result<Decimal, StoreError>;

    async fn overwrite(&mut self, amount: Decimal) -> Result<(), StoreError>;

    async fn append(&mut self, entry: NewTransaction) -> Result<Transaction, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
