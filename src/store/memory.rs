use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use rust_decimal::Decimal;
use time::OffsetDateTime;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use uuid::Uuid;

use super::StoreError;
use crate::{
    ledger::{BalanceScope, LedgerStore, NewTransaction, Transaction},
    users::{NewUser, ProfilePatch, ResolvedUser, User, UserDirectory},
};

/// Step at which [`MemoryStore`] should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    /// Opening a balance scope.
    Lock,
    /// Inserting a ledger entry inside a scope.
    Append,
    /// Committing a scope.
    Commit,
    /// Creating a user and its balance.
    CreateUser,
}

#[derive(Default)]
struct Ledger {
    amount: Decimal,
    transactions: Vec<Transaction>, // oldest first
}

#[derive(Default)]
struct Directory {
    users: HashMap<Uuid, User>,
    by_subject: HashMap<(String, String), Uuid>,
    ledgers: HashMap<Uuid, Arc<Mutex<Ledger>>>,
}

#[derive(Default)]
struct Shared {
    directory: RwLock<Directory>,
    next_tx_id: AtomicI64,
    fail_point: Mutex<Option<FailPoint>>,
}

impl Shared {
    async fn check(&self, at: FailPoint) -> Result<(), StoreError> {
        if *self.fail_point.lock().await == Some(at) {
            return Err(StoreError::Injected(at));
        }
        Ok(())
    }

    async fn ledger(&self, user_id: Uuid) -> Option<Arc<Mutex<Ledger>>> {
        self.directory.read().await.ledgers.get(&user_id).cloned()
    }
}

/// In-process store. Each user's ledger sits behind its own mutex, so
/// writers for different users never wait on each other.
#[derive(Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent operation reaching `at` fail, until reset
    /// with `None`.
    #[cfg(test)]
    pub(crate) async fn fail_at(&self, at: Option<FailPoint>) {
        *self.shared.fail_point.lock().await = at;
    }

    #[cfg(test)]
    pub(crate) async fn counts(&self) -> (usize, usize) {
        let dir = self.shared.directory.read().await;
        (dir.users.len(), dir.ledgers.len())
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn resolve_or_create(&self, new_user: NewUser<'_>) -> Result<ResolvedUser, StoreError> {
        let key = (new_user.provider.to_owned(), new_user.subject_id.to_owned());
        let mut dir = self.shared.directory.write().await;
        if let Some(id) = dir.by_subject.get(&key) {
            return Ok(ResolvedUser {
                id: *id,
                created: false,
            });
        }

        self.shared.check(FailPoint::CreateUser).await?;

        let id = Uuid::new_v4();
        dir.users.insert(
            id,
            User {
                id,
                email: new_user.email.to_owned(),
                name: new_user.name.map(str::to_owned),
                provider: key.0.clone(),
                provider_user_id: key.1.clone(),
                given_name: None,
                photo_url: None,
                created_at: OffsetDateTime::now_utc(),
            },
        );
        dir.by_subject.insert(key, id);
        dir.ledgers.insert(id, Arc::default());
        Ok(ResolvedUser { id, created: true })
    }

    async fn patch_profile(&self, user_id: Uuid, patch: &ProfilePatch) -> Result<(), StoreError> {
        let mut dir = self.shared.directory.write().await;
        let user = dir
            .users
            .get_mut(&user_id)
            .ok_or_else(|| StoreError::not_found("user", user_id))?;
        if let Some(given_name) = &patch.given_name {
            user.given_name = Some(given_name.clone());
        }
        if let Some(photo_url) = &patch.photo_url {
            user.photo_url = Some(photo_url.clone());
        }
        Ok(())
    }

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.shared.directory.read().await.users.get(&user_id).cloned())
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn balance(&self, user_id: Uuid) -> Result<Option<Decimal>, StoreError> {
        match self.shared.ledger(user_id).await {
            Some(ledger) => Ok(Some(ledger.lock().await.amount)),
            None => Ok(None),
        }
    }

    async fn transactions(&self, user_id: Uuid) -> Result<Vec<Transaction>, StoreError> {
        match self.shared.ledger(user_id).await {
            Some(ledger) => Ok(ledger.lock().await.transactions.iter().rev().cloned().collect()),
            None => Ok(Vec::new()),
        }
    }

    async fn lock_balance(&self, user_id: Uuid) -> Result<Box<dyn BalanceScope>, StoreError> {
        self.shared.check(FailPoint::Lock).await?;
        let ledger = self
            .shared
            .ledger(user_id)
            .await
            .ok_or_else(|| StoreError::not_found("balance", user_id))?;
        let guard = ledger.lock_owned().await;
        Ok(Box::new(MemoryScope {
            shared: Arc::clone(&self.shared),
            user_id,
            amount: guard.amount,
            staged: Vec::new(),
            guard,
        }))
    }
}

/// Changes are staged locally and copied into the ledger on commit.
struct MemoryScope {
    shared: Arc<Shared>,
    user_id: Uuid,
    amount: Decimal,
    staged: Vec<Transaction>,
    guard: OwnedMutexGuard<Ledger>,
}

#[async_trait]
impl BalanceScope for MemoryScope {
    fn balance(&self) -> Decimal {
        self.amount
    }

    async fn apply_delta(&mut self, delta: Decimal) -> Result<Decimal, StoreError> {
        self.amount = self.amount.checked_add(delta).ok_or(StoreError::OutOfRange)?;
        Ok(self.amount)
    }

    async fn overwrite(&mut self, amount: Decimal) -> Result<(), StoreError> {
        self.amount = amount;
        Ok(())
    }

    async fn append(&mut self, entry: NewTransaction) -> Result<Transaction, StoreError> {
        self.shared.check(FailPoint::Append).await?;
        debug_assert_eq!(entry.user_id, self.user_id);
        let tx = Transaction {
            id: self.shared.next_tx_id.fetch_add(1, Ordering::SeqCst) + 1,
            user_id: entry.user_id,
            kind: entry.kind,
            category: entry.category,
            amount: entry.amount,
            created_at: OffsetDateTime::now_utc(),
        };
        self.staged.push(tx.clone());
        Ok(tx)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.shared.check(FailPoint::Commit).await?;
        let MemoryScope {
            amount,
            staged,
            mut guard,
            ..
        } = *self;
        guard.amount = amount;
        guard.transactions.extend(staged);
        Ok(())
    }
}
