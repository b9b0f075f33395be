use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction as SqlTransaction};
use tracing::debug;
use uuid::Uuid;

use super::StoreError;
use crate::{
    ledger::{BalanceScope, LedgerStore, NewTransaction, Transaction, TransactionRow},
    users::{NewUser, ProfilePatch, ResolvedUser, User, UserDirectory},
};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgStore {
    async fn resolve_or_create(&self, new_user: NewUser<'_>) -> Result<ResolvedUser, StoreError> {
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT id
              FROM users
             WHERE provider = $1 AND provider_user_id = $2
            "#,
        )
        .bind(new_user.provider)
        .bind(new_user.subject_id)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(id) = existing {
            tx.commit().await?;
            return Ok(ResolvedUser { id, created: false });
        }

        let inserted = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO users (email, name, provider, provider_user_id)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (provider, provider_user_id) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(new_user.email)
        .bind(new_user.name)
        .bind(new_user.provider)
        .bind(new_user.subject_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(id) = inserted else {
            // A concurrent first login created the row after our lookup.
            let id = sqlx::query_scalar::<_, Uuid>(
                "SELECT id FROM users WHERE provider = $1 AND provider_user_id = $2",
            )
            .bind(new_user.provider)
            .bind(new_user.subject_id)
            .fetch_one(&mut *tx)
            .await?;
            tx.commit().await?;
            return Ok(ResolvedUser { id, created: false });
        };

        sqlx::query("INSERT INTO balance (user_id, amount) VALUES ($1, 0)")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(ResolvedUser { id, created: true })
    }

    async fn patch_profile(&self, user_id: Uuid, patch: &ProfilePatch) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE users
               SET given_name = COALESCE($2, given_name),
                   photo_url  = COALESCE($3, photo_url)
             WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(patch.given_name.as_deref())
        .bind(patch.photo_url.as_deref())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("user", user_id));
        }
        Ok(())
    }

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, name, provider, provider_user_id, given_name, photo_url, created_at
              FROM users
             WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }
}

#[async_trait]
impl LedgerStore for PgStore {
    async fn balance(&self, user_id: Uuid) -> Result<Option<Decimal>, StoreError> {
        let amount = sqlx::query_scalar::<_, Decimal>("SELECT amount FROM balance WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(amount)
    }

    async fn transactions(&self, user_id: Uuid) -> Result<Vec<Transaction>, StoreError> {
        let rows = sqlx::query_as::<_, TransactionRow>(
            r#"
            SELECT id, user_id, type AS kind, category, amount, created_at
              FROM transactions
             WHERE user_id = $1
             ORDER BY id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Transaction::try_from).collect()
    }

    async fn lock_balance(&self, user_id: Uuid) -> Result<Box<dyn BalanceScope>, StoreError> {
        let mut tx = self.pool.begin().await?;
        // Row lock: concurrent scopes for the same user queue here.
        let amount = sqlx::query_scalar::<_, Decimal>(
            "SELECT amount FROM balance WHERE user_id = $1 FOR UPDATE",
        )
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::not_found("balance", user_id))?;
        debug!(%user_id, %amount, "balance row locked");

        Ok(Box::new(PgScope {
            tx,
            user_id,
            amount,
        }))
    }
}

/// Dropping an uncommitted `sqlx::Transaction` issues a rollback.
struct PgScope {
    tx: SqlTransaction<'static, Postgres>,
    user_id: Uuid,
    amount: Decimal,
}

#[async_trait]
impl BalanceScope for PgScope {
    fn balance(&self) -> Decimal {
        self.amount
    }

    async fn apply_delta(&mut self, delta: Decimal) -> Result<Decimal, StoreError> {
        self.amount = sqlx::query_scalar::<_, Decimal>(
            "UPDATE balance SET amount = amount + $2 WHERE user_id = $1 RETURNING amount",
        )
        .bind(self.user_id)
        .bind(delta)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(self.amount)
    }

    async fn overwrite(&mut self, amount: Decimal) -> Result<(), StoreError> {
        sqlx::query("UPDATE balance SET amount = $2 WHERE user_id = $1")
            .bind(self.user_id)
            .bind(amount)
            .execute(&mut *self.tx)
            .await?;
        self.amount = amount;
        Ok(())
    }

    async fn append(&mut self, entry: NewTransaction) -> Result<Transaction, StoreError> {
        let row = sqlx::query_as::<_, TransactionRow>(
            r#"
            INSERT INTO transactions (user_id, type, category, amount)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id, type AS kind, category, amount, created_at
            "#,
        )
        .bind(entry.user_id)
        .bind(entry.kind.as_str())
        .bind(entry.category)
        .bind(entry.amount)
        .fetch_one(&mut *self.tx)
        .await?;
        row.try_into()
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}
