use async_trait::async_trait;
use axum::{routing::get, Router};
use uuid::Uuid;

use crate::{state::AppState, store::StoreError};

mod dto;
pub mod handlers;
pub mod repo_types;

pub use repo_types::{NewUser, ProfilePatch, ResolvedUser, User};

/// Maps external identities to internal users.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Looks a user up by `(provider, subject_id)` and creates it, together
    /// with a zero balance, when absent. Both rows are written in one storage
    /// transaction.
    async fn resolve_or_create(&self, new_user: NewUser<'_>) -> Result<ResolvedUser, StoreError>;

    /// Fails with `StoreError::NotFound` when `user_id` does not exist.
    async fn patch_profile(&self, user_id: Uuid, patch: &ProfilePatch) -> Result<(), StoreError>;

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>, StoreError>;
}

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/me",
        get(handlers::get_me).fallback(crate::error::method_not_allowed),
    )
}
