use axum::{extract::State, Json};
use tracing::{instrument, warn};

use super::dto::PublicUser;
use crate::{auth::extractors::AuthUser, error::AppError, state::AppState};

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<PublicUser>, AppError> {
    let user = state.users.find_by_id(user_id).await?.ok_or_else(|| {
        warn!(%user_id, "token refers to a missing user");
        AppError::NotFound("User not found".into())
    })?;
    Ok(Json(user.into()))
}
