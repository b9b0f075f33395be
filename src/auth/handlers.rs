use axum::{
    extract::State,
    routing::post,
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, instrument, warn};

use super::{
    dto::{GoogleAuthRequest, MessageResponse, PatchProfileRequest, TokenResponse},
    extractors::AuthUser,
};
use crate::{
    error::{method_not_allowed, AppError},
    extract::ApiJson,
    state::AppState,
    users::{NewUser, ProfilePatch},
};

pub fn auth_routes() -> Router<AppState> {
    Router::new().route(
        "/auth/google",
        post(google_sign_in)
            .patch(patch_profile)
            .fallback(method_not_allowed),
    )
}

pub(crate) fn is_valid_photo_url(url: &str) -> bool {
    lazy_static! {
        static ref PHOTO_URL_RE: Regex = Regex::new(r"^https?://[^\s/$.?#][^\s]*$").unwrap();
    }
    PHOTO_URL_RE.is_match(url)
}

#[instrument(skip(state, payload))]
pub async fn google_sign_in(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<GoogleAuthRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    let id_token = payload.id_token.trim();
    if id_token.is_empty() {
        return Err(AppError::Validation("id_token is required".into()));
    }

    let identity = state.identity.verify(id_token).await.map_err(|e| {
        warn!(error = %e, "identity token rejected");
        AppError::UpstreamIdentity("Token validation error".into())
    })?;

    let user = state
        .users
        .resolve_or_create(NewUser {
            provider: identity.provider,
            subject_id: &identity.subject_id,
            email: &identity.email,
            name: identity.name.as_deref(),
        })
        .await?;
    if user.created {
        info!(user_id = %user.id, email = %identity.email, "user created");
    }

    let token = state.jwt.sign(user.id, &identity.email)?;
    info!(user_id = %user.id, "user signed in");
    Ok(Json(TokenResponse { token }))
}

#[instrument(skip(state, payload))]
pub async fn patch_profile(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ApiJson(payload): ApiJson<PatchProfileRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    if let Some(url) = payload.photo_url.as_deref() {
        if !url.is_empty() && !is_valid_photo_url(url) {
            return Err(AppError::Validation("photoUrl must be an http(s) URL".into()));
        }
    }

    let patch = ProfilePatch {
        given_name: payload.given_name.map(|n| n.trim().to_owned()),
        photo_url: payload.photo_url,
    };
    state.users.patch_profile(user_id, &patch).await?;

    info!(%user_id, "profile updated");
    Ok(Json(MessageResponse {
        message: "User updated successfully",
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn photo_url_must_be_http() {
        assert!(is_valid_photo_url("https://lh3.googleusercontent.com/a/abc=s96-c"));
        assert!(is_valid_photo_url("http://example.com/me.png"));
        assert!(!is_valid_photo_url("ftp://example.com/me.png"));
        assert!(!is_valid_photo_url("javascript:alert(1)"));
        assert!(!is_valid_photo_url("https://exa mple.com"));
        assert!(!is_valid_photo_url("https://"));
    }
}
