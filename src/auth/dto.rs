use serde::{Deserialize, Serialize};

/// Request body for Google sign-in.
#[derive(Debug, Deserialize)]
pub struct GoogleAuthRequest {
    pub id_token: String,
}

/// Session token returned after sign-in.
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
}

/// Profile fields the client may change. Absent fields are left as they are.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchProfileRequest {
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}
