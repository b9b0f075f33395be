use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::{decode, decode_header, jwk::JwkSet, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

use crate::config::GoogleConfig;

pub const GOOGLE_PROVIDER: &str = "google";

const GOOGLE_ISSUERS: [&str; 2] = ["accounts.google.com", "https://accounts.google.com"];
const JWKS_TTL: Duration = Duration::from_secs(60 * 60);

/// Identity asserted by an external provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalIdentity {
    pub provider: &'static str,
    pub subject_id: String,
    pub email: String,
    pub name: Option<String>,
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("malformed identity token: {0}")]
    Malformed(String),

    #[error("no signing key with kid {0:?}")]
    UnknownKey(String),

    #[error("identity token rejected: {0}")]
    Rejected(#[from] jsonwebtoken::errors::Error),

    #[error("fetching signing keys: {0}")]
    Keys(#[from] reqwest::Error),
}

#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, id_token: &str) -> Result<ExternalIdentity, IdentityError>;
}

#[derive(Debug, Deserialize)]
struct GoogleClaims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

struct CachedKeys {
    keys: JwkSet,
    fetched_at: Instant,
}

/// Verifies Google ID tokens against Google's published signing keys.
pub struct GoogleVerifier {
    client_id: String,
    jwks_url: String,
    http: reqwest::Client,
    cache: RwLock<Option<CachedKeys>>,
}

impl GoogleVerifier {
    pub fn new(cfg: &GoogleConfig) -> Self {
        Self {
            client_id: cfg.client_id.clone(),
            jwks_url: cfg.jwks_url.clone(),
            http: reqwest::Client::new(),
            cache: RwLock::new(None),
        }
    }

    async fn key_for(&self, kid: &str) -> Result<DecodingKey, IdentityError> {
        if let Some(cached) = self.cache.read().await.as_ref() {
            if cached.fetched_at.elapsed() < JWKS_TTL {
                if let Some(jwk) = cached.keys.find(kid) {
                    return Ok(DecodingKey::from_jwk(jwk)?);
                }
            }
        }

        // Stale cache or a rotated key.
        let keys: JwkSet = self
            .http
            .get(&self.jwks_url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        debug!(count = keys.keys.len(), "google signing keys fetched");

        let key = keys
            .find(kid)
            .map(DecodingKey::from_jwk)
            .transpose()?
            .ok_or_else(|| IdentityError::UnknownKey(kid.to_owned()))?;
        *self.cache.write().await = Some(CachedKeys {
            keys,
            fetched_at: Instant::now(),
        });
        Ok(key)
    }
}

#[async_trait]
impl IdentityVerifier for GoogleVerifier {
    async fn verify(&self, id_token: &str) -> Result<ExternalIdentity, IdentityError> {
        let header = decode_header(id_token).map_err(|e| IdentityError::Malformed(e.to_string()))?;
        if header.alg != Algorithm::RS256 {
            return Err(IdentityError::Malformed(format!(
                "unexpected algorithm {:?}",
                header.alg
            )));
        }
        let kid = header
            .kid
            .ok_or_else(|| IdentityError::Malformed("missing kid".into()))?;
        let key = self.key_for(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(std::slice::from_ref(&self.client_id));
        validation.set_issuer(&GOOGLE_ISSUERS);
        let claims = decode::<GoogleClaims>(id_token, &key, &validation)?.claims;

        if claims.sub.is_empty() {
            return Err(IdentityError::Malformed("empty sub".into()));
        }
        Ok(ExternalIdentity {
            provider: GOOGLE_PROVIDER,
            subject_id: claims.sub,
            email: claims.email.unwrap_or_default(),
            name: claims.name,
        })
    }
}
