use std::sync::Arc;

use tracing::warn;

use crate::{
    auth::{GoogleVerifier, IdentityVerifier, JwtKeys},
    config::AppConfig,
    db,
    ledger::{LedgerEngine, LedgerStore},
    store::{MemoryStore, PgStore},
    users::UserDirectory,
};

/// `DATABASE_URL` value that selects the in-process store.
pub const MEMORY_DATABASE_URL: &str = "memory://";

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub jwt: JwtKeys,
    pub users: Arc<dyn UserDirectory>,
    pub ledger: LedgerEngine,
    pub identity: Arc<dyn IdentityVerifier>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);
        let identity = Arc::new(GoogleVerifier::new(&config.google)) as Arc<dyn IdentityVerifier>;

        if config.database_url == MEMORY_DATABASE_URL {
            warn!("using in-memory store; nothing will be persisted");
            let store = MemoryStore::new();
            return Ok(Self::from_parts(
                config,
                Arc::new(store.clone()),
                Arc::new(store),
                identity,
            ));
        }

        let pool = db::connect(&config).await?;
        db::migrate(&pool).await?;
        let store = PgStore::new(pool);
        Ok(Self::from_parts(
            config,
            Arc::new(store.clone()),
            Arc::new(store),
            identity,
        ))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        users: Arc<dyn UserDirectory>,
        ledger_store: Arc<dyn LedgerStore>,
        identity: Arc<dyn IdentityVerifier>,
    ) -> Self {
        Self {
            jwt: JwtKeys::new(&config.jwt),
            config,
            users,
            ledger: LedgerEngine::new(ledger_store),
            identity,
        }
    }

    /// State backed by `store`, with fixed test secrets.
    #[cfg(test)]
    pub fn fake(store: MemoryStore, identity: Arc<dyn IdentityVerifier>) -> Self {
        use crate::config::{GoogleConfig, JwtConfig};

        let config = Arc::new(AppConfig {
            host: "127.0.0.1".into(),
            port: 0,
            database_url: MEMORY_DATABASE_URL.into(),
            max_connections: 1,
            jwt: JwtConfig {
                secret: "test".into(),
                issuer: "test-issuer".into(),
                audience: "test-aud".into(),
                ttl_minutes: 5,
            },
            google: GoogleConfig {
                client_id: "test-client".into(),
                jwks_url: "http://127.0.0.1:9/certs".into(),
            },
        });
        Self::from_parts(config, Arc::new(store.clone()), Arc::new(store), identity)
    }
}
