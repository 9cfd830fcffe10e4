use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::repositories::logout::{AuditStore, PgAuditStore};
use crate::repositories::user::{CredentialStore, PgCredentialStore};
use crate::services::auth::{dummy_hash, CredentialPolicy};
use crate::session_store::SessionStore;
use crate::views::Views;

/// The application's state.
#[derive(Clone)]
pub struct AppState {
    /// The application's configuration.
    pub config: Config,
    /// Registered users.
    pub credentials: Arc<dyn CredentialStore>,
    /// Logout history.
    pub audit: Arc<dyn AuditStore>,
    /// Signed-cookie sessions.
    pub sessions: SessionStore,
    /// Page templates.
    pub views: Views,
    /// How credentials are checked and stored.
    pub policy: CredentialPolicy,
}

impl AppState {
    /// Creates a new `AppState` backed by PostgreSQL.
    ///
    /// Fails if the database cannot be reached.
    pub async fn new(config: &Config) -> Result<Self> {
        let db = crate::db::create_pool(&config.database)?;
        tracing::info!(
            "✅ PostgreSQL Pool initialized with deadpool-postgres (max {} connections)",
            config.database.pool_size
        );

        crate::db::verify_connection(&db).await?;

        Self::with_stores(
            config,
            Arc::new(PgCredentialStore::new(db.clone())),
            Arc::new(PgAuditStore::new(db)),
        )
    }

    /// Creates an `AppState` around the given stores.
    pub fn with_stores(
        config: &Config,
        credentials: Arc<dyn CredentialStore>,
        audit: Arc<dyn AuditStore>,
    ) -> Result<Self> {
        let views = Views::new()?;
        tracing::info!("✅ Templates compiled");

        let policy = CredentialPolicy::from_flag(config.hardening);
        if policy == CredentialPolicy::Plaintext {
            tracing::warn!("⚠️ Credential hardening is off: passwords are stored and compared as plain text");
        } else if dummy_hash().is_some() {
            tracing::info!("✅ Placeholder password hash prepared");
        }

        Ok(AppState {
            config: config.clone(),
            credentials,
            audit,
            sessions: SessionStore::new(config),
            views,
            policy,
        })
    }
}
