use crate::config::Settings;
use crate::error::ApiError;
use crate::identity::{IdentityProvider, LocalIdentity};
use crate::persist::SaveFile;
use crate::store::{StoreError, TaskStore};
use std::sync::Arc;

// ── Shared state ───────────────────────────────────────────────

/// Both collaborators are optional. Without a store the server runs in
/// demo mode; without an identity provider bearer tokens are accepted
/// unverified (see `auth::accept_unverified`).
#[derive(Clone, Default)]
pub struct AppState {
    pub store: Option<Arc<dyn TaskStore>>,
    pub identity: Option<Arc<dyn IdentityProvider>>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(
        store: Option<Arc<dyn TaskStore>>,
        identity: Option<Arc<dyn IdentityProvider>>,
    ) -> Self {
        AppState { store, identity }
    }

    /// One redb file backs both tasks and accounts.
    pub fn from_save_file(save_file: SaveFile, jwt_secret: &str, ttl_minutes: i64) -> Self {
        let identity = LocalIdentity::new(save_file.clone(), jwt_secret, ttl_minutes);
        AppState {
            store: Some(Arc::new(save_file)),
            identity: Some(Arc::new(identity)),
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, StoreError> {
        let Some(path) = &settings.database_path else {
            tracing::warn!("TASKNEST_DATABASE_PATH not set, running in demo mode without persistence");
            if settings.jwt_secret.is_some() {
                tracing::warn!("TASKNEST_JWT_SECRET ignored: accounts need a database");
            }
            tracing::warn!("no token verifier configured, bearer tokens are NOT verified");
            return Ok(AppState::default());
        };

        let save_file = SaveFile::open(path)?;
        tracing::info!(path = %path.display(), "save file opened");

        match &settings.jwt_secret {
            Some(secret) => Ok(AppState::from_save_file(save_file, secret, settings.token_ttl_minutes)),
            None => {
                tracing::warn!("TASKNEST_JWT_SECRET not set, bearer tokens are NOT verified");
                Ok(AppState::new(Some(Arc::new(save_file)), None))
            }
        }
    }

    pub fn store(&self) -> Result<&Arc<dyn TaskStore>, ApiError> {
        self.store.as_ref().ok_or(ApiError::ServiceUnavailable)
    }

    pub fn identity(&self) -> Result<&Arc<dyn IdentityProvider>, ApiError> {
        self.identity.as_ref().ok_or(ApiError::ServiceUnavailable)
    }

    pub fn into_shared(self) -> SharedState {
        Arc::new(self)
    }
}
