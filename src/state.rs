//! Application state management

use crate::{
    auth::{
        activation::{ActivationConfig, ActivationService, ActivationStore},
        jwt::TokenService,
        users::{Argon2Hasher, UserService, UserStore},
    },
    email::{LogMailer, MailDispatcher, Mailer, RelayMailer},
    WebConfig, WebError, WebResult,
};
use std::sync::Arc;
use tracing::info;

#[cfg(feature = "sqlite")]
use crate::auth::database::DatabaseAuthStore;

/// Shared application state
///
/// Everything here is read-mostly and cheap to clone; the stores serialize
/// their own writes, so concurrent requests never share mutable state
/// directly.
#[derive(Clone)]
pub struct AppState {
    /// Configuration
    pub config: WebConfig,
    /// Token signing and verification service
    pub tokens: Arc<TokenService>,
    /// Registration and credential authentication service
    pub user_service: UserService,
    /// Activation code workflow
    pub activation_service: ActivationService,
}

impl AppState {
    /// Create a new application state
    pub async fn new(config: WebConfig) -> WebResult<Self> {
        if config.token_secret.is_empty() {
            return Err(WebError::Config(
                "token signing secret must not be empty".to_string(),
            ));
        }

        // Pick the storage backend: sqlite when configured, memory otherwise
        #[cfg(feature = "sqlite")]
        let (user_store, activation_store) = if let Some(database_url) = &config.database_url {
            let pool = sqlx::SqlitePool::connect(database_url)
                .await
                .map_err(|e| WebError::Database(format!("Failed to connect: {}", e)))?;
            let store = DatabaseAuthStore::new(pool)
                .await
                .map_err(|e| WebError::Database(e.to_string()))?;
            info!("Database storage initialized");
            (
                UserStore::database(store.clone()),
                ActivationStore::database(store),
            )
        } else {
            (UserStore::memory(), ActivationStore::memory())
        };

        #[cfg(not(feature = "sqlite"))]
        let (user_store, activation_store) = (UserStore::memory(), ActivationStore::memory());

        // Mail goes through a relay when one is configured; the log mailer
        // keeps development and tests self-contained
        let mailer: Arc<dyn Mailer> = match &config.mail_endpoint {
            Some(endpoint) => Arc::new(RelayMailer::new(endpoint.clone())),
            None => Arc::new(LogMailer),
        };
        let mail_dispatcher = MailDispatcher::spawn(mailer);

        let tokens = Arc::new(TokenService::new(
            config.token_secret.as_bytes(),
            config.token_ttl_secs,
        ));

        let user_service = UserService::new(
            user_store.clone(),
            Arc::new(Argon2Hasher),
            tokens.clone(),
        );

        let activation_service = ActivationService::new(
            activation_store,
            user_store,
            mail_dispatcher,
            ActivationConfig::new(config.activation_ttl_secs, config.activation_url.clone()),
        );

        let state = Self {
            config,
            tokens,
            user_service,
            activation_service,
        };

        info!("Application state initialized successfully");
        Ok(state)
    }
}
