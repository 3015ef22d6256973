//! One-time activation codes for confirming new accounts
//!
//! Each code moves through `Created -> {Validated | Expired}`. A code is
//! accepted at most once and its validation timestamp is never overwritten.

use super::users::UserStore;
use super::AuthError;
use crate::email::{ActivationEmail, MailDispatcher};
use chrono::{DateTime, Duration, Utc};
use rand::{rngs::OsRng, Rng};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

#[cfg(feature = "sqlite")]
use super::database::DatabaseAuthStore;

/// Number of digits in an activation code
pub const CODE_LENGTH: usize = 6;

/// Alphabet codes are drawn from
pub const CODE_ALPHABET: &[u8] = b"0123456789";

/// A persisted activation code
#[derive(Debug, Clone)]
pub struct ActivationCode {
    pub code: String,
    pub account_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub validated_at: Option<DateTime<Utc>>,
}

impl ActivationCode {
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}

/// Generate a code drawn uniformly from the code alphabet
///
/// Uses the operating system's CSPRNG; a guessable sequence here would let
/// an attacker activate accounts they don't own.
pub(crate) fn generate_code() -> String {
    (0..CODE_LENGTH)
        .map(|_| CODE_ALPHABET[OsRng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// Activation code persistence, keyed by code value
#[derive(Debug, Clone)]
pub enum ActivationStore {
    /// In-memory storage (for development and testing)
    Memory {
        codes: Arc<RwLock<HashMap<String, ActivationCode>>>,
    },
    /// Database storage (for production)
    #[cfg(feature = "sqlite")]
    Database(DatabaseAuthStore),
}

impl Default for ActivationStore {
    fn default() -> Self {
        Self::memory()
    }
}

impl ActivationStore {
    /// Create an in-memory store
    pub fn memory() -> Self {
        Self::Memory {
            codes: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Create a database-backed store
    #[cfg(feature = "sqlite")]
    pub fn database(store: DatabaseAuthStore) -> Self {
        Self::Database(store)
    }

    /// Persist a freshly issued code
    pub async fn insert(&self, code: ActivationCode) -> Result<(), AuthError> {
        match self {
            Self::Memory { codes } => {
                codes.write().unwrap().insert(code.code.clone(), code);
                Ok(())
            }
            #[cfg(feature = "sqlite")]
            Self::Database(db) => db.insert_activation_code(&code).await,
        }
    }

    /// Look up a code by its value
    pub async fn find(&self, code: &str) -> Result<Option<ActivationCode>, AuthError> {
        match self {
            Self::Memory { codes } => Ok(codes.read().unwrap().get(code).cloned()),
            #[cfg(feature = "sqlite")]
            Self::Database(db) => db.find_activation_code(code).await,
        }
    }

    /// Stamp a code as validated; the timestamp is written exactly once
    pub async fn mark_validated(
        &self,
        code: &str,
        validated_at: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        match self {
            Self::Memory { codes } => {
                let mut codes = codes.write().unwrap();
                if let Some(entry) = codes.get_mut(code) {
                    if entry.validated_at.is_none() {
                        entry.validated_at = Some(validated_at);
                    }
                }
                Ok(())
            }
            #[cfg(feature = "sqlite")]
            Self::Database(db) => db.mark_activation_code_validated(code, validated_at).await,
        }
    }

    /// All codes issued to an account, newest first
    pub async fn codes_for_account(&self, account_id: &str) -> Result<Vec<ActivationCode>, AuthError> {
        match self {
            Self::Memory { codes } => {
                let mut found: Vec<ActivationCode> = codes
                    .read()
                    .unwrap()
                    .values()
                    .filter(|c| c.account_id == account_id)
                    .cloned()
                    .collect();
                found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
                Ok(found)
            }
            #[cfg(feature = "sqlite")]
            Self::Database(db) => db.activation_codes_for_account(account_id).await,
        }
    }
}

/// Activation workflow configuration, loaded once at startup
#[derive(Debug, Clone)]
pub struct ActivationConfig {
    /// Code lifetime
    pub ttl: Duration,
    /// Front-end URL embedded in activation emails
    pub activation_url: String,
}

impl ActivationConfig {
    pub fn new(ttl_secs: i64, activation_url: String) -> Self {
        Self {
            ttl: Duration::seconds(ttl_secs),
            activation_url,
        }
    }
}

/// Generates, persists, and validates activation codes, and drives the
/// account-enable transition
#[derive(Clone)]
pub struct ActivationService {
    codes: ActivationStore,
    users: UserStore,
    mail: MailDispatcher,
    config: ActivationConfig,
}

impl ActivationService {
    pub fn new(
        codes: ActivationStore,
        users: UserStore,
        mail: MailDispatcher,
        config: ActivationConfig,
    ) -> Self {
        Self {
            codes,
            users,
            mail,
            config,
        }
    }

    /// Issue a fresh code for an account and request email delivery
    ///
    /// The code is persisted before the email is enqueued; a dispatch
    /// failure is surfaced to the caller but never rolls the code back, so
    /// the account can still be activated through a later resend.
    pub async fn issue(
        &self,
        account_id: &str,
        email: &str,
        recipient_name: &str,
    ) -> Result<String, AuthError> {
        let generated = generate_code();
        let now = Utc::now();

        self.codes
            .insert(ActivationCode {
                code: generated.clone(),
                account_id: account_id.to_string(),
                created_at: now,
                expires_at: now + self.config.ttl,
                validated_at: None,
            })
            .await?;

        debug!("Issued activation code for account {}", account_id);

        self.mail.dispatch(ActivationEmail {
            to: email.to_string(),
            recipient_name: recipient_name.to_string(),
            activation_url: self.config.activation_url.clone(),
            activation_code: generated.clone(),
            subject: "Account activation".to_string(),
        })?;

        Ok(generated)
    }

    /// Validate a submitted code and enable the owning account
    ///
    /// An expired code is terminal: a replacement is issued for the same
    /// account and the caller is told to look for the new one. Re-validating
    /// an already-validated, unexpired code is an idempotent success.
    pub async fn validate(&self, code: &str) -> Result<(), AuthError> {
        let saved = self
            .codes
            .find(code)
            .await?
            .ok_or(AuthError::CodeNotFound)?;

        if saved.is_expired() {
            let account = self
                .users
                .find_by_id(&saved.account_id)
                .await?
                .ok_or(AuthError::AccountNotFound)?;

            info!(
                "Activation code for account {} expired; issuing a replacement",
                account.id
            );
            // A failed email dispatch still leaves the replacement usable
            if let Err(err) = self
                .issue(&account.id, &account.email, &account.full_name())
                .await
            {
                warn!("Failed to dispatch replacement activation email: {}", err);
            }
            return Err(AuthError::CodeExpired);
        }

        if saved.validated_at.is_some() {
            debug!("Activation code for account {} already validated", saved.account_id);
            return Ok(());
        }

        let mut account = self
            .users
            .find_by_id(&saved.account_id)
            .await?
            .ok_or(AuthError::AccountNotFound)?;

        account.enabled = true;
        account.updated_at = Utc::now();
        self.users.update_account(account).await?;
        self.codes.mark_validated(code, Utc::now()).await?;

        info!("Account {} activated", saved.account_id);
        Ok(())
    }

    /// Get the underlying code store (for testing)
    pub fn store(&self) -> &ActivationStore {
        &self.codes
    }
}
