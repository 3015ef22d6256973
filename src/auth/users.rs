//! Account model, credential verification, and the user directory

use super::{jwt::TokenService, AuthError, FieldError};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[cfg(feature = "sqlite")]
use super::database::DatabaseAuthStore;

/// Name of the role granted to every newly registered account
pub const DEFAULT_ROLE: &str = "USER";

/// A generic principal: something with a name
pub trait Identity {
    /// The principal name; for accounts this is the email
    fn name(&self) -> &str;
}

/// An account record usable for credential authentication
pub trait Authenticatable {
    fn password_hash(&self) -> &str;
    /// One authority per assigned role name
    fn authorities(&self) -> Vec<String>;
    fn enabled(&self) -> bool;
    fn locked(&self) -> bool;
}

/// Account record owned by the user directory
#[derive(Debug, Clone)]
pub struct Account {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String,
    /// Set by account activation; a disabled account cannot authenticate
    pub enabled: bool,
    pub locked: bool,
    pub roles: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create a new, not yet activated account
    pub fn new(
        first_name: String,
        last_name: String,
        email: String,
        password_hash: String,
        roles: Vec<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            first_name,
            last_name,
            email,
            password_hash,
            enabled: false,
            locked: false,
            roles,
            created_at: now,
            updated_at: now,
        }
    }

    /// Human-readable display name
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

impl Identity for Account {
    fn name(&self) -> &str {
        &self.email
    }
}

impl Authenticatable for Account {
    fn password_hash(&self) -> &str {
        &self.password_hash
    }

    fn authorities(&self) -> Vec<String> {
        self.roles.clone()
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn locked(&self) -> bool {
        self.locked
    }
}

/// Role catalog entry, read-only from this module's perspective
#[derive(Debug, Clone)]
pub struct Role {
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Role {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            created_at: Utc::now(),
        }
    }
}

/// One-way password hashing capability
pub trait PasswordHasher: Send + Sync {
    fn hash(&self, password: &str) -> Result<String, AuthError>;
    fn verify(&self, password: &str, hash: &str) -> bool;
}

/// Argon2-backed hasher used in production
#[derive(Debug, Default)]
pub struct Argon2Hasher;

impl PasswordHasher for Argon2Hasher {
    fn hash(&self, password: &str) -> Result<String, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|_| AuthError::Storage("failed to hash password".to_string()))
    }

    fn verify(&self, password: &str, hash: &str) -> bool {
        let Ok(parsed_hash) = PasswordHash::new(hash) else {
            return false;
        };
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok()
    }
}

/// Account registration request
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
}

impl RegisterRequest {
    /// Validate the request body, collecting field-level messages
    ///
    /// Runs before anything is persisted.
    pub fn validate(&self) -> Result<(), AuthError> {
        let mut errors = Vec::new();

        if self.first_name.trim().is_empty() {
            errors.push(FieldError::new("first_name", "First name cannot be empty"));
        }
        if self.last_name.trim().is_empty() {
            errors.push(FieldError::new("last_name", "Last name cannot be empty"));
        }
        if !is_well_formed_email(&self.email) {
            errors.push(FieldError::new("email", "Please check your email format"));
        }
        if self.password.len() < 6 {
            errors.push(FieldError::new(
                "password",
                "Password must be at least 6 characters long",
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(AuthError::Validation(errors))
        }
    }
}

/// Credential authentication request
#[derive(Debug, Deserialize)]
pub struct AuthenticateRequest {
    pub email: String,
    pub password: String,
}

impl AuthenticateRequest {
    pub fn validate(&self) -> Result<(), AuthError> {
        let mut errors = Vec::new();

        if !is_well_formed_email(&self.email) {
            errors.push(FieldError::new("email", "Please check your email format"));
        }
        if self.password.len() < 6 {
            errors.push(FieldError::new(
                "password",
                "Password must be at least 6 characters long",
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(AuthError::Validation(errors))
        }
    }
}

/// Successful authentication response
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
}

fn is_well_formed_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace)
}

/// User directory supporting both in-memory and database storage
#[derive(Debug, Clone)]
pub enum UserStore {
    /// In-memory storage (for development and testing)
    Memory {
        accounts: Arc<RwLock<HashMap<String, Account>>>,
        accounts_by_email: Arc<RwLock<HashMap<String, String>>>, // email -> account_id
        roles: Arc<RwLock<HashMap<String, Role>>>,
    },
    /// Database storage (for production)
    #[cfg(feature = "sqlite")]
    Database(DatabaseAuthStore),
}

impl Default for UserStore {
    fn default() -> Self {
        Self::memory()
    }
}

impl UserStore {
    /// Create an in-memory directory with the default role catalog seeded
    pub fn memory() -> Self {
        let roles = HashMap::from([(DEFAULT_ROLE.to_string(), Role::new(DEFAULT_ROLE))]);
        Self::Memory {
            accounts: Arc::new(RwLock::new(HashMap::new())),
            accounts_by_email: Arc::new(RwLock::new(HashMap::new())),
            roles: Arc::new(RwLock::new(roles)),
        }
    }

    /// Create a database-backed directory
    #[cfg(feature = "sqlite")]
    pub fn database(store: DatabaseAuthStore) -> Self {
        Self::Database(store)
    }

    /// Look up a role by name
    pub async fn find_role(&self, name: &str) -> Result<Option<Role>, AuthError> {
        match self {
            Self::Memory { roles, .. } => Ok(roles.read().unwrap().get(name).cloned()),
            #[cfg(feature = "sqlite")]
            Self::Database(db) => db.find_role(name).await,
        }
    }

    /// Persist a new account; the email must be unused
    pub async fn insert_account(&self, account: Account) -> Result<Account, AuthError> {
        match self {
            Self::Memory {
                accounts,
                accounts_by_email,
                ..
            } => {
                let mut accounts = accounts.write().unwrap();
                let mut by_email = accounts_by_email.write().unwrap();

                if by_email.contains_key(&account.email) {
                    debug!("Registration rejected: email '{}' already in use", account.email);
                    return Err(AuthError::Validation(vec![FieldError::new(
                        "email",
                        "Email is already registered",
                    )]));
                }

                by_email.insert(account.email.clone(), account.id.clone());
                accounts.insert(account.id.clone(), account.clone());
                Ok(account)
            }
            #[cfg(feature = "sqlite")]
            Self::Database(db) => db.insert_account(account).await,
        }
    }

    /// Look up an account by email
    pub async fn find_by_email(&self, email: &str) -> Result<Option<Account>, AuthError> {
        match self {
            Self::Memory {
                accounts,
                accounts_by_email,
                ..
            } => {
                let by_email = accounts_by_email.read().unwrap();
                let accounts = accounts.read().unwrap();
                Ok(by_email.get(email).and_then(|id| accounts.get(id)).cloned())
            }
            #[cfg(feature = "sqlite")]
            Self::Database(db) => db.find_account_by_email(email).await,
        }
    }

    /// Look up an account by ID
    pub async fn find_by_id(&self, account_id: &str) -> Result<Option<Account>, AuthError> {
        match self {
            Self::Memory { accounts, .. } => {
                Ok(accounts.read().unwrap().get(account_id).cloned())
            }
            #[cfg(feature = "sqlite")]
            Self::Database(db) => db.find_account_by_id(account_id).await,
        }
    }

    /// Persist an update to an existing account
    pub async fn update_account(&self, account: Account) -> Result<(), AuthError> {
        match self {
            Self::Memory { accounts, .. } => {
                accounts.write().unwrap().insert(account.id.clone(), account);
                Ok(())
            }
            #[cfg(feature = "sqlite")]
            Self::Database(db) => db.update_account(&account).await,
        }
    }
}

/// Account registration and credential authentication service
#[derive(Clone)]
pub struct UserService {
    store: UserStore,
    hasher: Arc<dyn PasswordHasher>,
    tokens: Arc<TokenService>,
}

impl UserService {
    pub fn new(store: UserStore, hasher: Arc<dyn PasswordHasher>, tokens: Arc<TokenService>) -> Self {
        Self {
            store,
            hasher,
            tokens,
        }
    }

    /// Register a new, disabled account
    ///
    /// The account stays disabled until its activation code is validated.
    pub async fn register(&self, request: RegisterRequest) -> Result<Account, AuthError> {
        request.validate()?;

        let role = self
            .store
            .find_role(DEFAULT_ROLE)
            .await?
            .ok_or_else(|| {
                warn!("Registration attempted before the role catalog was seeded");
                AuthError::RoleNotConfigured
            })?;

        let password_hash = self.hasher.hash(&request.password)?;
        let account = Account::new(
            request.first_name,
            request.last_name,
            request.email,
            password_hash,
            vec![role.name],
        );

        let account = self.store.insert_account(account).await?;
        info!("Registered new account: {}", account.email);
        Ok(account)
    }

    /// Verify credentials and issue a bearer token
    ///
    /// Unknown account, wrong password, and disabled/locked account all fail
    /// uniformly with `InvalidCredentials`.
    pub async fn authenticate(&self, request: AuthenticateRequest) -> Result<String, AuthError> {
        request.validate()?;

        let account = self
            .store
            .find_by_email(&request.email)
            .await?
            .ok_or_else(|| {
                debug!("Authentication failed: unknown email");
                AuthError::InvalidCredentials
            })?;

        if !account.enabled() || account.locked() {
            debug!("Authentication failed: account '{}' is not authenticatable", account.email);
            return Err(AuthError::InvalidCredentials);
        }

        if !self.hasher.verify(&request.password, account.password_hash()) {
            debug!("Authentication failed: password mismatch for '{}'", account.email);
            return Err(AuthError::InvalidCredentials);
        }

        let claims = HashMap::from([("full_name".to_string(), json!(account.full_name()))]);
        let token = self.tokens.issue(claims, &account)?;

        info!("Account authenticated: {}", account.email);
        Ok(token)
    }

    /// Look up an account by email (used by the request interceptor)
    pub async fn find_by_email(&self, email: &str) -> Result<Option<Account>, AuthError> {
        self.store.find_by_email(email).await
    }

    /// Get the underlying directory (for testing)
    pub fn store(&self) -> &UserStore {
        &self.store
    }
}
