//! Database-backed account and activation-code storage

use super::activation::ActivationCode;
use super::users::{Account, Role, DEFAULT_ROLE};
use super::{AuthError, FieldError};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tracing::{debug, error, info};

/// Database account record
struct AccountRecord {
    id: String,
    first_name: String,
    last_name: String,
    email: String,
    password_hash: String,
    enabled: bool,
    locked: bool,
    roles: String, // JSON array of role names
    created_at: String,
    updated_at: String,
}

impl AccountRecord {
    fn to_account(&self) -> Result<Account, AuthError> {
        let roles: Vec<String> = serde_json::from_str(&self.roles)
            .map_err(|e| AuthError::Storage(format!("corrupt roles column: {}", e)))?;

        Ok(Account {
            id: self.id.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            email: self.email.clone(),
            password_hash: self.password_hash.clone(),
            enabled: self.enabled,
            locked: self.locked,
            roles,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }

    fn from_account(account: &Account) -> Self {
        let roles = serde_json::to_string(&account.roles).unwrap_or_else(|_| "[]".to_string());

        Self {
            id: account.id.clone(),
            first_name: account.first_name.clone(),
            last_name: account.last_name.clone(),
            email: account.email.clone(),
            password_hash: account.password_hash.clone(),
            enabled: account.enabled,
            locked: account.locked,
            roles,
            created_at: account.created_at.to_rfc3339(),
            updated_at: account.updated_at.to_rfc3339(),
        }
    }

    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Self {
        Self {
            id: row.get("id"),
            first_name: row.get("first_name"),
            last_name: row.get("last_name"),
            email: row.get("email"),
            password_hash: row.get("password_hash"),
            enabled: row.get("enabled"),
            locked: row.get("locked"),
            roles: row.get("roles"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, AuthError> {
    value
        .parse()
        .map_err(|e| AuthError::Storage(format!("corrupt timestamp column: {}", e)))
}

fn storage_error(context: &str, e: sqlx::Error) -> AuthError {
    error!("{}: {}", context, e);
    AuthError::Storage(context.to_string())
}

/// Sqlite-backed store for accounts, roles, and activation codes
#[derive(Debug, Clone)]
pub struct DatabaseAuthStore {
    pool: SqlitePool,
}

impl DatabaseAuthStore {
    /// Create a new store, creating tables and seeding the role catalog
    pub async fn new(pool: SqlitePool) -> Result<Self, AuthError> {
        let store = Self { pool };

        store.create_tables().await?;
        store.ensure_default_role().await?;

        Ok(store)
    }

    async fn create_tables(&self) -> Result<(), AuthError> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS accounts (
                id TEXT PRIMARY KEY,
                first_name TEXT NOT NULL,
                last_name TEXT NOT NULL,
                email TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                enabled BOOLEAN NOT NULL DEFAULT FALSE,
                locked BOOLEAN NOT NULL DEFAULT FALSE,
                roles TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_accounts_email ON accounts(email)",
            r#"
            CREATE TABLE IF NOT EXISTS roles (
                name TEXT PRIMARY KEY,
                created_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS activation_codes (
                code TEXT PRIMARY KEY,
                account_id TEXT NOT NULL REFERENCES accounts(id),
                created_at TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                validated_at TEXT
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_activation_codes_account ON activation_codes(account_id)",
        ];

        for statement in statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| storage_error("Failed to create auth tables", e))?;
        }

        info!("Auth tables created successfully");
        Ok(())
    }

    /// Seed the role catalog with the default registration role
    async fn ensure_default_role(&self) -> Result<(), AuthError> {
        let existing = sqlx::query("SELECT COUNT(*) as count FROM roles WHERE name = ?")
            .bind(DEFAULT_ROLE)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| storage_error("Failed to check role catalog", e))?;

        let count: i64 = existing.get("count");
        if count > 0 {
            debug!("Default role already seeded");
            return Ok(());
        }

        sqlx::query("INSERT INTO roles (name, created_at) VALUES (?, ?)")
            .bind(DEFAULT_ROLE)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|e| storage_error("Failed to seed role catalog", e))?;

        info!("Seeded default role: {}", DEFAULT_ROLE);
        Ok(())
    }

    /// Look up a role by name
    pub async fn find_role(&self, name: &str) -> Result<Option<Role>, AuthError> {
        let row = sqlx::query("SELECT name, created_at FROM roles WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| storage_error("Failed to query role", e))?;

        match row {
            Some(row) => Ok(Some(Role {
                name: row.get("name"),
                created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
            })),
            None => Ok(None),
        }
    }

    /// Insert a new account; the email must be unused
    pub async fn insert_account(&self, account: Account) -> Result<Account, AuthError> {
        if self.email_exists(&account.email).await? {
            debug!("Registration rejected: email '{}' already in use", account.email);
            return Err(AuthError::Validation(vec![FieldError::new(
                "email",
                "Email is already registered",
            )]));
        }

        let record = AccountRecord::from_account(&account);

        let query = r#"
            INSERT INTO accounts (id, first_name, last_name, email, password_hash, enabled, locked, roles, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#;

        sqlx::query(query)
            .bind(&record.id)
            .bind(&record.first_name)
            .bind(&record.last_name)
            .bind(&record.email)
            .bind(&record.password_hash)
            .bind(record.enabled)
            .bind(record.locked)
            .bind(&record.roles)
            .bind(&record.created_at)
            .bind(&record.updated_at)
            .execute(&self.pool)
            .await
            .map_err(|e| storage_error("Failed to insert account", e))?;

        debug!("Account inserted successfully: {}", account.email);
        Ok(account)
    }

    async fn email_exists(&self, email: &str) -> Result<bool, AuthError> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM accounts WHERE email = ?")
            .bind(email)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| storage_error("Failed to check email existence", e))?;

        let count: i64 = row.get("count");
        Ok(count > 0)
    }

    /// Look up an account by email
    pub async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, AuthError> {
        let row = sqlx::query("SELECT * FROM accounts WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| storage_error("Failed to query account by email", e))?;

        row.map(|row| AccountRecord::from_row(&row).to_account())
            .transpose()
    }

    /// Look up an account by ID
    pub async fn find_account_by_id(&self, account_id: &str) -> Result<Option<Account>, AuthError> {
        let row = sqlx::query("SELECT * FROM accounts WHERE id = ?")
            .bind(account_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| storage_error("Failed to query account by id", e))?;

        row.map(|row| AccountRecord::from_row(&row).to_account())
            .transpose()
    }

    /// Persist an update to an existing account
    pub async fn update_account(&self, account: &Account) -> Result<(), AuthError> {
        let record = AccountRecord::from_account(account);

        let query = r#"
            UPDATE accounts
            SET first_name = ?, last_name = ?, email = ?, password_hash = ?, enabled = ?, locked = ?, roles = ?, updated_at = ?
            WHERE id = ?
        "#;

        sqlx::query(query)
            .bind(&record.first_name)
            .bind(&record.last_name)
            .bind(&record.email)
            .bind(&record.password_hash)
            .bind(record.enabled)
            .bind(record.locked)
            .bind(&record.roles)
            .bind(&record.updated_at)
            .bind(&record.id)
            .execute(&self.pool)
            .await
            .map_err(|e| storage_error("Failed to update account", e))?;

        Ok(())
    }

    /// Persist a freshly issued activation code
    pub async fn insert_activation_code(&self, code: &ActivationCode) -> Result<(), AuthError> {
        let query = r#"
            INSERT INTO activation_codes (code, account_id, created_at, expires_at, validated_at)
            VALUES (?, ?, ?, ?, ?)
        "#;

        sqlx::query(query)
            .bind(&code.code)
            .bind(&code.account_id)
            .bind(code.created_at.to_rfc3339())
            .bind(code.expires_at.to_rfc3339())
            .bind(code.validated_at.map(|t| t.to_rfc3339()))
            .execute(&self.pool)
            .await
            .map_err(|e| storage_error("Failed to insert activation code", e))?;

        Ok(())
    }

    /// Look up an activation code by value
    pub async fn find_activation_code(&self, code: &str) -> Result<Option<ActivationCode>, AuthError> {
        let row = sqlx::query("SELECT * FROM activation_codes WHERE code = ?")
            .bind(code)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| storage_error("Failed to query activation code", e))?;

        row.map(|row| activation_code_from_row(&row)).transpose()
    }

    /// Stamp a code as validated; a timestamp already present is kept
    pub async fn mark_activation_code_validated(
        &self,
        code: &str,
        validated_at: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        sqlx::query("UPDATE activation_codes SET validated_at = ? WHERE code = ? AND validated_at IS NULL")
            .bind(validated_at.to_rfc3339())
            .bind(code)
            .execute(&self.pool)
            .await
            .map_err(|e| storage_error("Failed to mark activation code validated", e))?;

        Ok(())
    }

    /// All codes issued to an account, newest first
    pub async fn activation_codes_for_account(
        &self,
        account_id: &str,
    ) -> Result<Vec<ActivationCode>, AuthError> {
        let rows = sqlx::query(
            "SELECT * FROM activation_codes WHERE account_id = ? ORDER BY created_at DESC",
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| storage_error("Failed to query activation codes", e))?;

        rows.iter().map(activation_code_from_row).collect()
    }
}

fn activation_code_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<ActivationCode, AuthError> {
    Ok(ActivationCode {
        code: row.get("code"),
        account_id: row.get("account_id"),
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
        expires_at: parse_timestamp(&row.get::<String, _>("expires_at"))?,
        validated_at: row
            .get::<Option<String>, _>("validated_at")
            .map(|t| parse_timestamp(&t))
            .transpose()?,
    })
}
