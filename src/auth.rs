//! Authentication and authorization for the Bookhive API
//!
//! Accounts are registered disabled, enabled through a one-time activation
//! code, and authenticated with stateless signed bearer tokens. The security
//! context installed by the request interceptor lives in the request
//! extensions, never in process-wide mutable state.

pub mod activation;
#[cfg(feature = "sqlite")]
pub mod database;
pub mod handlers;
pub mod jwt;
pub mod users;

#[cfg(test)]
mod tests;

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use serde_json::json;

use self::users::{Account, Authenticatable, Identity};

/// Field-level message for a rejected request body
#[derive(Debug, Clone, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &str, message: &str) -> Self {
        Self {
            field: field.to_string(),
            message: message.to_string(),
        }
    }
}

/// Authentication errors
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Request validation failed")]
    Validation(Vec<FieldError>),
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Authentication required")]
    MissingAuthentication,
    #[error("Invalid token")]
    InvalidToken,
    #[error("Token expired")]
    TokenExpired,
    #[error("Token creation failed")]
    TokenCreation,
    #[error("Activation code not found")]
    CodeNotFound,
    #[error("Activation code expired")]
    CodeExpired,
    #[error("Account not found")]
    AccountNotFound,
    #[error("Role catalog is not initialized")]
    RoleNotConfigured,
    #[error("Activation email could not be dispatched")]
    EmailDelivery,
    #[error("Storage error: {0}")]
    Storage(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            AuthError::Validation(fields) => {
                // Field-level messages get their own body shape
                let body = Json(json!({
                    "error": "validation_failed",
                    "message": "Request validation failed",
                    "fields": fields,
                }));
                return (StatusCode::BAD_REQUEST, body).into_response();
            }
            AuthError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                "invalid_credentials",
                "Invalid email or password",
            ),
            AuthError::MissingAuthentication => (
                StatusCode::UNAUTHORIZED,
                "authentication_required",
                "Authentication is required for this resource",
            ),
            AuthError::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                "invalid_token",
                "Invalid or malformed token",
            ),
            AuthError::TokenExpired => (
                StatusCode::UNAUTHORIZED,
                "token_expired",
                "Token has expired",
            ),
            AuthError::TokenCreation => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "token_creation_failed",
                "Failed to create authentication token",
            ),
            AuthError::CodeNotFound => (
                StatusCode::NOT_FOUND,
                "activation_code_not_found",
                "Activation code is not recognized",
            ),
            AuthError::CodeExpired => (
                StatusCode::BAD_REQUEST,
                "activation_code_expired",
                "Activation code has expired. A new code has been sent to your email",
            ),
            AuthError::AccountNotFound => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "account_not_found",
                "Account record no longer exists",
            ),
            AuthError::RoleNotConfigured => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "role_not_configured",
                "Server role catalog is not initialized",
            ),
            AuthError::EmailDelivery => (
                StatusCode::BAD_GATEWAY,
                "email_delivery_failed",
                "Account was created but the activation email could not be dispatched",
            ),
            AuthError::Storage(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "storage_error",
                "Storage operation failed",
            ),
        };

        let body = Json(json!({
            "error": error_code,
            "message": message,
        }));

        (status, body).into_response()
    }
}

/// Per-request record of the authenticated principal and its authorities
///
/// Installed into the request extensions by the authentication interceptor
/// and discarded when the request ends.
#[derive(Debug, Clone, Serialize)]
pub struct SecurityContext {
    /// Account ID of the authenticated principal
    pub account_id: String,
    /// Principal name (the account email)
    pub email: String,
    /// Human-readable display name
    pub display_name: String,
    /// One authority per assigned role name
    pub authorities: Vec<String>,
}

impl SecurityContext {
    /// Build a context for a freshly resolved account
    pub fn for_account(account: &Account) -> Self {
        Self {
            account_id: account.id.clone(),
            email: account.name().to_string(),
            display_name: account.full_name(),
            authorities: account.authorities(),
        }
    }

    /// Check whether the principal carries a specific authority
    pub fn has_authority(&self, authority: &str) -> bool {
        self.authorities.iter().any(|a| a == authority)
    }
}

/// Extractor for the security context installed by the interceptor
///
/// Rejects with 401 when no context was installed - this is where requests
/// that passed through the interceptor unauthenticated are finally refused.
impl<S> FromRequestParts<S> for SecurityContext
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SecurityContext>()
            .cloned()
            .ok_or(AuthError::MissingAuthentication)
    }
}
