//! Authentication handlers for registration, login, and account activation

use super::{
    users::{AuthenticateRequest, RegisterRequest, TokenResponse},
    AuthError, SecurityContext,
};
use crate::AppState;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    Json as JsonExtractor,
};
use serde::Deserialize;
use tracing::info;

/// Account registration endpoint
///
/// Creates a disabled account and dispatches an activation email.
/// Answers 202 Accepted with no body; the account becomes usable only after
/// the activation code is confirmed.
pub async fn register_account(
    State(app_state): State<AppState>,
    JsonExtractor(request): JsonExtractor<RegisterRequest>,
) -> Result<StatusCode, AuthError> {
    info!("Account registration attempt: {}", request.email);

    let account = app_state.user_service.register(request).await?;
    app_state
        .activation_service
        .issue(&account.id, &account.email, &account.full_name())
        .await?;

    info!("Account registered, activation email queued: {}", account.email);
    Ok(StatusCode::ACCEPTED)
}

/// Credential authentication endpoint
///
/// Verifies email and password and returns a signed bearer token.
pub async fn authenticate(
    State(app_state): State<AppState>,
    JsonExtractor(request): JsonExtractor<AuthenticateRequest>,
) -> Result<Json<TokenResponse>, AuthError> {
    info!("Authentication attempt: {}", request.email);

    let token = app_state.user_service.authenticate(request).await?;

    Ok(Json(TokenResponse { token }))
}

/// Activation query parameters
#[derive(Debug, Deserialize)]
pub struct ActivateParams {
    /// The submitted activation code
    pub token: String,
}

/// Account activation endpoint
///
/// Validates the submitted code and enables the owning account. An expired
/// code triggers a replacement email and reports the expiry.
pub async fn activate_account(
    State(app_state): State<AppState>,
    Query(params): Query<ActivateParams>,
) -> Result<StatusCode, AuthError> {
    app_state.activation_service.validate(&params.token).await?;

    Ok(StatusCode::OK)
}

/// Current principal endpoint
///
/// Echoes the security context installed by the authentication interceptor.
/// Rejects with 401 when the request carried no usable bearer token.
pub async fn current_account(context: SecurityContext) -> Json<SecurityContext> {
    Json(context)
}
