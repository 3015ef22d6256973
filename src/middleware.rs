//! Request authentication interceptor
//!
//! Runs once per inbound request, before the handlers. It only populates or
//! withholds the per-request security context; it never answers a request
//! itself. Rejecting unauthenticated requests is the job of downstream
//! authorization (the `SecurityContext` extractor).

use crate::{auth::SecurityContext, AppState};
use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};

/// Paths served without authentication
///
/// Registration, login, and activation must be reachable by principals that
/// do not have a token yet; health and docs are open by convention.
const PUBLIC_PATHS: &[&str] = &[
    "/auth/register",
    "/auth/authenticate",
    "/auth/activate-account",
    "/health",
    "/docs",
];

fn is_public_path(path: &str) -> bool {
    PUBLIC_PATHS.iter().any(|public| path.starts_with(public))
}

/// Extract the token from a `Authorization: Bearer <token>` header
fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let auth_header = headers.get("authorization")?.to_str().ok()?;
    auth_header
        .strip_prefix("Bearer ")
        .map(|token| token.to_string())
}

/// Authentication interceptor middleware
///
/// State machine per request: `Unauthenticated -> {Authenticated |
/// Unauthenticated(passthrough)}`. Authentication is re-derived from the
/// token and a directory lookup on every request; no session state exists.
pub async fn authenticate_request(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    if is_public_path(request.uri().path()) {
        return next.run(request).await;
    }

    // Absent or malformed header: pass through unauthenticated
    let Some(token) = bearer_token(request.headers()) else {
        debug!("No bearer credential on {}", request.uri().path());
        return next.run(request).await;
    };

    // Unverifiable or expired token: pass through unauthenticated
    let subject = match state.tokens.verify_subject(&token) {
        Ok(subject) => subject,
        Err(e) => {
            debug!("Bearer token rejected: {}", e);
            return next.run(request).await;
        }
    };

    // Never overwrite a context already installed for this request
    if request.extensions().get::<SecurityContext>().is_none() {
        match state.user_service.find_by_email(&subject).await {
            Ok(Some(account)) => {
                if state.tokens.is_valid(&token, &account) {
                    request
                        .extensions_mut()
                        .insert(SecurityContext::for_account(&account));
                }
            }
            Ok(None) => {
                // Account vanished between token issuance and this request
                warn!("No account for authenticated subject '{}'", subject);
            }
            Err(e) => {
                warn!("Directory lookup failed during authentication: {}", e);
            }
        }
    }

    next.run(request).await
}
