//! Route definitions for the Bookhive web server

use crate::{auth::handlers, AppState};
use axum::{
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Serialize;

/// Authentication routes, mounted under `/auth`
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(handlers::register_account))
        .route("/authenticate", post(handlers::authenticate))
        .route("/activate-account", get(handlers::activate_account))
        .route("/me", get(handlers::current_account))
}

/// System routes (health checks etc.)
pub fn system_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub version: String,
}

/// Health check endpoint
pub async fn health_check() -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AppState, WebConfig};
    use axum::http::StatusCode;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_health_check_route() {
        let state = AppState::new(WebConfig::default()).await.unwrap();
        let app = system_routes().with_state(state);

        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/health")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }
}
