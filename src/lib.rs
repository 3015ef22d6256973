//! Bookhive Web Server
//!
//! This module provides the web API for Bookhive, a community book sharing
//! network. Its core is the authentication subsystem: registration with
//! email activation codes, credential login, and stateless bearer tokens.

pub mod auth;
pub mod email;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;

// Re-export main types
pub use server::BookhiveServer;
pub use state::AppState;

use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Create the main application router
pub fn create_app(state: AppState) -> Router {
    // Configure CORS for the Angular front end
    let cors = CorsLayer::new()
        .allow_origin("http://localhost:4200".parse::<HeaderValue>().unwrap())
        .allow_origin("http://127.0.0.1:4200".parse::<HeaderValue>().unwrap())
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_credentials(true)
        .allow_headers([AUTHORIZATION, ACCEPT, CONTENT_TYPE]);

    Router::new()
        // Authentication routes
        .nest("/auth", routes::auth_routes())
        // Health and other system routes
        .merge(routes::system_routes())
        // Authentication interceptor - resolves bearer tokens into a
        // per-request security context, never rejects by itself
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::authenticate_request,
        ))
        // Add middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(DefaultBodyLimit::max(64 * 1024)) // auth payloads are small
        .with_state(state)
}

/// Configuration for the web server
#[derive(Debug, Clone)]
pub struct WebConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Enable development mode
    pub dev_mode: bool,
    /// Database URL (optional)
    pub database_url: Option<String>,
    /// Secret used to sign and verify bearer tokens
    pub token_secret: String,
    /// Bearer token lifetime in seconds
    pub token_ttl_secs: i64,
    /// Activation code lifetime in seconds
    pub activation_ttl_secs: i64,
    /// Front-end URL embedded in activation emails
    pub activation_url: String,
    /// Mail relay endpoint (optional; logs emails when unset)
    pub mail_endpoint: Option<String>,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            dev_mode: false,
            database_url: None,
            token_secret: "bookhive-default-secret-change-in-production".to_string(),
            token_ttl_secs: 3600,
            activation_ttl_secs: 600,
            activation_url: "http://localhost:4200/activate-account".to_string(),
            mail_endpoint: None,
        }
    }
}

impl WebConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("BOOKHIVE_HOST").unwrap_or(defaults.host),
            port: std::env::var("BOOKHIVE_PORT")
                .ok()
                .and_then(|port| port.parse().ok())
                .unwrap_or(defaults.port),
            dev_mode: std::env::var("BOOKHIVE_DEV_MODE")
                .ok()
                .and_then(|flag| flag.parse().ok())
                .unwrap_or(false),
            database_url: std::env::var("DATABASE_URL").ok(),
            token_secret: std::env::var("BOOKHIVE_TOKEN_SECRET").unwrap_or(defaults.token_secret),
            token_ttl_secs: std::env::var("BOOKHIVE_TOKEN_TTL_SECS")
                .ok()
                .and_then(|ttl| ttl.parse().ok())
                .unwrap_or(defaults.token_ttl_secs),
            activation_ttl_secs: std::env::var("BOOKHIVE_ACTIVATION_TTL_SECS")
                .ok()
                .and_then(|ttl| ttl.parse().ok())
                .unwrap_or(defaults.activation_ttl_secs),
            activation_url: std::env::var("BOOKHIVE_ACTIVATION_URL").unwrap_or(defaults.activation_url),
            mail_endpoint: std::env::var("BOOKHIVE_MAIL_ENDPOINT").ok(),
        }
    }

    /// Get the server address
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Error types for the web server
#[derive(thiserror::Error, Debug)]
pub enum WebError {
    #[error("Server error: {0}")]
    Server(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for web operations
pub type WebResult<T> = Result<T, WebError>;

/// Initialize logging for the web server
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bookhive_web=debug,tower_http=debug,axum=debug".into()),
        )
        .init();
}
