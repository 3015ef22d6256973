//! Signed bearer token issuance and verification
//!
//! Tokens are self-contained: validity is decided by signature and expiry
//! alone, never by a server-side lookup.

use super::users::Identity;
use super::AuthError;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Claims payload embedded in every token
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (the principal name, i.e. the account email)
    pub sub: String,
    /// Issued at (timestamp)
    pub iat: i64,
    /// Expiration time (timestamp)
    pub exp: i64,
    /// Arbitrary extra claims (display name etc.)
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl Claims {
    fn new(subject: String, extra: HashMap<String, Value>, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            sub: subject,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            extra,
        }
    }

    /// Check if the token is expired
    ///
    /// The decoder already validates `exp`, but with a leeway window; this
    /// check enforces the exact expiry instant.
    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() > self.exp
    }
}

/// Token signing and verification service
///
/// Constructed once at startup from the process-wide configuration and
/// shared read-only through the application state.
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenService {
    /// Create a token service from a symmetric secret and a lifetime
    pub fn new(secret: &[u8], ttl_secs: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl: Duration::seconds(ttl_secs),
        }
    }

    /// Issue a signed, expiring token bound to the subject's identity
    pub fn issue(
        &self,
        extra_claims: HashMap<String, Value>,
        subject: &impl Identity,
    ) -> Result<String, AuthError> {
        let claims = Claims::new(subject.name().to_string(), extra_claims, self.ttl);
        encode(&Header::default(), &claims, &self.encoding).map_err(|e| {
            warn!("Failed to encode token: {}", e);
            AuthError::TokenCreation
        })
    }

    /// Verify a token and return its claims
    pub fn decode(&self, token: &str) -> Result<Claims, AuthError> {
        let token_data =
            decode::<Claims>(token, &self.decoding, &Validation::default()).map_err(|e| {
                debug!("Token verification failed: {}", e);
                match e.kind() {
                    jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                    _ => AuthError::InvalidToken,
                }
            })?;

        let claims = token_data.claims;

        if claims.is_expired() {
            return Err(AuthError::TokenExpired);
        }

        Ok(claims)
    }

    /// Verify a token and recover the subject identity it claims
    pub fn verify_subject(&self, token: &str) -> Result<String, AuthError> {
        Ok(self.decode(token)?.sub)
    }

    /// Check that an unexpired token is bound to the given candidate
    ///
    /// Used by the interceptor to tie a token to a freshly resolved account.
    pub fn is_valid(&self, token: &str, candidate: &impl Identity) -> bool {
        match self.decode(token) {
            Ok(claims) => claims.sub == candidate.name(),
            Err(_) => false,
        }
    }
}
