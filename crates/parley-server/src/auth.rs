//! Caller identity resolution.
//!
//! The auth provider issues HS256 session tokens; we verify the signature
//! against the shared session secret and take the `sub` claim as the
//! owner key. Everything else about the provider's protocol stays on its
//! side of the boundary.

use std::time::Duration;

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use parley_core::errors::ChatError;

use crate::error::ApiError;
use crate::server::AppState;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: usize,
}

/// Keys for session token verification (and issuance, for tests and
/// local tooling — production tokens come from the auth provider).
pub struct SessionKeys {
    decoding: DecodingKey,
    encoding: EncodingKey,
    validation: Validation,
}

impl SessionKeys {
    pub fn new(secret: &SecretString) -> Self {
        let bytes = secret.expose_secret().as_bytes();
        Self {
            decoding: DecodingKey::from_secret(bytes),
            encoding: EncodingKey::from_secret(bytes),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// Verify a bearer token and return the owner key it names.
    pub fn verify(&self, token: &str) -> Result<String, ChatError> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|e| ChatError::Unauthenticated(format!("invalid session token: {e}")))?;

        let sub = data.claims.sub.trim();
        if sub.is_empty() {
            return Err(ChatError::Unauthenticated("session token names no subject".into()));
        }
        Ok(sub.to_string())
    }

    /// Issue a token for the given subject.
    pub fn issue(&self, sub: &str, ttl: Duration) -> String {
        let exp = (chrono::Utc::now().timestamp() as u64 + ttl.as_secs()) as usize;
        let claims = Claims {
            sub: sub.to_string(),
            exp,
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .expect("HS256 signing cannot fail with an in-memory key")
    }
}

/// The resolved caller. Extraction fails with `Unauthenticated` before
/// any handler logic runs.
pub struct AuthedUser {
    pub owner: String,
}

impl FromRequestParts<AppState> for AuthedUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                ApiError::from(ChatError::Unauthenticated("missing bearer token".into()))
            })?;

        let token = header.strip_prefix("Bearer ").ok_or_else(|| {
            ApiError::from(ChatError::Unauthenticated("malformed authorization header".into()))
        })?;

        let owner = state.session_keys.verify(token)?;
        Ok(AuthedUser { owner })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> SessionKeys {
        SessionKeys::new(&SecretString::from("test-session-secret"))
    }

    #[test]
    fn issue_then_verify_roundtrip() {
        let keys = keys();
        let token = keys.issue("sub_42", Duration::from_secs(60));
        assert_eq!(keys.verify(&token).unwrap(), "sub_42");
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = keys().issue("sub_42", Duration::from_secs(60));
        let other = SessionKeys::new(&SecretString::from("different-secret"));
        let err = other.verify(&token).unwrap_err();
        assert_eq!(err.error_kind(), "unauthenticated");
    }

    #[test]
    fn garbage_token_is_rejected() {
        assert!(keys().verify("not.a.jwt").is_err());
        assert!(keys().verify("").is_err());
    }

    #[test]
    fn blank_subject_is_rejected() {
        let keys = keys();
        let token = keys.issue("   ", Duration::from_secs(60));
        assert!(keys.verify(&token).is_err());
    }
}
