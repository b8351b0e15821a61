//! Signed credential issuance and verification.
//!
//! The credential is a stateless HS256 JWT whose subject is the account
//! id+email pair. Its lifetime matches the 24-hour session window, but the
//! token is self-verifying: deleting the session row does not invalidate an
//! in-flight token before its natural expiry.

use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind};

use super::errors::{AuthError, AuthResult};
use super::models::{Claims, UserId};

/// Credential lifetime, aligned with the session expiry window.
pub const TOKEN_TTL_HOURS: i64 = 24;

/// Signs and verifies the credentials issued at login.
#[derive(Clone)]
pub struct TokenSigner {
    secret: String,
    ttl: Duration,
}

impl TokenSigner {
    pub fn new(secret: String) -> Self {
        Self {
            secret,
            ttl: Duration::hours(TOKEN_TTL_HOURS),
        }
    }

    /// Sign a credential asserting the given account identity.
    pub fn sign(&self, user_id: UserId, email: &str) -> AuthResult<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id,
            email: email.to_string(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|_| AuthError::TokenInvalid)
    }

    /// Verify signature and expiry, returning the decoded claims.
    ///
    /// Distinguishes [`AuthError::TokenExpired`] from
    /// [`AuthError::TokenInvalid`] for diagnostics; both terminate the
    /// caller's authentication attempt.
    pub fn verify(&self, token: &str) -> AuthResult<Claims> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map(|data| data.claims)
        .map_err(|err| match err.kind() {
            ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::TokenInvalid,
        })
    }
}
