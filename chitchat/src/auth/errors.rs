//! Authentication error taxonomy.

use std::time::Duration;

use thiserror::Error;

use super::models::SessionInfo;

/// Authentication and workflow errors.
///
/// Variants map one-to-one onto the HTTP categories the server exposes:
/// `NotFound` → 404, `Conflict`/`AlreadyLoggedIn` → 409, `BadRequest` → 400,
/// `Unauthorized`/token errors → 401, `Forbidden` → 403, everything else 500.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Password or OTP hashing failed
    #[error("Password hashing failed")]
    HashingFailed,

    /// Entity absent
    #[error("{0}")]
    NotFound(String),

    /// Uniqueness violation, carrying the violated field list
    #[error("{0} already exists.")]
    Conflict(String),

    /// Validation failure, expired/incorrect OTP, or policy violation
    #[error("{0}")]
    BadRequest(String),

    /// Bad credential, or route not applicable given current account state
    #[error("{0}")]
    Unauthorized(String),

    /// OTP verification failure during the reset flow
    #[error("{0}")]
    Forbidden(String),

    /// A live session already exists for this account; carries device hints
    /// so the caller can offer a device-removal path.
    #[error("Already logged in into another device.")]
    AlreadyLoggedIn(SessionInfo),

    /// Signed credential past its expiry
    #[error("Token expired")]
    TokenExpired,

    /// Signed credential failed cryptographic verification
    #[error("Invalid token")]
    TokenInvalid,

    /// Outbound mail could not be delivered
    #[error("Mail delivery failed: {0}")]
    Mail(String),

    /// A downstream call exceeded its deadline
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Downstream dependency failure
    #[error("{0}")]
    Internal(String),
}

impl AuthError {
    /// Get a client-safe error message that doesn't leak sensitive information
    ///
    /// Database, mail, and timeout errors are sanitized to prevent disclosure
    /// of internal system structure.
    pub fn client_message(&self) -> String {
        match self {
            AuthError::Database(_)
            | AuthError::HashingFailed
            | AuthError::Mail(_)
            | AuthError::Timeout(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

/// Result type for authentication operations
pub type AuthResult<T> = Result<T, AuthError>;
