//! Authentication module providing login, registration, and password reset.
//!
//! This module implements secure authentication with:
//! - Argon2id password hashing with server-side pepper
//! - JWT bearer tokens bound to a single device session (24-hour expiry)
//! - Email OTP challenges for verification, reset, and device removal
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use chitchat::auth::{AuthManager, LoginRequest, TokenSigner};
//! use chitchat::db::{Database, PgSessionRepository, PgUserRepository};
//! use chitchat::session::SessionStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::new(&Default::default()).await?;
//!     let users = Arc::new(PgUserRepository::new(db.pool().clone()));
//!     let sessions = SessionStore::new(Arc::new(PgSessionRepository::new(db.pool().clone())));
//!     let tokens = TokenSigner::new("jwt_secret".to_string());
//!     # Ok(())
//! }
//! ```

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

pub mod errors;
pub mod manager;
pub mod models;
pub mod registration;
pub mod reset;
pub mod token;

pub use errors::{AuthError, AuthResult};
pub use manager::AuthManager;
pub use models::{
    Claims, LoginRequest, NewUser, Profile, RegisterRequest, Role, Session, SessionInfo,
    UpdateProfileRequest, User, UserId,
};
pub use registration::RegistrationManager;
pub use reset::{ResetManager, ResetOtpReceipt};
pub use token::TokenSigner;

/// Hash a password with Argon2id and a server-side pepper.
pub(crate) fn hash_password(password: &str, pepper: &str) -> AuthResult<String> {
    let peppered = format!("{password}{pepper}");
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    Ok(argon2
        .hash_password(peppered.as_bytes(), &salt)
        .map_err(|_| AuthError::HashingFailed)?
        .to_string())
}

/// Verify a password against a stored Argon2 hash. Fails closed when the
/// stored value is not a parseable hash.
pub(crate) fn verify_password(password: &str, pepper: &str, hash: &str) -> bool {
    let peppered = format!("{password}{pepper}");
    let Ok(parsed_hash) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(peppered.as_bytes(), &parsed_hash)
        .is_ok()
}
