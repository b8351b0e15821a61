//! # Chit Chat
//!
//! Backend engine for a one-to-one chat service with a strict
//! single-device session policy.
//!
//! An account walks a fixed lifecycle before it can chat: register with an
//! email, verify it with a mailed one-time passcode, create a password, then
//! log in. Login mints a JWT bound to a database-backed session, and the
//! unique constraint on the session table guarantees at most one live device
//! per account. A second device can evict the first by answering a
//! device-removal OTP sent to the account's inbox.
//!
//! ## Core Modules
//!
//! - [`auth`]: login, registration, reset, and device-removal workflows
//! - [`otp`]: one-time passcode issuance and verification
//! - [`session`]: single-device session lifecycle
//! - [`presence`]: in-process index of connected chat clients
//! - [`chat`]: direct message model
//! - [`mail`]: outbound OTP email delivery
//! - [`db`]: PostgreSQL pool, migrations, and repositories
//!
//! ## Example
//!
//! ```no_run
//! use chitchat::db::{Database, DatabaseConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), sqlx::Error> {
//!     let db = Database::new(&DatabaseConfig::default()).await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub use auth::{
    AuthError, AuthManager, AuthResult, RegistrationManager, ResetManager, TokenSigner,
};

pub mod chat;
pub mod db;
pub mod mail;
pub mod otp;
pub mod presence;
pub mod session;
pub mod validation;

pub use presence::PresenceIndex;
pub use session::SessionStore;
