//! Login, logout, and device removal workflows.

use std::sync::Arc;

use tracing::{info, warn};

use crate::auth::models::{LoginRequest, Profile, UserId};
use crate::auth::token::TokenSigner;
use crate::auth::{AuthError, AuthResult, verify_password};
use crate::db::UserRepository;
use crate::mail::MailDispatcher;
use crate::otp::OtpIssuer;
use crate::session::SessionStore;

/// Authentication manager
///
/// Owns the login gate: an account must exist, be verified, and hold a
/// password before credentials are even checked, and the single-device
/// session policy is enforced after they are.
#[derive(Clone)]
pub struct AuthManager {
    users: Arc<dyn UserRepository>,
    sessions: SessionStore,
    otp: OtpIssuer,
    tokens: TokenSigner,
    mail: Arc<dyn MailDispatcher>,
    pepper: String,
}

impl AuthManager {
    pub fn new(
        users: Arc<dyn UserRepository>,
        sessions: SessionStore,
        tokens: TokenSigner,
        mail: Arc<dyn MailDispatcher>,
        pepper: String,
    ) -> Self {
        Self {
            users,
            sessions,
            otp: OtpIssuer::new(),
            tokens,
            mail,
            pepper,
        }
    }

    /// Log a user in, producing a bearer token bound to a fresh session.
    ///
    /// Rejections are ordered: unknown account, then unverified, then
    /// passwordless, then wrong password, then an existing live session.
    /// The live-session rejection carries the holding device's metadata.
    pub async fn login(
        &self,
        request: &LoginRequest,
        user_agent: &str,
        ip: Option<&str>,
    ) -> AuthResult<String> {
        let user = self
            .users
            .find_by_email(&request.email)
            .await?
            .ok_or_else(|| AuthError::BadRequest("User not found".to_string()))?;

        if !user.is_verified {
            return Err(AuthError::BadRequest(
                "You are not verified! Please verify yourself".to_string(),
            ));
        }

        let Some(password_hash) = user.password.as_deref().filter(|_| user.has_password) else {
            return Err(AuthError::BadRequest(
                "You have not created your password. Please create first.".to_string(),
            ));
        };

        if !verify_password(&request.password, &self.pepper, password_hash) {
            warn!(user_id = user.id, "login rejected: wrong password");
            return Err(AuthError::Unauthorized("Wrong Password".to_string()));
        }

        if let Some(info) = self.sessions.is_logged_in(user.id).await? {
            return Err(AuthError::AlreadyLoggedIn(info));
        }

        let access_token = self.tokens.sign(user.id, &user.email)?;
        self.sessions
            .create_session(user.id, &access_token, user_agent, ip)
            .await?;

        info!(user_id = user.id, "user logged in");
        Ok(access_token)
    }

    /// Tear down the caller's session.
    pub async fn logout(&self, user_id: UserId) -> AuthResult<()> {
        self.sessions.remove_session(user_id).await?;
        info!(user_id, "user logged out");
        Ok(())
    }

    /// Sanitized profile of the given account.
    pub async fn profile(&self, user_id: UserId) -> AuthResult<Profile> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AuthError::NotFound("User Not Found".to_string()))?;
        Ok(Profile::from(user))
    }

    /// Every account, sanitized. Dev-only surface.
    pub async fn list_all(&self) -> AuthResult<Vec<Profile>> {
        let users = self.users.list().await?;
        Ok(users.into_iter().map(Profile::from).collect())
    }

    /// Issue a device-removal OTP for a session and mail it to the account.
    ///
    /// This route is reachable without a token: the caller is locked out of
    /// the very session they are trying to remove, so they identify it by
    /// the (session id, account id) pair the login rejection disclosed.
    pub async fn request_device_removal_otp(
        &self,
        session_id: i64,
        user_id: UserId,
    ) -> AuthResult<String> {
        let session = self.sessions.find_session(session_id, user_id).await?;
        let user = self
            .users
            .find_by_id(session.user_id)
            .await?
            .ok_or_else(|| AuthError::NotFound("User Not Found".to_string()))?;

        let issued = self.otp.issue()?;
        self.sessions
            .attach_otp_challenge(session.id, session.user_id, &issued.hash, issued.expires_at)
            .await?;

        self.mail.send_device_removal(&user.email, &issued.code).await?;

        info!(user_id, session_id, "device removal OTP issued");
        Ok("An OTP has been sent to your email for remove device request.".to_string())
    }

    /// Remove a session after its pending OTP challenge is answered.
    ///
    /// The hash check comes before the expiry check, so a wrong code is
    /// reported as wrong even when the challenge has also expired.
    pub async fn remove_device(
        &self,
        session_id: i64,
        user_id: UserId,
        otp: &str,
    ) -> AuthResult<String> {
        let session = self
            .sessions
            .find_session_with_otp(session_id, user_id)
            .await?;

        let stored_hash = session
            .otp
            .as_deref()
            .ok_or_else(|| AuthError::Internal("session OTP missing after lookup".to_string()))?;

        if !self.otp.verify(stored_hash, otp) {
            return Err(AuthError::BadRequest("Invalid OTP".to_string()));
        }

        let expired = session
            .otp_expires_at
            .is_none_or(|expires| chrono::Utc::now() > expires);
        if expired {
            return Err(AuthError::BadRequest("OTP expired".to_string()));
        }

        self.sessions.remove_session(session.user_id).await?;
        info!(user_id, session_id, "device removed");
        Ok("Device removed successfully.".to_string())
    }
}
