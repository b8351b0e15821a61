//! Password reset workflow.
//!
//! Requesting a reset OTP answers with the same message whether or not the
//! address is on file, so the route cannot reveal which accounts exist.
//! Verification failures use Forbidden rather than BadRequest, and the
//! set-password step re-runs the exact same verification.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::auth::{AuthError, AuthResult, hash_password};
use crate::db::UserRepository;
use crate::mail::MailDispatcher;
use crate::otp::{OTP_RESEND_INTERVAL_SECS, OtpIssuer};

const UNIFORM_RESET_MESSAGE: &str = "A OTP has been sent if we found your email on our database.";

/// Outcome of a reset OTP request. The message is identical whether or not
/// the address was on file; `issued` is server-side accounting only and
/// must never reach the response body.
#[derive(Debug)]
pub struct ResetOtpReceipt {
    pub message: String,
    pub issued: bool,
}

#[derive(Clone)]
pub struct ResetManager {
    users: Arc<dyn UserRepository>,
    otp: OtpIssuer,
    mail: Arc<dyn MailDispatcher>,
    pepper: String,
}

impl ResetManager {
    pub fn new(users: Arc<dyn UserRepository>, mail: Arc<dyn MailDispatcher>, pepper: String) -> Self {
        Self {
            users,
            otp: OtpIssuer::new(),
            mail,
            pepper,
        }
    }

    /// Issue a reset OTP. Unknown addresses get the uniform success message
    /// without any side effect; known addresses are rate limited to one
    /// issuance per minute.
    pub async fn request_reset_otp(&self, email: &str) -> AuthResult<ResetOtpReceipt> {
        let user = self.users.find_by_email(email).await?;
        let mut sent = false;

        if let Some(user) = user {
            if let Some(last) = user.last_otp_requested_at {
                let next_allowed = last + chrono::Duration::seconds(OTP_RESEND_INTERVAL_SECS);
                if Utc::now() < next_allowed {
                    return Err(AuthError::BadRequest(
                        "Please wait 1 minute before sending a new otp request.".to_string(),
                    ));
                }
            }

            let issued = self.otp.issue()?;
            self.users
                .set_otp(email, &issued.hash, issued.expires_at, Utc::now())
                .await?;
            self.mail.send_password_reset(&user.email, &issued.code).await?;
            info!(user_id = user.id, "reset OTP issued");
            sent = true;
        }

        Ok(ResetOtpReceipt {
            message: UNIFORM_RESET_MESSAGE.to_string(),
            issued: sent,
        })
    }

    /// Check a reset OTP without consuming it. A wrong code is reported
    /// before expiry is considered; both are Forbidden.
    pub async fn verify_reset_otp(&self, email: &str, otp: &str) -> AuthResult<String> {
        let user = self
            .users
            .find_by_email(email)
            .await?
            .ok_or_else(|| AuthError::NotFound("User not found".to_string()))?;

        // A missing challenge fails the hash check, so it reads as wrong.
        let valid = user
            .otp
            .as_deref()
            .is_some_and(|hash| self.otp.verify(hash, otp));
        if !valid {
            return Err(AuthError::Forbidden("Wrong OTP".to_string()));
        }

        let expired = user
            .otp_expires_at
            .is_none_or(|expires| Utc::now() > expires);
        if expired {
            return Err(AuthError::Forbidden("OTP Expired".to_string()));
        }

        Ok("Valid".to_string())
    }

    /// Replace the password after re-verifying the OTP, clearing the
    /// challenge in the same update. `has_password` is untouched: this flow
    /// only serves accounts that already completed create-password.
    pub async fn reset_password(&self, email: &str, otp: &str, password: &str) -> AuthResult<String> {
        self.verify_reset_otp(email, otp).await?;

        let hash = hash_password(password, &self.pepper)?;
        self.users.reset_password(email, &hash).await?;

        info!(email, "password reset");
        Ok("Password Updated. Please login.".to_string())
    }
}
