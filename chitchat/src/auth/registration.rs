//! Registration and email verification workflows.
//!
//! An account moves through three gates before it can log in: registration
//! stores the email with a pending OTP challenge, verification consumes the
//! OTP, and create-password sets the credential. Each gate refuses to run
//! twice, so a verified account cannot re-verify and a credentialed account
//! cannot overwrite its password through this flow.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::auth::models::{NewUser, RegisterRequest, UpdateProfileRequest, UserId};
use crate::auth::{AuthError, AuthResult, hash_password};
use crate::db::UserRepository;
use crate::mail::MailDispatcher;
use crate::otp::{OTP_RESEND_INTERVAL_SECS, OtpIssuer, is_argon2_hash};

#[derive(Clone)]
pub struct RegistrationManager {
    users: Arc<dyn UserRepository>,
    otp: OtpIssuer,
    mail: Arc<dyn MailDispatcher>,
    pepper: String,
}

impl RegistrationManager {
    pub fn new(users: Arc<dyn UserRepository>, mail: Arc<dyn MailDispatcher>, pepper: String) -> Self {
        Self {
            users,
            otp: OtpIssuer::new(),
            mail,
            pepper,
        }
    }

    /// Create an unverified account and mail it a verification OTP.
    pub async fn register(&self, request: &RegisterRequest) -> AuthResult<String> {
        let issued = self.otp.issue()?;

        let user = self
            .users
            .create(&NewUser {
                email: request.email.clone(),
                name: request.name.clone(),
                role: request.role,
                otp_hash: issued.hash.clone(),
                otp_expires_at: issued.expires_at,
                last_otp_requested_at: Utc::now(),
            })
            .await?;

        self.mail.send_verification(&user.email, &issued.code).await?;

        info!(user_id = user.id, "account registered, verification OTP sent");
        Ok("User created! Otp has been sent to your email".to_string())
    }

    /// Consume the verification OTP and mark the account verified.
    ///
    /// A stored OTP that is not a parseable hash means the challenge was
    /// already consumed or never issued; the caller is told to request a
    /// fresh one. A wrong code is reported before expiry is considered.
    pub async fn verify_email(&self, email: &str, otp: &str) -> AuthResult<String> {
        let user = self
            .users
            .find_by_email(email)
            .await?
            .ok_or_else(|| AuthError::NotFound("User not found".to_string()))?;

        let stored = user.otp.as_deref().filter(|h| is_argon2_hash(h));
        let Some(stored_hash) = stored else {
            return Err(AuthError::Internal(
                "Something went wrong. Please Request a new OTP.".to_string(),
            ));
        };

        if !self.otp.verify(stored_hash, otp) {
            return Err(AuthError::BadRequest("Wrong OTP".to_string()));
        }

        // A valid code whose expiry was somehow cleared is treated as wrong
        // rather than accepted open ended.
        let Some(expires_at) = user.otp_expires_at else {
            return Err(AuthError::BadRequest("Wrong OTP".to_string()));
        };
        if Utc::now() > expires_at {
            return Err(AuthError::BadRequest("OTP expired".to_string()));
        }

        self.users.mark_verified(email).await?;
        info!(user_id = user.id, "email verified");
        Ok("User Verified! Please create password now.".to_string())
    }

    /// Re-issue the verification OTP, rate limited to one per minute.
    pub async fn resend_otp(&self, email: &str) -> AuthResult<String> {
        let user = self
            .users
            .find_by_email(email)
            .await?
            .ok_or_else(|| AuthError::NotFound("User not found".to_string()))?;

        if user.is_verified {
            return Err(AuthError::Unauthorized(
                "Not allowed to access this route.".to_string(),
            ));
        }

        if let Some(last) = user.last_otp_requested_at {
            let next_allowed = last + chrono::Duration::seconds(OTP_RESEND_INTERVAL_SECS);
            if Utc::now() < next_allowed {
                return Err(AuthError::BadRequest(
                    "Please wait at least 1 minute before requesting a new OTP.".to_string(),
                ));
            }
        }

        let issued = self.otp.issue()?;
        self.users
            .set_otp(email, &issued.hash, issued.expires_at, Utc::now())
            .await?;
        self.mail.send_verification(email, &issued.code).await?;

        info!(user_id = user.id, "verification OTP re-issued");
        Ok("OTP sent. Check your inbox.".to_string())
    }

    /// Set the initial password for a verified, still passwordless account.
    pub async fn create_password(&self, email: &str, password: &str) -> AuthResult<String> {
        let user = self
            .users
            .find_by_email(email)
            .await?
            .ok_or_else(|| AuthError::NotFound("User not found. Please Register.".to_string()))?;

        if user.password.as_deref().is_some_and(is_argon2_hash) {
            return Err(AuthError::Unauthorized(
                "Not allowed to access this route.".to_string(),
            ));
        }

        let hash = hash_password(password, &self.pepper)?;
        self.users.set_password(user.id, &hash).await?;

        info!(user_id = user.id, "password created");
        Ok("Password created! You can login now.".to_string())
    }

    /// Fill in the enrichment profile fields for a logged-in account.
    pub async fn update_profile(
        &self,
        user_id: UserId,
        request: &UpdateProfileRequest,
    ) -> AuthResult<String> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AuthError::NotFound("User not found. Please register".to_string()))?;

        self.users
            .update_profile(
                user.id,
                request.gender.as_deref(),
                request.university.as_deref(),
                request.date_of_birth,
            )
            .await?;

        info!(user_id = user.id, "profile updated");
        Ok("User updated.".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::models::Role;
    use crate::db::repository::mock::MockUserRepository;
    use crate::mail::mock::MockMail;
    use chrono::Duration;

    struct Harness {
        manager: RegistrationManager,
        users: Arc<MockUserRepository>,
        mail: Arc<MockMail>,
    }

    fn harness() -> Harness {
        let users = Arc::new(MockUserRepository::new());
        let mail = Arc::new(MockMail::new());
        let manager =
            RegistrationManager::new(users.clone(), mail.clone(), "test-pepper".to_string());
        Harness {
            manager,
            users,
            mail,
        }
    }

    fn request(email: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.to_string(),
            name: "Test User".to_string(),
            role: Role::Student,
        }
    }

    #[tokio::test]
    async fn register_stores_hash_not_plaintext() {
        let h = harness();
        h.manager.register(&request("a@x.com")).await.unwrap();

        let user = h.users.find_by_email("a@x.com").await.unwrap().unwrap();
        let code = h.mail.last_otp_for("a@x.com").unwrap();
        let stored = user.otp.unwrap();
        assert_ne!(stored, code);
        assert!(is_argon2_hash(&stored));
        assert!(!user.is_verified);
    }

    #[tokio::test]
    async fn register_duplicate_email_conflicts() {
        let h = harness();
        h.manager.register(&request("a@x.com")).await.unwrap();
        let err = h.manager.register(&request("a@x.com")).await.unwrap_err();
        assert!(matches!(err, AuthError::Conflict(_)));
    }

    #[tokio::test]
    async fn verify_email_happy_path_consumes_otp() {
        let h = harness();
        h.manager.register(&request("a@x.com")).await.unwrap();
        let code = h.mail.last_otp_for("a@x.com").unwrap();

        let message = h.manager.verify_email("a@x.com", &code).await.unwrap();
        assert_eq!(message, "User Verified! Please create password now.");

        let user = h.users.find_by_email("a@x.com").await.unwrap().unwrap();
        assert!(user.is_verified);
        assert!(user.otp.is_none());

        // Challenge is gone, so replaying the same code now reports a
        // consumed challenge.
        let err = h.manager.verify_email("a@x.com", &code).await.unwrap_err();
        assert!(matches!(err, AuthError::Internal(_)));
    }

    #[tokio::test]
    async fn verify_email_wrong_code() {
        let h = harness();
        h.manager.register(&request("a@x.com")).await.unwrap();
        let err = h
            .manager
            .verify_email("a@x.com", "000000")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::BadRequest(msg) if msg == "Wrong OTP"));
    }

    #[tokio::test]
    async fn verify_email_wrong_code_beats_expiry() {
        let h = harness();
        let user = {
            h.manager.register(&request("a@x.com")).await.unwrap();
            h.users.find_by_email("a@x.com").await.unwrap().unwrap()
        };
        h.users.with_user_mut(user.id, |u| {
            u.otp_expires_at = Some(Utc::now() - Duration::minutes(1));
        });

        let err = h
            .manager
            .verify_email("a@x.com", "000000")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::BadRequest(msg) if msg == "Wrong OTP"));
    }

    #[tokio::test]
    async fn verify_email_expired_code() {
        let h = harness();
        h.manager.register(&request("a@x.com")).await.unwrap();
        let code = h.mail.last_otp_for("a@x.com").unwrap();
        let user = h.users.find_by_email("a@x.com").await.unwrap().unwrap();
        h.users.with_user_mut(user.id, |u| {
            u.otp_expires_at = Some(Utc::now() - Duration::minutes(1));
        });

        let err = h.manager.verify_email("a@x.com", &code).await.unwrap_err();
        assert!(matches!(err, AuthError::BadRequest(msg) if msg == "OTP expired"));
    }

    #[tokio::test]
    async fn resend_otp_enforces_one_minute_window() {
        let h = harness();
        h.manager.register(&request("a@x.com")).await.unwrap();

        let err = h.manager.resend_otp("a@x.com").await.unwrap_err();
        assert!(matches!(err, AuthError::BadRequest(msg) if msg.contains("1 minute")));

        // Age the last request past the window and a resend goes through,
        // invalidating the first code.
        let user = h.users.find_by_email("a@x.com").await.unwrap().unwrap();
        let first_code = h.mail.last_otp_for("a@x.com").unwrap();
        h.users.with_user_mut(user.id, |u| {
            u.last_otp_requested_at = Some(Utc::now() - Duration::seconds(61));
        });
        h.manager.resend_otp("a@x.com").await.unwrap();
        let second_code = h.mail.last_otp_for("a@x.com").unwrap();

        if first_code != second_code {
            let err = h
                .manager
                .verify_email("a@x.com", &first_code)
                .await
                .unwrap_err();
            assert!(matches!(err, AuthError::BadRequest(msg) if msg == "Wrong OTP"));
        }
        h.manager.verify_email("a@x.com", &second_code).await.unwrap();
    }

    #[tokio::test]
    async fn resend_otp_refused_for_verified_account() {
        let h = harness();
        h.manager.register(&request("a@x.com")).await.unwrap();
        h.users.mark_verified("a@x.com").await.unwrap();

        let err = h.manager.resend_otp("a@x.com").await.unwrap_err();
        assert!(matches!(err, AuthError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn create_password_only_once() {
        let h = harness();
        h.manager.register(&request("a@x.com")).await.unwrap();
        let code = h.mail.last_otp_for("a@x.com").unwrap();
        h.manager.verify_email("a@x.com", &code).await.unwrap();

        h.manager
            .create_password("a@x.com", "Sup3r$ecret")
            .await
            .unwrap();
        let user = h.users.find_by_email("a@x.com").await.unwrap().unwrap();
        assert!(user.has_password);
        assert!(is_argon2_hash(user.password.as_deref().unwrap()));

        let err = h
            .manager
            .create_password("a@x.com", "An0ther$ecret")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn create_password_requires_registration() {
        let h = harness();
        let err = h
            .manager
            .create_password("ghost@x.com", "Sup3r$ecret")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::NotFound(_)));
    }

    #[tokio::test]
    async fn full_onboarding_ends_in_a_live_session() {
        use crate::auth::manager::AuthManager;
        use crate::auth::models::LoginRequest;
        use crate::auth::token::TokenSigner;
        use crate::db::repository::mock::MockSessionRepository;
        use crate::session::SessionStore;

        let h = harness();
        let sessions = Arc::new(MockSessionRepository::new());
        let tokens = TokenSigner::new("a-unit-test-secret-of-sufficient-length".to_string());
        let auth = AuthManager::new(
            h.users.clone(),
            SessionStore::new(sessions.clone()),
            tokens.clone(),
            h.mail.clone(),
            "test-pepper".to_string(),
        );

        // Register, verify with the mailed code, set the first password.
        h.manager.register(&request("ann@x.com")).await.unwrap();
        let code = h.mail.last_otp_for("ann@x.com").unwrap();
        h.manager.verify_email("ann@x.com", &code).await.unwrap();
        h.manager
            .create_password("ann@x.com", "Sup3r$ecret")
            .await
            .unwrap();

        // The freshly onboarded account can log straight in.
        let token = auth
            .login(
                &LoginRequest {
                    email: "ann@x.com".to_string(),
                    password: "Sup3r$ecret".to_string(),
                },
                "Firefox",
                None,
            )
            .await
            .unwrap();

        let claims = tokens.verify(&token).unwrap();
        assert_eq!(claims.email, "ann@x.com");
        let session = sessions.get(claims.sub).unwrap();
        assert_eq!(session.jwt, token);
    }

    #[tokio::test]
    async fn update_profile_sets_enrichment_fields() {
        let h = harness();
        h.manager.register(&request("a@x.com")).await.unwrap();
        let user = h.users.find_by_email("a@x.com").await.unwrap().unwrap();

        h.manager
            .update_profile(
                user.id,
                &UpdateProfileRequest {
                    gender: Some("female".to_string()),
                    university: Some("MIT".to_string()),
                    date_of_birth: chrono::NaiveDate::from_ymd_opt(2000, 1, 15),
                },
            )
            .await
            .unwrap();

        let user = h.users.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(user.university.as_deref(), Some("MIT"));
        assert_eq!(user.gender.as_deref(), Some("female"));
    }
}
