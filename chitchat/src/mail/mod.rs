//! Outbound email delivery for OTP challenges.
//!
//! Templates are embedded at compile time and carry a single `{{OTP}}`
//! placeholder. Delivery goes through SMTP over TLS and is wrapped in a
//! timeout so a slow relay cannot stall an auth workflow.

use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::header::ContentType,
    transport::smtp::authentication::Credentials,
};

use crate::auth::{AuthError, AuthResult};
use crate::db::timeouts::MAIL_TIMEOUT;

const VERIFY_EMAIL_TEMPLATE: &str = include_str!("templates/verify_email.html");
const MULTIPURPOSE_OTP_TEMPLATE: &str = include_str!("templates/multipurpose_otp.html");

/// Trait for OTP mail delivery. Returns a delivery identifier on success.
#[async_trait]
pub trait MailDispatcher: Send + Sync {
    /// Email verification OTP for a new registration.
    async fn send_verification(&self, to: &str, otp: &str) -> AuthResult<String>;

    /// Password reset OTP.
    async fn send_password_reset(&self, to: &str, otp: &str) -> AuthResult<String>;

    /// Device removal OTP.
    async fn send_device_removal(&self, to: &str, otp: &str) -> AuthResult<String>;
}

/// SMTP relay configuration
#[derive(Debug, Clone)]
pub struct MailConfig {
    /// SMTP server hostname
    pub host: String,
    /// SMTP server port
    pub port: u16,
    /// SMTP username
    pub username: String,
    /// SMTP password
    pub password: String,
    /// From address, display name included
    pub from: String,
}

/// SMTP implementation of [`MailDispatcher`]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl SmtpMailer {
    pub fn new(config: &MailConfig) -> AuthResult<Self> {
        let creds = Credentials::new(config.username.clone(), config.password.clone());
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
            .map_err(|e| AuthError::Mail(format!("failed to configure SMTP relay: {e}")))?
            .port(config.port)
            .credentials(creds)
            .build();

        Ok(Self {
            transport,
            from: config.from.clone(),
        })
    }

    async fn send(&self, to: &str, subject: &str, html: String) -> AuthResult<String> {
        let email = Message::builder()
            .from(
                self.from
                    .parse()
                    .map_err(|e| AuthError::Mail(format!("invalid from address: {e}")))?,
            )
            .to(to
                .parse()
                .map_err(|e| AuthError::Mail(format!("invalid recipient address: {e}")))?)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html)
            .map_err(|e| AuthError::Mail(format!("failed to build message: {e}")))?;

        let response = tokio::time::timeout(MAIL_TIMEOUT, self.transport.send(email))
            .await
            .map_err(|_| AuthError::Timeout(MAIL_TIMEOUT))?
            .map_err(|e| AuthError::Mail(e.to_string()))?;

        Ok(format!("{:?}", response.code()))
    }
}

#[async_trait]
impl MailDispatcher for SmtpMailer {
    async fn send_verification(&self, to: &str, otp: &str) -> AuthResult<String> {
        let html = VERIFY_EMAIL_TEMPLATE.replace("{{OTP}}", otp);
        self.send(to, "Email Verification - Chit Chat", html).await
    }

    async fn send_password_reset(&self, to: &str, otp: &str) -> AuthResult<String> {
        let html = MULTIPURPOSE_OTP_TEMPLATE.replace("{{OTP}}", otp);
        self.send(to, "Password Reset - Chit Chat", html).await
    }

    async fn send_device_removal(&self, to: &str, otp: &str) -> AuthResult<String> {
        let html = MULTIPURPOSE_OTP_TEMPLATE.replace("{{OTP}}", otp);
        self.send(to, "Remove Device Request - Chit Chat", html).await
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn templates_carry_the_placeholder() {
        assert!(VERIFY_EMAIL_TEMPLATE.contains("{{OTP}}"));
        assert!(MULTIPURPOSE_OTP_TEMPLATE.contains("{{OTP}}"));
    }

    #[test]
    fn placeholder_substitution_leaves_no_trace() {
        let html = VERIFY_EMAIL_TEMPLATE.replace("{{OTP}}", "123456");
        assert!(html.contains("123456"));
        assert!(!html.contains("{{OTP}}"));
    }
}
