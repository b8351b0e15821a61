//! One-time passcode issuance and verification.
//!
//! Codes are 6-digit numeric strings, stored only as Argon2 hashes with a
//! fixed 5-minute expiry window. Verification is fail-closed: any hashing
//! or parse error reports the code as invalid. Expiry is deliberately NOT
//! checked here — callers compare [`IssuedOtp::expires_at`] against the
//! wall clock at verification time, so they control the error ordering
//! (hash match before expiry).

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;

use crate::auth::{AuthError, AuthResult};

/// Validity window for a freshly issued code.
pub const OTP_TTL_MINUTES: i64 = 5;

/// Minimum interval between two issuances for the same target.
pub const OTP_RESEND_INTERVAL_SECS: i64 = 60;

/// A freshly issued one-time passcode.
///
/// `code` is the human-presentable plaintext, handed to the mail dispatcher
/// and then dropped; only `hash` is ever persisted.
#[derive(Debug, Clone)]
pub struct IssuedOtp {
    pub code: String,
    pub hash: String,
    pub expires_at: DateTime<Utc>,
}

/// OTP issuer: generates codes and verifies candidates against stored hashes.
#[derive(Debug, Clone, Copy, Default)]
pub struct OtpIssuer;

impl OtpIssuer {
    pub fn new() -> Self {
        OtpIssuer
    }

    /// Issue a new 6-digit code drawn uniformly from [100000, 999999],
    /// together with its Argon2 hash and expiry timestamp.
    pub fn issue(&self) -> AuthResult<IssuedOtp> {
        let code = rand::rng().random_range(100_000..=999_999u32).to_string();

        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(code.as_bytes(), &salt)
            .map_err(|_| AuthError::HashingFailed)?
            .to_string();

        Ok(IssuedOtp {
            code,
            hash,
            expires_at: Utc::now() + Duration::minutes(OTP_TTL_MINUTES),
        })
    }

    /// Verify a candidate code against a stored hash. Fails closed: a
    /// malformed hash or any verifier error returns `false`.
    pub fn verify(&self, stored_hash: &str, candidate: &str) -> bool {
        match PasswordHash::new(stored_hash) {
            Ok(parsed) => Argon2::default()
                .verify_password(candidate.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }
}

/// Check whether a stored value looks like an Argon2 hash.
///
/// Used to distinguish "no secret set yet" from a real hash before
/// gating routes such as create-password.
pub fn is_argon2_hash(value: &str) -> bool {
    // A PHC string parses even without a hash output, so require one.
    value.starts_with("$argon2")
        && PasswordHash::new(value).is_ok_and(|parsed| parsed.hash.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_code_is_six_digits_in_range() {
        let issuer = OtpIssuer::new();
        for _ in 0..32 {
            let issued = issuer.issue().expect("issue failed");
            assert_eq!(issued.code.len(), 6);
            let n: u32 = issued.code.parse().expect("code not numeric");
            assert!((100_000..=999_999).contains(&n));
        }
    }

    #[test]
    fn expiry_is_five_minutes_out() {
        let before = Utc::now();
        let issued = OtpIssuer::new().issue().unwrap();
        let after = Utc::now();
        assert!(issued.expires_at >= before + Duration::minutes(OTP_TTL_MINUTES));
        assert!(issued.expires_at <= after + Duration::minutes(OTP_TTL_MINUTES));
    }

    #[test]
    fn verify_accepts_correct_code_and_rejects_wrong() {
        let issuer = OtpIssuer::new();
        let issued = issuer.issue().unwrap();
        assert!(issuer.verify(&issued.hash, &issued.code));
        assert!(!issuer.verify(&issued.hash, "000000"));
    }

    #[test]
    fn verify_fails_closed_on_malformed_hash() {
        let issuer = OtpIssuer::new();
        assert!(!issuer.verify("not-a-hash", "123456"));
        assert!(!issuer.verify("", "123456"));
    }

    #[test]
    fn argon2_hash_detection() {
        let issued = OtpIssuer::new().issue().unwrap();
        assert!(is_argon2_hash(&issued.hash));
        assert!(!is_argon2_hash("plaintext"));
        assert!(!is_argon2_hash("$argon2id$garbage"));
        // Parseable PHC string with params and salt but no hash output.
        assert!(!is_argon2_hash("$argon2id$v=19$m=19456,t=2,p=1$c29tZXNhbHQ"));
    }
}
