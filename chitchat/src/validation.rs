//! Explicit input validation, executed by handlers before any workflow
//! operation runs. Each function checks one input shape and returns a typed
//! failure rather than panicking or throwing deep inside the engine.

use thiserror::Error;

use crate::auth::AuthError;

/// A single failed input check, with a user-facing message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

impl From<ValidationError> for AuthError {
    fn from(err: ValidationError) -> Self {
        AuthError::BadRequest(err.0)
    }
}

type ValidationResult = Result<(), ValidationError>;

/// Minimal email shape check: non-empty local part, one `@`, dotted domain.
pub fn validate_email(email: &str) -> ValidationResult {
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    };

    if valid {
        Ok(())
    } else {
        Err(ValidationError("email must be a valid email address".to_string()))
    }
}

/// OTP codes are exactly 6 digits.
pub fn validate_otp_code(code: &str) -> ValidationResult {
    if code.len() != 6 || !code.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError("OTP must be exactly 6 digits".to_string()));
    }
    Ok(())
}

/// Password policy: at least 8 characters with one lowercase, one uppercase,
/// one digit, and one special character.
pub fn validate_password(password: &str) -> ValidationResult {
    if password.len() < 8 {
        return Err(ValidationError(
            "Password must be atleast 8 characters long.".to_string(),
        ));
    }

    let has_lower = password.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = password.chars().any(|c| c.is_ascii_uppercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_special = password
        .chars()
        .any(|c| "!@#$%^&*()_-+=<>?{}[]~".contains(c));

    if !has_lower || !has_upper || !has_digit || !has_special {
        return Err(ValidationError(
            "Password must contain atleast 1 uppercase, 1 lowercase, 1 number and 1 special character."
                .to_string(),
        ));
    }

    Ok(())
}

/// Password confirmation must match exactly.
pub fn validate_password_confirmation(password: &str, confirm: &str) -> ValidationResult {
    if password != confirm {
        return Err(ValidationError("Passwords do not match.".to_string()));
    }
    Ok(())
}

/// Display names must be non-blank.
pub fn validate_name(name: &str) -> ValidationResult {
    if name.trim().is_empty() {
        return Err(ValidationError("name is required".to_string()));
    }
    Ok(())
}
