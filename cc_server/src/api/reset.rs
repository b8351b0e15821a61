//! Password reset API handlers.
//!
//! The get-otp route answers identically whether or not the email is on
//! file, so it cannot be used to enumerate accounts.

use axum::{Json, extract::State, http::StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};

use chitchat::validation::{
    validate_email, validate_otp_code, validate_password, validate_password_confirmation,
};

use super::{AppState, error_response};
use crate::metrics;

#[derive(Debug, Deserialize)]
pub struct GetOtpPayload {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyOtpPayload {
    pub email: String,
    pub otp: String,
}

#[derive(Debug, Deserialize)]
pub struct SetPasswordPayload {
    pub email: String,
    pub otp: String,
    pub password: String,
    pub confirm_password: String,
}

fn bad_request(message: String) -> (StatusCode, Json<Value>) {
    (StatusCode::BAD_REQUEST, Json(json!({ "message": message })))
}

/// Request a password reset OTP.
pub async fn get_otp(
    State(state): State<AppState>,
    Json(payload): Json<GetOtpPayload>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if let Err(e) = validate_email(&payload.email) {
        return Err(bad_request(e.0));
    }

    match state.reset.request_reset_otp(&payload.email).await {
        Ok(receipt) => {
            // Unknown addresses get the same message but issued nothing.
            if receipt.issued {
                metrics::otps_issued_total("password_reset");
            }
            Ok(Json(json!({ "message": receipt.message })))
        }
        Err(e) => Err(error_response(&e)),
    }
}

/// Check a reset OTP without consuming it.
///
/// # Errors
///
/// - `403 Forbidden`: Wrong or expired OTP
/// - `404 Not Found`: No such account
pub async fn verify_otp(
    State(state): State<AppState>,
    Json(payload): Json<VerifyOtpPayload>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if let Err(e) = validate_email(&payload.email) {
        return Err(bad_request(e.0));
    }
    if let Err(e) = validate_otp_code(&payload.otp) {
        return Err(bad_request(e.0));
    }

    match state
        .reset
        .verify_reset_otp(&payload.email, &payload.otp)
        .await
    {
        Ok(message) => Ok(Json(json!({ "message": message, "status": true }))),
        Err(e) => Err(error_response(&e)),
    }
}

/// Set a new password after re-verifying the OTP.
pub async fn set_password(
    State(state): State<AppState>,
    Json(payload): Json<SetPasswordPayload>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if let Err(e) = validate_email(&payload.email) {
        return Err(bad_request(e.0));
    }
    if let Err(e) = validate_otp_code(&payload.otp) {
        return Err(bad_request(e.0));
    }
    if let Err(e) = validate_password(&payload.password) {
        return Err(bad_request(e.0));
    }
    if let Err(e) = validate_password_confirmation(&payload.password, &payload.confirm_password) {
        return Err(bad_request(e.0));
    }

    match state
        .reset
        .reset_password(&payload.email, &payload.otp, &payload.password)
        .await
    {
        Ok(message) => Ok(Json(json!({ "message": message }))),
        Err(e) => Err(error_response(&e)),
    }
}
