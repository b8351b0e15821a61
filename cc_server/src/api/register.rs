//! Registration API handlers.
//!
//! Covers the account lifecycle from registration to first login:
//! register with an email, verify it with the mailed OTP, optionally re-issue
//! the OTP (one per minute), create the password, and fill in profile fields
//! once logged in.

use axum::{Extension, Json, extract::State, http::StatusCode};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{Value, json};

use chitchat::auth::{RegisterRequest, Role, UpdateProfileRequest};
use chitchat::validation::{validate_email, validate_name, validate_otp_code, validate_password};

use super::{AppState, error_response, middleware::AuthUser};
use crate::metrics;

#[derive(Debug, Deserialize)]
pub struct RegisterPayload {
    pub email: String,
    pub name: String,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct VerifyOtpPayload {
    pub email: String,
    pub otp: String,
}

#[derive(Debug, Deserialize)]
pub struct ResendOtpPayload {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct CreatePasswordPayload {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfilePayload {
    pub gender: Option<String>,
    pub university: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
}

fn bad_request(message: String) -> (StatusCode, Json<Value>) {
    (StatusCode::BAD_REQUEST, Json(json!({ "message": message })))
}

/// Register a new account and mail it a verification OTP.
///
/// # Errors
///
/// - `400 Bad Request`: Malformed email or name
/// - `409 Conflict`: Email already registered
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterPayload>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if let Err(e) = validate_email(&payload.email) {
        return Err(bad_request(e.0));
    }
    if let Err(e) = validate_name(&payload.name) {
        return Err(bad_request(e.0));
    }

    let request = RegisterRequest {
        email: payload.email,
        name: payload.name,
        role: payload.role,
    };

    match state.registration.register(&request).await {
        Ok(message) => {
            metrics::registrations_total();
            metrics::otps_issued_total("verification");
            Ok(Json(json!({ "message": message })))
        }
        Err(e) => Err(error_response(&e)),
    }
}

/// Verify the account's email by consuming the mailed OTP.
pub async fn verify_email(
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
        .registration
        .verify_email(&payload.email, &payload.otp)
        .await
    {
        Ok(message) => Ok(Json(json!({ "message": message }))),
        Err(e) => Err(error_response(&e)),
    }
}

/// Re-issue the verification OTP, rate limited to one per minute.
pub async fn resend_otp(
    State(state): State<AppState>,
    Json(payload): Json<ResendOtpPayload>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if let Err(e) = validate_email(&payload.email) {
        return Err(bad_request(e.0));
    }

    match state.registration.resend_otp(&payload.email).await {
        Ok(message) => {
            metrics::otps_issued_total("verification");
            Ok(Json(json!({ "message": message })))
        }
        Err(e) => Err(error_response(&e)),
    }
}

/// Set the initial password for a verified account.
///
/// # Errors
///
/// - `400 Bad Request`: Password fails strength requirements
/// - `401 Unauthorized`: Account already has a password
/// - `404 Not Found`: No such account
pub async fn create_password(
    State(state): State<AppState>,
    Json(payload): Json<CreatePasswordPayload>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if let Err(e) = validate_email(&payload.email) {
        return Err(bad_request(e.0));
    }
    if let Err(e) = validate_password(&payload.password) {
        return Err(bad_request(e.0));
    }

    match state
        .registration
        .create_password(&payload.email, &payload.password)
        .await
    {
        Ok(message) => Ok(Json(json!({ "message": message }))),
        Err(e) => Err(error_response(&e)),
    }
}

/// Fill in the caller's profile fields.
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<UpdateProfilePayload>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let request = UpdateProfileRequest {
        gender: payload.gender,
        university: payload.university,
        date_of_birth: payload.date_of_birth,
    };

    match state.registration.update_profile(user.id, &request).await {
        Ok(message) => Ok(Json(json!({ "message": message }))),
        Err(e) => Err(error_response(&e)),
    }
}
