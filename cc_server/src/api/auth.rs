//! Authentication API handlers.
//!
//! This module provides HTTP REST endpoints for login, logout, profile
//! access, and the device removal flow:
//! - Login with email/password, refused while another device holds the session
//! - Logout to tear down the session
//! - Request a device removal OTP by email (for locked-out users)
//! - Remove the device by answering the OTP
//!
//! All endpoints return JSON responses with either data or error messages.
//!
//! # Examples
//!
//! Login:
//! ```bash
//! curl -X POST http://localhost:3000/api/v1/auth/login \
//!   -H "Content-Type: application/json" \
//!   -d '{"email": "a@example.com", "password": "Pass123!"}'
//! ```

use axum::{
    Extension, Json,
    extract::State,
    http::{HeaderMap, StatusCode, header::USER_AGENT},
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::{Value, json};

use chitchat::auth::LoginRequest;
use chitchat::validation::{validate_email, validate_otp_code};

use super::{AppState, error_response, middleware::AuthUser};
use crate::{logging, metrics};

#[derive(Debug, Deserialize)]
pub struct LoginPayload {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RequestDeviceOtpPayload {
    pub session_id: i64,
    pub user_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct RemoveDevicePayload {
    pub session_id: i64,
    pub user_id: i64,
    pub otp: String,
}

fn bad_request(message: String) -> (StatusCode, Json<Value>) {
    (StatusCode::BAD_REQUEST, Json(json!({ "message": message })))
}

fn client_meta(headers: &HeaderMap) -> (String, Option<String>) {
    let user_agent = headers
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();
    let ip = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string());
    (user_agent, ip)
}

/// Authenticate and mint a bearer token bound to a fresh session.
///
/// # Response
///
/// On success, returns `200 OK`:
/// ```json
/// { "access_token": "eyJhbGciOiJIUzI1NiIs..." }
/// ```
///
/// # Errors
///
/// - `400 Bad Request`: Unknown account, unverified, or passwordless
/// - `401 Unauthorized`: Wrong password
/// - `409 Conflict`: Another device holds the session; the body carries the
///   holding session's id, user agent, and ip so the client can offer the
///   device removal flow
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<LoginPayload>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if let Err(e) = validate_email(&payload.email) {
        return Err(bad_request(e.0));
    }

    let (user_agent, ip) = client_meta(&headers);
    let request = LoginRequest {
        email: payload.email,
        password: payload.password,
    };

    match state.auth.login(&request, &user_agent, ip.as_deref()).await {
        Ok(access_token) => {
            metrics::login_attempts_total(true);
            Ok(Json(json!({ "access_token": access_token })))
        }
        Err(e) => {
            metrics::login_attempts_total(false);
            logging::log_security_event(
                "failed_login",
                None,
                ip.as_deref(),
                &e.client_message(),
            );
            Err(error_response(&e))
        }
    }
}

/// Tear down the caller's session.
///
/// # Response
///
/// On success, returns `200 OK`:
/// ```json
/// { "message": "user logged out successfully." }
/// ```
pub async fn logout(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    match state.auth.logout(user.id).await {
        Ok(()) => Ok(Json(json!({ "message": "user logged out successfully." }))),
        Err(e) => Err(error_response(&e)),
    }
}

/// Caller's sanitized profile.
pub async fn profile(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> impl IntoResponse {
    match state.auth.profile(user.id).await {
        Ok(profile) => Ok(Json(profile)),
        Err(e) => Err(error_response(&e)),
    }
}

/// Every account, sanitized. Only routed when dev routes are enabled.
pub async fn list_all(State(state): State<AppState>) -> impl IntoResponse {
    match state.auth.list_all().await {
        Ok(profiles) => Ok(Json(profiles)),
        Err(e) => Err(error_response(&e)),
    }
}

/// Request a device removal OTP for the session named in the payload.
///
/// Reachable without a token: the caller is locked out of the session they
/// want to remove. The (session_id, user_id) pair comes from the login
/// rejection's `info` payload.
pub async fn request_device_otp(
    State(state): State<AppState>,
    Json(payload): Json<RequestDeviceOtpPayload>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    match state
        .auth
        .request_device_removal_otp(payload.session_id, payload.user_id)
        .await
    {
        Ok(message) => {
            metrics::otps_issued_total("device_removal");
            Ok(Json(json!({ "message": message })))
        }
        Err(e) => Err(error_response(&e)),
    }
}

/// Remove a device by answering its pending removal OTP.
pub async fn remove_device(
    State(state): State<AppState>,
    Json(payload): Json<RemoveDevicePayload>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if let Err(e) = validate_otp_code(&payload.otp) {
        return Err(bad_request(e.0));
    }

    match state
        .auth
        .remove_device(payload.session_id, payload.user_id, &payload.otp)
        .await
    {
        Ok(message) => {
            metrics::device_removals_total();
            logging::log_security_event(
                "device_removed",
                Some(payload.user_id),
                None,
                "Session removed via OTP",
            );
            Ok(Json(json!({ "message": message })))
        }
        Err(e) => Err(error_response(&e)),
    }
}
