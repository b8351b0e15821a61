//! HTTP/WebSocket API for the chat server.
//!
//! This module provides the complete REST and WebSocket API for the chat
//! platform. It handles registration, login, password reset, device removal,
//! and real-time message delivery.
//!
//! # Architecture
//!
//! The API is built with:
//! - **Axum**: Async web framework for HTTP/WebSocket
//! - **Tower**: Middleware for CORS, authentication
//! - **JWT**: Bearer tokens bound to a single database-backed session
//!
//! # Modules
//!
//! - [`auth`]: Login, logout, profile, and device removal
//! - [`register`]: Registration, email verification, password creation
//! - [`reset`]: Password reset via emailed OTP
//! - [`websocket`]: Real-time direct message delivery
//! - [`middleware`]: Authentication middleware for protected endpoints
//!
//! # Endpoints Overview
//!
//! ## Public
//! - `POST /api/v1/auth/login` - Login with email/password
//! - `POST /api/v1/auth/request-device-otp` - Request device removal OTP
//! - `POST /api/v1/auth/remove-device` - Remove a device with OTP
//! - `POST /api/v1/auth/register/email` - Register new account
//! - `POST /api/v1/auth/register/verify` - Verify email with OTP
//! - `POST /api/v1/auth/register/resend-otp` - Re-issue verification OTP
//! - `POST /api/v1/auth/register/create-password` - Set initial password
//! - `POST /api/v1/auth/reset/get-otp` - Request password reset OTP
//! - `POST /api/v1/auth/reset/verify-otp` - Check a reset OTP
//! - `POST /api/v1/auth/reset/set-password` - Set new password with OTP
//! - `GET  /health` - Server health status
//!
//! ## Protected (Authorization: Bearer)
//! - `POST /api/v1/auth/logout` - Tear down the caller's session
//! - `GET  /api/v1/auth/profile` - Caller's profile
//! - `POST /api/v1/auth/register/update-profile` - Fill profile fields
//! - `GET  /ws` - Establish WebSocket connection
//!
//! ## Dev only (enabled via DEV_ROUTES)
//! - `GET  /api/v1/auth/all` - List every account
//!
//! # Security
//!
//! - JWT tokens and their sessions expire together after 24 hours
//! - Protected routes re-check session liveness on every request, so a
//!   removed device's token dies immediately
//! - WebSocket handshakes carry the token in the Authorization header
//! - Passwords and OTPs are stored only as Argon2 hashes
//!
//! # CORS
//!
//! CORS is configured permissively for development. In production, configure
//! appropriate origins, methods, and headers.

pub mod auth;
pub mod middleware;
pub mod rate_limiter;
pub mod register;
pub mod request_id;
pub mod reset;
pub mod websocket;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
};
use chitchat::auth::{AuthError, AuthManager, RegistrationManager, ResetManager, TokenSigner};
use chitchat::db::MessageRepository;
use chitchat::presence::PresenceIndex;
use chitchat::session::SessionStore;
use serde_json::{Value, json};
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Application state shared across all HTTP handlers and WebSocket
/// connections.
///
/// Cloned per request (cheap due to Arc wrappers).
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthManager>,
    pub registration: Arc<RegistrationManager>,
    pub reset: Arc<ResetManager>,
    pub sessions: SessionStore,
    pub tokens: TokenSigner,
    pub presence: Arc<PresenceIndex>,
    pub messages: Arc<dyn MessageRepository>,
    pub pool: Arc<PgPool>,
    /// Expose the dev-only account listing route
    pub dev_routes: bool,
}

/// Create the complete API router with all endpoints and middleware.
pub fn create_router(state: AppState) -> Router {
    let v1_routes = create_v1_router(state.clone());

    // Root routes (health check, WebSocket - not versioned)
    let root_routes = Router::new()
        .route("/health", get(health_check))
        // WebSocket route handles its own auth via the Authorization header
        .route("/ws", get(websocket::websocket_handler));

    Router::new()
        .merge(root_routes)
        .nest("/api/v1", v1_routes)
        .layer(axum::middleware::from_fn(request_id::request_id_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Create API v1 router with all versioned endpoints.
///
/// This allows for future API evolution (v2, v3, etc.) while maintaining
/// backward compatibility with existing clients.
fn create_v1_router(state: AppState) -> Router<AppState> {
    // Public routes (no authentication middleware)
    let mut public_routes = Router::new()
        .route("/auth/login", post(auth::login))
        .route("/auth/request-device-otp", post(auth::request_device_otp))
        .route("/auth/remove-device", post(auth::remove_device))
        .route("/auth/register/email", post(register::register))
        .route("/auth/register/verify", post(register::verify_email))
        .route("/auth/register/resend-otp", post(register::resend_otp))
        .route(
            "/auth/register/create-password",
            post(register::create_password),
        )
        .route("/auth/reset/get-otp", post(reset::get_otp))
        .route("/auth/reset/verify-otp", post(reset::verify_otp))
        .route("/auth/reset/set-password", post(reset::set_password));

    if state.dev_routes {
        public_routes = public_routes.route("/auth/all", get(auth::list_all));
    }

    // Protected routes (require authentication middleware)
    let protected_routes = Router::new()
        .route("/auth/logout", post(auth::logout))
        .route("/auth/profile", get(auth::profile))
        .route(
            "/auth/register/update-profile",
            post(register::update_profile),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    Router::new().merge(public_routes).merge(protected_routes)
}

/// Standard error payload
#[derive(Debug, serde::Serialize)]
pub struct ErrorResponse {
    pub message: String,
}

/// Map a workflow error onto its HTTP status and JSON body.
///
/// `AlreadyLoggedIn` gets a 409 whose body carries the holding session's
/// metadata, so clients can offer the device removal flow.
pub fn error_response(err: &AuthError) -> (StatusCode, Json<Value>) {
    let status = match err {
        AuthError::NotFound(_) => StatusCode::NOT_FOUND,
        AuthError::Conflict(_) | AuthError::AlreadyLoggedIn(_) => StatusCode::CONFLICT,
        AuthError::BadRequest(_) => StatusCode::BAD_REQUEST,
        AuthError::Unauthorized(_) | AuthError::TokenExpired | AuthError::TokenInvalid => {
            StatusCode::UNAUTHORIZED
        }
        AuthError::Forbidden(_) => StatusCode::FORBIDDEN,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let body = match err {
        AuthError::AlreadyLoggedIn(info) => json!({
            "message": err.client_message(),
            "info": info,
        }),
        _ => json!({ "message": err.client_message() }),
    };

    (status, Json(body))
}

/// Health check endpoint for monitoring and load balancers.
///
/// Checks database connectivity and reports the number of connected chat
/// clients. Returns `200 OK` when healthy, `503 Service Unavailable`
/// otherwise.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let db_healthy = sqlx::query("SELECT 1").fetch_one(&*state.pool).await.is_ok();

    let status_code = if db_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = json!({
        "status": if db_healthy { "healthy" } else { "unhealthy" },
        "version": env!("CARGO_PKG_VERSION"),
        "database": db_healthy,
        "online_users": state.presence.len(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    (status_code, Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use chitchat::db::{PgMessageRepository, PgSessionRepository, PgUserRepository};
    use chitchat::mail::{MailConfig, SmtpMailer};
    use http_body_util::BodyExt;
    use sqlx::postgres::PgPoolOptions;
    use tower::ServiceExt;

    // A lazy pool never connects until a query runs, so every test below
    // stays on paths that reject the request before touching the database.
    fn test_state(dev_routes: bool) -> AppState {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect_lazy("postgres://postgres@localhost/chitchat_test")
            .expect("lazy pool");

        let users = Arc::new(PgUserRepository::new(pool.clone()));
        let sessions = SessionStore::new(Arc::new(PgSessionRepository::new(pool.clone())));
        let messages = Arc::new(PgMessageRepository::new(pool.clone()));

        let tokens = TokenSigner::new("test_secret_key_for_testing_only".to_string());
        let mail_config = MailConfig {
            host: "localhost".to_string(),
            port: 465,
            username: "test".to_string(),
            password: "test".to_string(),
            from: "Chit Chat <no-reply@chitchat.local>".to_string(),
        };
        let mailer: Arc<dyn chitchat::mail::MailDispatcher> =
            Arc::new(SmtpMailer::new(&mail_config).expect("mailer"));
        let pepper = "test_pepper_for_testing_only".to_string();

        AppState {
            auth: Arc::new(AuthManager::new(
                users.clone(),
                sessions.clone(),
                tokens.clone(),
                mailer.clone(),
                pepper.clone(),
            )),
            registration: Arc::new(RegistrationManager::new(
                users.clone(),
                mailer.clone(),
                pepper.clone(),
            )),
            reset: Arc::new(ResetManager::new(users, mailer, pepper)),
            sessions,
            tokens,
            presence: Arc::new(PresenceIndex::new()),
            messages,
            pool: Arc::new(pool),
            dev_routes,
        }
    }

    fn test_app() -> Router {
        create_router(test_state(false))
    }

    async fn post_json(app: Router, uri: &str, body: Value) -> axum::response::Response {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        app.oneshot(request).await.unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let request = Request::builder()
            .uri("/api/v1/does/not/exist")
            .body(Body::empty())
            .unwrap();

        let response = test_app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn cors_headers_present() {
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/auth/login")
            .header("Origin", "http://example.com")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"email":"bad","password":"x"}"#))
            .unwrap();

        let response = test_app().oneshot(request).await.unwrap();
        assert!(response.headers().contains_key("access-control-allow-origin"));
    }

    #[tokio::test]
    async fn responses_carry_a_request_id() {
        let request = Request::builder()
            .uri("/api/v1/does/not/exist")
            .body(Body::empty())
            .unwrap();

        let response = test_app().oneshot(request).await.unwrap();
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn login_rejects_malformed_email() {
        let response = post_json(
            test_app(),
            "/api/v1/auth/login",
            json!({ "email": "not-an-email", "password": "Passw0rd!" }),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["message"], "email must be a valid email address");
    }

    #[tokio::test]
    async fn register_rejects_blank_name() {
        let response = post_json(
            test_app(),
            "/api/v1/auth/register/email",
            json!({ "email": "ann@example.com", "name": "   ", "role": "student" }),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn remove_device_rejects_short_otp() {
        let response = post_json(
            test_app(),
            "/api/v1/auth/remove-device",
            json!({ "session_id": 1, "user_id": 1, "otp": "123" }),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["message"], "OTP must be exactly 6 digits");
    }

    #[tokio::test]
    async fn reset_rejects_mismatched_confirmation() {
        let response = post_json(
            test_app(),
            "/api/v1/auth/reset/set-password",
            json!({
                "email": "ann@example.com",
                "otp": "123456",
                "password": "Passw0rd!",
                "confirm_password": "Passw0rd?",
            }),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["message"], "Passwords do not match.");
    }

    #[tokio::test]
    async fn reset_rejects_weak_password() {
        let response = post_json(
            test_app(),
            "/api/v1/auth/reset/set-password",
            json!({
                "email": "ann@example.com",
                "otp": "123456",
                "password": "weak",
                "confirm_password": "weak",
            }),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn logout_requires_authorization() {
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/auth/logout")
            .body(Body::empty())
            .unwrap();

        let response = test_app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn profile_rejects_garbage_bearer() {
        let request = Request::builder()
            .uri("/api/v1/auth/profile")
            .header("Authorization", "Bearer not.a.token")
            .body(Body::empty())
            .unwrap();

        let response = test_app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn websocket_route_is_mounted() {
        // A oneshot request has no upgradable connection, so the extractor
        // turns it away with 426 before the handler runs. The handler's own
        // bearer check is unit-tested in websocket.rs.
        let request = Request::builder()
            .uri("/ws")
            .header("Upgrade", "websocket")
            .header("Connection", "Upgrade")
            .header("Sec-WebSocket-Version", "13")
            .header("Sec-WebSocket-Key", "dGhlIHNhbXBsZSBub25jZQ==")
            .body(Body::empty())
            .unwrap();

        let response = test_app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UPGRADE_REQUIRED);
    }

    #[tokio::test]
    async fn dev_listing_route_is_gated() {
        let request = Request::builder()
            .uri("/api/v1/auth/all")
            .body(Body::empty())
            .unwrap();

        let response = test_app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let request = Request::builder()
            .uri("/api/v1/auth/all")
            .body(Body::empty())
            .unwrap();

        // With the flag on the route exists. Listing still needs a database,
        // so anything but 404 proves the route is mounted.
        let response = create_router(test_state(true)).oneshot(request).await.unwrap();
        assert_ne!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn malformed_json_is_rejected() {
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/auth/register/email")
            .header("content-type", "application/json")
            .body(Body::from("{ invalid json }"))
            .unwrap();

        let response = test_app().oneshot(request).await.unwrap();
        assert!(
            response.status() == StatusCode::BAD_REQUEST
                || response.status() == StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn error_statuses_line_up() {
        use chitchat::auth::SessionInfo;

        let (status, _) = error_response(&AuthError::NotFound("User not found".to_string()));
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = error_response(&AuthError::BadRequest("Wrong OTP".to_string()));
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = error_response(&AuthError::TokenExpired);
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = error_response(&AuthError::Forbidden("Wrong OTP".to_string()));
        assert_eq!(status, StatusCode::FORBIDDEN);

        let info = SessionInfo {
            id: 1,
            user_id: 1,
            user_agent: "test".to_string(),
            ip: None,
        };
        let (status, Json(body)) = error_response(&AuthError::AlreadyLoggedIn(info));
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["info"]["user_id"], 1);
    }
}
