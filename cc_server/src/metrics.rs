//! Prometheus metrics for monitoring server health and performance.
//!
//! This module provides metrics collection and export via a dedicated
//! Prometheus scrape listener. Metrics are exposed in Prometheus text format.
//!
//! # Metrics Categories
//!
//! - **HTTP Metrics**: Request counts, duration, status codes
//! - **WebSocket Metrics**: Active connections, messages sent/received
//! - **Auth Metrics**: Login attempts, OTP issuance, active sessions
//! - **Chat Metrics**: Messages persisted and forwarded

#![allow(dead_code)] // Public API for future integration

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Initialize Prometheus metrics exporter.
///
/// Sets up a Prometheus scrape endpoint on the specified address.
/// Metrics will be available at `http://<addr>/metrics`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {}", e))
}

// ============================================================================
// HTTP Metrics
// ============================================================================

/// Record HTTP request.
pub fn http_requests_total(method: &str, path: &str, status: u16) {
    metrics::counter!("http_requests_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record HTTP request duration in milliseconds.
pub fn http_request_duration_ms(method: &str, path: &str, duration_ms: f64) {
    metrics::histogram!("http_request_duration_ms",
        "method" => method.to_string(),
        "path" => path.to_string()
    )
    .record(duration_ms);
}

// ============================================================================
// WebSocket Metrics
// ============================================================================

/// Set current active WebSocket connections count.
pub fn websocket_connections_active(count: u64) {
    metrics::gauge!("websocket_connections_active").set(count as f64);
}

/// Increment total WebSocket connections counter.
pub fn websocket_connections_total() {
    metrics::counter!("websocket_connections_total").increment(1);
}

/// Increment WebSocket messages sent counter.
pub fn websocket_messages_sent() {
    metrics::counter!("websocket_messages_sent").increment(1);
}

/// Increment WebSocket messages received counter.
pub fn websocket_messages_received() {
    metrics::counter!("websocket_messages_received").increment(1);
}

// ============================================================================
// Auth Metrics
// ============================================================================

/// Increment login attempts counter.
pub fn login_attempts_total(success: bool) {
    metrics::counter!("login_attempts_total",
        "success" => success.to_string()
    )
    .increment(1);
}

/// Increment registrations counter.
pub fn registrations_total() {
    metrics::counter!("registrations_total").increment(1);
}

/// Increment OTP issuance counter, labeled by purpose.
pub fn otps_issued_total(purpose: &str) {
    metrics::counter!("otps_issued_total",
        "purpose" => purpose.to_string()
    )
    .increment(1);
}

/// Increment device removals counter.
pub fn device_removals_total() {
    metrics::counter!("device_removals_total").increment(1);
}

// ============================================================================
// Chat Metrics
// ============================================================================

/// Increment persisted chat messages counter.
pub fn chat_messages_total() {
    metrics::counter!("chat_messages_total").increment(1);
}

/// Increment forwarded chat messages counter (receiver was online).
pub fn chat_messages_forwarded_total() {
    metrics::counter!("chat_messages_forwarded_total").increment(1);
}

// ============================================================================
// Rate Limiting Metrics
// ============================================================================

/// Increment rate limit hits counter.
pub fn rate_limit_hits_total(endpoint: &str) {
    metrics::counter!("rate_limit_hits_total",
        "endpoint" => endpoint.to_string()
    )
    .increment(1);
}
