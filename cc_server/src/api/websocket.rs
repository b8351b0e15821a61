//! WebSocket handler for real-time direct messaging.
//!
//! # Connection Flow
//!
//! 1. Client connects via `GET /ws` with `Authorization: Bearer <jwt>`
//! 2. Server validates the token cryptographically and upgrades
//! 3. The account is registered in the presence index (a newer connection
//!    replaces an older one)
//! 4. The client's full message history is replayed as `previous_messages`
//! 5. Incoming `new_message` events are persisted, echoed to the sender as
//!    `message`, and forwarded to the receiver as `reply` when online
//! 6. On disconnect the presence entry is removed, unless a replacement
//!    connection already owns it
//!
//! # Client Events
//!
//! ```json
//! { "event": "new_message", "data": { "receiver_id": 2, "content": "hi" } }
//! ```
//!
//! # Server Events
//!
//! - `previous_messages`: full history on connect
//! - `message`: echo of the client's own sent content
//! - `reply`: content forwarded from another account
//! - `error`: parse failures, rate limiting, delivery failures
//!
//! # Example
//!
//! ```javascript
//! const ws = new WebSocket('ws://localhost:3000/ws', [], {
//!   headers: { Authorization: 'Bearer eyJhbGc...' }
//! });
//! ws.onmessage = (event) => {
//!   const { event: name, data } = JSON.parse(event.data);
//!   if (name === 'reply') showIncoming(data);
//! };
//! ```

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use chitchat::auth::{AuthError, TokenSigner, UserId};

use super::{AppState, rate_limiter::RateLimiter};
use crate::metrics;

/// Client events received via WebSocket
#[derive(Debug, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
enum ClientEvent {
    /// Send a direct message to another account
    NewMessage { receiver_id: UserId, content: String },
}

/// Events sent to the client
#[derive(Debug, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
enum ServerEvent {
    /// Full message history, replayed on connect
    PreviousMessages(Vec<chitchat::chat::Message>),
    /// Echo of the client's own sent content
    Message(String),
    /// Content forwarded from another account
    Reply(String),
    Error(String),
}

impl ServerEvent {
    fn to_json(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }
}

/// Upgrade HTTP connection to WebSocket for real-time messaging.
///
/// The JWT is taken from the `Authorization: Bearer` header. The check here
/// is cryptographic only; protected HTTP routes separately confirm session
/// liveness on every request.
///
/// # Response
///
/// On success, upgrades to the WebSocket protocol (101 Switching Protocols).
/// On authentication failure, returns `401 Unauthorized` with a reason:
/// missing header → "unauthorized", expired token → "Token expired",
/// anything else → "Invalid token".
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Response {
    let user_id = match authenticate(&headers, &state.tokens) {
        Ok(user_id) => user_id,
        Err(reject) => return reject.into_response(),
    };

    ws.on_upgrade(move |socket| handle_socket(socket, user_id, state))
}

/// Resolve the `Authorization: Bearer` header to an account id, or the
/// 401 rejection to send instead of upgrading.
fn authenticate(
    headers: &HeaderMap,
    tokens: &TokenSigner,
) -> Result<UserId, (StatusCode, &'static str)> {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    let Some(token) = token else {
        return Err((StatusCode::UNAUTHORIZED, "unauthorized"));
    };

    match tokens.verify(token) {
        Ok(claims) => Ok(claims.sub),
        Err(AuthError::TokenExpired) => Err((StatusCode::UNAUTHORIZED, "Token expired")),
        Err(_) => Err((StatusCode::UNAUTHORIZED, "Invalid token")),
    }
}

/// Handle an established WebSocket connection.
///
/// Registers the account in the presence index, replays message history,
/// then processes incoming events until disconnect. All outbound traffic to
/// this client funnels through the presence entry's channel, which is also
/// how other connections' forwards reach it.
async fn handle_socket(socket: WebSocket, user_id: UserId, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    let (outbound_tx, mut outbound_rx) = tokio::sync::mpsc::unbounded_channel::<String>();
    let connection_id = state.presence.connect(user_id, outbound_tx.clone());

    info!(user_id, %connection_id, "WebSocket connected");
    metrics::websocket_connections_total();
    metrics::websocket_connections_active(state.presence.len() as u64);

    // Writer task: everything addressed to this client goes through the
    // presence channel.
    let send_task = tokio::spawn(async move {
        while let Some(json) = outbound_rx.recv().await {
            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
            metrics::websocket_messages_sent();
        }
    });

    // Replay history before processing any new events.
    match state.messages.for_user(user_id).await {
        Ok(messages) => {
            if let Some(json) = ServerEvent::PreviousMessages(messages).to_json() {
                let _ = outbound_tx.send(json);
            }
        }
        Err(e) => {
            warn!(user_id, "failed to load message history: {e}");
            if let Some(json) =
                ServerEvent::Error("Failed to load message history".to_string()).to_json()
            {
                let _ = outbound_tx.send(json);
            }
        }
    }

    // Rate limiters for DoS protection
    let mut burst_limiter = RateLimiter::burst(); // 10 messages per second
    let mut sustained_limiter = RateLimiter::sustained(); // 100 messages per minute

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                metrics::websocket_messages_received();

                if !burst_limiter.check() {
                    warn!(user_id, "burst rate limit exceeded, blocking message");
                    metrics::rate_limit_hits_total("ws_burst");
                    if let Some(json) =
                        ServerEvent::Error("Rate limit exceeded. Please slow down.".to_string())
                            .to_json()
                    {
                        let _ = outbound_tx.send(json);
                    }
                    continue;
                }

                if !sustained_limiter.check() {
                    warn!(user_id, "sustained rate limit exceeded, blocking message");
                    metrics::rate_limit_hits_total("ws_sustained");
                    if let Some(json) = ServerEvent::Error(
                        "Too many messages. Please wait before sending more.".to_string(),
                    )
                    .to_json()
                    {
                        let _ = outbound_tx.send(json);
                    }
                    continue;
                }

                let event = match serde_json::from_str::<ClientEvent>(&text) {
                    Ok(event) => event,
                    Err(e) => {
                        warn!(user_id, "failed to parse client event: {e}");
                        if let Some(json) =
                            ServerEvent::Error("Invalid message format".to_string()).to_json()
                        {
                            let _ = outbound_tx.send(json);
                        }
                        continue;
                    }
                };

                handle_client_event(event, user_id, &outbound_tx, &state).await;
            }
            Ok(Message::Close(_)) => {
                info!(user_id, "WebSocket closed");
                break;
            }
            Err(e) => {
                warn!(user_id, "WebSocket error: {e}");
                break;
            }
            _ => {}
        }
    }

    // Cleanup. A stale connection whose entry was already replaced must not
    // evict its replacement.
    send_task.abort();
    if state.presence.disconnect(connection_id).is_some() {
        info!(user_id, %connection_id, "WebSocket disconnected");
    }
    metrics::websocket_connections_active(state.presence.len() as u64);
}

/// Persist a direct message, echo it to the sender, and forward it to the
/// receiver's live connection when there is one. Offline receivers see the
/// message in their history replay on next connect.
async fn handle_client_event(
    event: ClientEvent,
    user_id: UserId,
    outbound_tx: &tokio::sync::mpsc::UnboundedSender<String>,
    state: &AppState,
) {
    match event {
        ClientEvent::NewMessage {
            receiver_id,
            content,
        } => {
            let saved = state.messages.insert(user_id, receiver_id, &content).await;
            match saved {
                Ok(message) => {
                    metrics::chat_messages_total();

                    if let Some(json) = ServerEvent::Message(message.content.clone()).to_json() {
                        let _ = outbound_tx.send(json);
                    }

                    if let Some(receiver_tx) = state.presence.sender_for(receiver_id) {
                        if let Some(json) = ServerEvent::Reply(message.content).to_json() {
                            let _ = receiver_tx.send(json);
                            metrics::chat_messages_forwarded_total();
                        }
                    }
                }
                Err(e) => {
                    warn!(user_id, receiver_id, "failed to persist message: {e}");
                    if let Some(json) =
                        ServerEvent::Error("Failed to send message".to_string()).to_json()
                    {
                        let _ = outbound_tx.send(json);
                    }
                }
            }
        }
    }
}
