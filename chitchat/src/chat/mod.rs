//! Chat message model and routing.

use serde::{Deserialize, Serialize};

use crate::auth::UserId;
use chrono::{DateTime, Utc};

/// A persisted direct message between two accounts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub content: String,
    pub created_at: DateTime<Utc>,
}
