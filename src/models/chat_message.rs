use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::MessageType;

/// One persisted query/response exchange. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub user_input: String,
    pub ai_response: String,
    pub created_at: NaiveDateTime,
    pub patient_id: Option<Uuid>,
    pub message_type: MessageType,
    /// Reserved for a future scoring feature; always 0.0 today.
    pub confidence_score: f64,
    pub requires_follow_up: bool,
}
