//! Database entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum Channel {
    #[default]
    Web,
    Whatsapp,
    Instagram,
    Telegram,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum ConversationStatus {
    #[default]
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum MessageRole {
    User,
    Ai,
    System,
}

#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Prompt {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub text: String,
    pub is_active: bool,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}

/// A prompt together with how often it has been used.
#[derive(Debug, Clone, FromRow)]
pub struct PromptUsage {
    #[sqlx(flatten)]
    pub prompt: Prompt,
    pub conversation_count: i64,
    pub message_count: i64,
}

/// Name and description of a prompt, used to label analytics rows.
#[derive(Debug, Clone, FromRow)]
pub struct PromptLabel {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: Uuid,
    pub user_id: Uuid,
    pub channel: Channel,
    pub status: ConversationStatus,
    pub rating: Option<i64>,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub duration: Option<i64>,
    pub prompt_id: Option<Uuid>,
}

impl Conversation {
    pub fn is_closed(&self) -> bool {
        self.status == ConversationStatus::Closed
    }
}

/// A conversation joined with its prompt label and message count.
#[derive(Debug, Clone, FromRow)]
pub struct ConversationSummary {
    #[sqlx(flatten)]
    pub conversation: Conversation,
    pub prompt_name: Option<String>,
    pub prompt_description: Option<String>,
    pub message_count: i64,
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub response_time: Option<i64>,
    pub prompt_id: Option<Uuid>,
}

/// A message joined with the name of the prompt that produced it.
#[derive(Debug, Clone, FromRow)]
pub struct MessageWithPrompt {
    #[sqlx(flatten)]
    pub message: Message,
    pub prompt_name: Option<String>,
}

/// Projection of a conversation used by trend aggregation.
#[derive(Debug, Clone, FromRow)]
pub struct ConversationPoint {
    pub start_date: DateTime<Utc>,
    pub status: ConversationStatus,
    pub rating: Option<i64>,
}

#[derive(Debug, Clone, Default, FromRow)]
pub struct ConversationTotals {
    pub conversations: i64,
    pub open_conversations: i64,
    pub rated_conversations: i64,
    pub satisfied_conversations: i64,
    pub average_rating: Option<f64>,
}

#[derive(Debug, Clone, Default, FromRow)]
pub struct MessageTotals {
    pub messages: i64,
    pub average_response_time: Option<f64>,
}

#[derive(Debug, Clone, FromRow)]
pub struct PromptRatingStats {
    pub prompt_id: Uuid,
    pub average_rating: f64,
    pub conversation_count: i64,
}
