//! Infrastructure traits, used for DI on higher levels

use crate::infrastructure::entities;
use crate::infrastructure::entities::{Channel, ConversationStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Filters and paging for conversation listings.
#[derive(Debug, Clone)]
pub struct ConversationFilter {
    pub status: Option<ConversationStatus>,
    pub channel: Option<Channel>,
    pub limit: i64,
    pub offset: i64,
}

/// Partial prompt update; `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct PromptChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub text: Option<String>,
    pub is_active: Option<bool>,
    pub is_default: Option<bool>,
}

#[async_trait]
pub trait ConversationRepository: Send + Sync {
    async fn list_conversations(
        &self,
        filter: &ConversationFilter,
    ) -> Result<Vec<entities::ConversationSummary>, sqlx::Error>;

    async fn find_conversation(
        &self,
        conversation_id: Uuid,
    ) -> Result<Option<entities::Conversation>, sqlx::Error>;

    async fn find_conversation_summary(
        &self,
        conversation_id: Uuid,
    ) -> Result<Option<entities::ConversationSummary>, sqlx::Error>;

    async fn create_conversation(
        &self,
        conversation: entities::Conversation,
    ) -> Result<entities::Conversation, sqlx::Error>;

    /// Marks the conversation closed and stores `end_date`/`duration`, unless an end date is
    /// already recorded. Returns whether a row was changed.
    async fn close_conversation(
        &self,
        conversation_id: Uuid,
        end_date: DateTime<Utc>,
        duration: i64,
    ) -> Result<bool, sqlx::Error>;

    async fn set_rating(&self, conversation_id: Uuid, rating: i64) -> Result<(), sqlx::Error>;

    async fn delete_conversation(&self, conversation_id: Uuid) -> Result<bool, sqlx::Error>;
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn list_messages(
        &self,
        conversation_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<entities::MessageWithPrompt>, sqlx::Error>;

    async fn find_message(
        &self,
        message_id: Uuid,
    ) -> Result<Option<entities::MessageWithPrompt>, sqlx::Error>;

    async fn create_message(
        &self,
        message: entities::Message,
    ) -> Result<entities::Message, sqlx::Error>;

    async fn delete_message(&self, message_id: Uuid) -> Result<bool, sqlx::Error>;

    /// The newest `limit` USER/AI messages of a conversation other than `exclude`,
    /// returned oldest first.
    async fn recent_dialogue(
        &self,
        conversation_id: Uuid,
        exclude: Uuid,
        limit: i64,
    ) -> Result<Vec<entities::Message>, sqlx::Error>;

    /// Role and timestamp of every message in a conversation, oldest first.
    async fn message_timeline(
        &self,
        conversation_id: Uuid,
    ) -> Result<Vec<(entities::MessageRole, DateTime<Utc>)>, sqlx::Error>;
}

#[async_trait]
pub trait PromptRepository: Send + Sync {
    async fn list_prompts(&self) -> Result<Vec<entities::PromptUsage>, sqlx::Error>;

    async fn find_prompt(&self, prompt_id: Uuid)
    -> Result<Option<entities::Prompt>, sqlx::Error>;

    async fn find_prompt_usage(
        &self,
        prompt_id: Uuid,
    ) -> Result<Option<entities::PromptUsage>, sqlx::Error>;

    /// The default prompt if there is one, otherwise the active one.
    async fn current_prompt(&self) -> Result<Option<entities::Prompt>, sqlx::Error>;

    /// Inserts a prompt, clearing the active/default flag of every other prompt when the new
    /// one claims it.
    async fn create_prompt(&self, prompt: entities::Prompt)
    -> Result<entities::Prompt, sqlx::Error>;

    async fn update_prompt(
        &self,
        prompt_id: Uuid,
        changes: PromptChanges,
    ) -> Result<Option<entities::Prompt>, sqlx::Error>;

    /// Flips `is_active`; activating deactivates all other prompts in the same transaction.
    async fn toggle_prompt(&self, prompt_id: Uuid)
    -> Result<Option<entities::Prompt>, sqlx::Error>;

    async fn delete_prompt(&self, prompt_id: Uuid) -> Result<bool, sqlx::Error>;

    async fn prompt_labels(&self, ids: &[Uuid]) -> Result<Vec<entities::PromptLabel>, sqlx::Error>;
}

/// Read-only aggregate queries. `since` restricts to conversations started at or after it.
#[async_trait]
pub trait AnalyticsRepository: Send + Sync {
    async fn conversation_totals(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<entities::ConversationTotals, sqlx::Error>;

    async fn message_totals(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<entities::MessageTotals, sqlx::Error>;

    /// Conversation counts per channel, largest first.
    async fn channel_counts(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<(Channel, i64)>, sqlx::Error>;

    async fn status_counts(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<(ConversationStatus, i64)>, sqlx::Error>;

    async fn conversation_points(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<entities::ConversationPoint>, sqlx::Error>;

    /// `(rating, count)` for rated conversations, ascending by rating.
    async fn rating_counts(&self) -> Result<Vec<(i64, i64)>, sqlx::Error>;

    async fn prompt_rating_stats(&self) -> Result<Vec<entities::PromptRatingStats>, sqlx::Error>;
}
