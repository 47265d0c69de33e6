//! DI "Interfaces"

use crate::core::analytics::{
    DashboardReport, Period, PromptPerformance, RatingBucket, TrendPoint,
};
use crate::core::assistant::{CompletionRequest, GatewayError};
use crate::core::errors::ServiceError;
use crate::core::realtime::{RealtimeEvent, Subscription};
use crate::infrastructure::entities;
use crate::infrastructure::entities::{Channel, ConversationStatus, MessageRole};
use crate::infrastructure::traits::{ConversationFilter, PromptChanges};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Requested changes to a conversation.
#[derive(Debug, Clone, Default)]
pub struct ConversationUpdate {
    pub status: Option<ConversationStatus>,
    pub rating: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationStats {
    pub total_messages: i64,
    pub user_messages: i64,
    pub ai_messages: i64,
    pub first_message_at: Option<DateTime<Utc>>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub duration: Option<i64>,
}

/// New prompt as submitted by an administrator.
#[derive(Debug, Clone)]
pub struct NewPrompt {
    pub name: String,
    pub description: Option<String>,
    pub text: String,
    pub is_active: bool,
    pub is_default: bool,
}

/// The two messages appended by one chat exchange.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatExchange {
    pub user_message: entities::Message,
    pub ai_message: entities::Message,
}

#[async_trait]
pub trait ConversationService: Send + Sync {
    /// Lists conversations, newest first.
    async fn list_conversations(
        &self,
        filter: ConversationFilter,
    ) -> Result<Vec<entities::ConversationSummary>, ServiceError>;

    async fn get_conversation(
        &self,
        conversation_id: Uuid,
    ) -> Result<entities::ConversationSummary, ServiceError>;

    /// Creates a new conversation for the given user.
    ///
    /// The current prompt (default first, then active) is copied onto the conversation.
    async fn create_conversation(
        &self,
        user_id: Uuid,
        channel: Channel,
        status: ConversationStatus,
    ) -> Result<entities::Conversation, ServiceError>;

    /// Applies a status transition and/or rating.
    ///
    /// Returns `Err` if the conversation does not exist, is owned by someone else, the
    /// rating is out of range or the transition is not allowed.
    async fn update_conversation(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
        update: ConversationUpdate,
    ) -> Result<entities::ConversationSummary, ServiceError>;

    /// Deletes a conversation of the given user, together with its messages.
    async fn delete_conversation(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
    ) -> Result<(), ServiceError>;

    async fn conversation_stats(
        &self,
        conversation_id: Uuid,
    ) -> Result<ConversationStats, ServiceError>;
}

#[async_trait]
pub trait MessageService: Send + Sync {
    /// List messages in a conversation, oldest first.
    ///
    /// Returns `Err` if the conversation does not exist.
    async fn list_messages(
        &self,
        conversation_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<entities::MessageWithPrompt>, ServiceError>;

    async fn get_message(
        &self,
        message_id: Uuid,
    ) -> Result<entities::MessageWithPrompt, ServiceError>;

    /// Creates a new message in a conversation.
    ///
    /// Returns `Err` if the conversation does not exist, belongs to another user or is closed.
    async fn create_message(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
        role: MessageRole,
        content: String,
    ) -> Result<entities::Message, ServiceError>;

    async fn delete_message(&self, user_id: Uuid, message_id: Uuid) -> Result<(), ServiceError>;
}

#[async_trait]
pub trait ChatService: Send + Sync {
    /// Appends the user's message and the AI reply to an open conversation.
    ///
    /// Gateway failures never surface here: they are turned into a substitute reply.
    async fn send_message(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
        text: String,
    ) -> Result<ChatExchange, ServiceError>;
}

#[async_trait]
pub trait PromptService: Send + Sync {
    async fn list_prompts(&self) -> Result<Vec<entities::PromptUsage>, ServiceError>;

    /// The prompt new conversations get: the default one, otherwise the active one.
    async fn active_prompt(&self) -> Result<entities::Prompt, ServiceError>;

    async fn get_prompt(&self, prompt_id: Uuid) -> Result<entities::PromptUsage, ServiceError>;

    async fn create_prompt(&self, prompt: NewPrompt) -> Result<entities::Prompt, ServiceError>;

    async fn update_prompt(
        &self,
        prompt_id: Uuid,
        changes: PromptChanges,
    ) -> Result<entities::Prompt, ServiceError>;

    /// Activates an inactive prompt (deactivating every other one) or deactivates an active one.
    async fn toggle_prompt(&self, prompt_id: Uuid) -> Result<entities::Prompt, ServiceError>;

    /// Deletes a prompt. The default prompt cannot be deleted.
    async fn delete_prompt(&self, prompt_id: Uuid) -> Result<(), ServiceError>;
}

#[async_trait]
pub trait AnalyticsService: Send + Sync {
    async fn dashboard(&self, period: Period) -> Result<DashboardReport, ServiceError>;

    async fn trends(&self, days: i64) -> Result<Vec<TrendPoint>, ServiceError>;

    async fn rating_distribution(&self) -> Result<Vec<RatingBucket>, ServiceError>;

    /// The five prompts with the lowest average rating.
    async fn prompt_performance(&self) -> Result<Vec<PromptPerformance>, ServiceError>;
}

/// External text completion backend.
#[async_trait]
pub trait CompletionGateway: Send + Sync {
    fn is_available(&self) -> bool;

    async fn complete(&self, request: &CompletionRequest) -> Result<String, GatewayError>;
}

/// Room based broadcast of chat events to connected clients.
pub trait RealtimeNotifier: Send + Sync {
    /// Registers a new subscriber that is not in any room yet.
    fn connect(&self) -> Subscription;

    fn join(&self, subscriber_id: u64, conversation_id: Uuid);

    fn leave(&self, subscriber_id: u64, conversation_id: Uuid);

    /// Removes the subscriber from every room and closes its event stream.
    fn disconnect(&self, subscriber_id: u64);

    /// Delivers `event` to the current members of the room without waiting.
    ///
    /// Returns the number of subscribers that accepted it.
    fn publish(&self, conversation_id: Uuid, event: RealtimeEvent) -> usize;
}
