//! Implementations for the services the app needs.

use crate::core::errors::ServiceError;
use crate::core::exchange::ConversationLocks;
use crate::core::traits::{
    ConversationService, ConversationStats, ConversationUpdate, MessageService, NewPrompt,
    PromptService,
};
use crate::infrastructure::entities;
use crate::infrastructure::entities::{
    Channel, Conversation, ConversationStatus, Message, MessageRole,
};
use crate::infrastructure::traits::{
    ConversationFilter, ConversationRepository, MessageRepository, PromptChanges,
    PromptRepository,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use di::{Ref, injectable};
use log::{debug, info};
use uuid::Uuid;

pub const MIN_RATING: i64 = 1;
pub const MAX_RATING: i64 = 5;

fn validate_rating(rating: i64) -> Result<(), ServiceError> {
    if (MIN_RATING..=MAX_RATING).contains(&rating) {
        Ok(())
    } else {
        Err(ServiceError::Validation(format!(
            "rating must be between {MIN_RATING} and {MAX_RATING}"
        )))
    }
}

fn require_text(value: &str, field: &str) -> Result<(), ServiceError> {
    if value.trim().is_empty() {
        Err(ServiceError::Validation(format!("{field} must not be empty")))
    } else {
        Ok(())
    }
}

/// Whole seconds between start and end, never negative.
pub fn elapsed_seconds(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    (end - start).num_seconds().max(0)
}

/// Counts per role and the first/last timestamps in one pass over a timeline sorted oldest first.
pub fn summarize_timeline(
    timeline: &[(MessageRole, DateTime<Utc>)],
    duration: Option<i64>,
) -> ConversationStats {
    let mut stats = ConversationStats {
        total_messages: 0,
        user_messages: 0,
        ai_messages: 0,
        first_message_at: None,
        last_message_at: None,
        duration,
    };

    for (role, timestamp) in timeline {
        stats.total_messages += 1;
        match role {
            MessageRole::User => stats.user_messages += 1,
            MessageRole::Ai => stats.ai_messages += 1,
            MessageRole::System => {}
        }
        stats.first_message_at.get_or_insert(*timestamp);
        stats.last_message_at = Some(*timestamp);
    }

    stats
}

async fn owned_conversation(
    repo: &dyn ConversationRepository,
    user_id: Uuid,
    conversation_id: Uuid,
) -> Result<Conversation, ServiceError> {
    let conversation = repo
        .find_conversation(conversation_id)
        .await?
        .ok_or(ServiceError::NotFound("conversation"))?;

    if conversation.user_id == user_id {
        Ok(conversation)
    } else {
        Err(ServiceError::Forbidden)
    }
}

#[injectable(ConversationService)]
pub struct ConversationLifecycle {
    conversations: Ref<dyn ConversationRepository>,
    messages: Ref<dyn MessageRepository>,
    prompts: Ref<dyn PromptRepository>,
}

impl ConversationLifecycle {
    async fn summary(
        &self,
        conversation_id: Uuid,
    ) -> Result<entities::ConversationSummary, ServiceError> {
        self.conversations
            .find_conversation_summary(conversation_id)
            .await?
            .ok_or(ServiceError::NotFound("conversation"))
    }
}

#[async_trait]
impl ConversationService for ConversationLifecycle {
    async fn list_conversations(
        &self,
        filter: ConversationFilter,
    ) -> Result<Vec<entities::ConversationSummary>, ServiceError> {
        Ok(self.conversations.list_conversations(&filter).await?)
    }

    async fn get_conversation(
        &self,
        conversation_id: Uuid,
    ) -> Result<entities::ConversationSummary, ServiceError> {
        self.summary(conversation_id).await
    }

    async fn create_conversation(
        &self,
        user_id: Uuid,
        channel: Channel,
        status: ConversationStatus,
    ) -> Result<Conversation, ServiceError> {
        let prompt = self.prompts.current_prompt().await?;
        let now = Utc::now();
        let closed = status == ConversationStatus::Closed;

        let conversation = self
            .conversations
            .create_conversation(Conversation {
                id: Uuid::new_v4(),
                user_id,
                channel,
                status,
                rating: None,
                start_date: now,
                end_date: closed.then_some(now),
                duration: closed.then_some(0),
                prompt_id: prompt.map(|prompt| prompt.id),
            })
            .await?;

        info!(
            "conversation {} created on {:?} by {user_id}",
            conversation.id, conversation.channel
        );
        Ok(conversation)
    }

    async fn update_conversation(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
        update: ConversationUpdate,
    ) -> Result<entities::ConversationSummary, ServiceError> {
        if let Some(rating) = update.rating {
            validate_rating(rating)?;
        }

        let conversation =
            owned_conversation(&*self.conversations, user_id, conversation_id).await?;

        match update.status {
            Some(ConversationStatus::Open) if conversation.is_closed() => {
                return Err(ServiceError::InvalidState(
                    "a closed conversation cannot be reopened".to_owned(),
                ));
            }
            Some(ConversationStatus::Closed) if !conversation.is_closed() => {
                let now = Utc::now();
                let duration = elapsed_seconds(conversation.start_date, now);
                let closed = self
                    .conversations
                    .close_conversation(conversation_id, now, duration)
                    .await?;

                if closed {
                    info!("conversation {conversation_id} closed after {duration}s");
                } else {
                    debug!("conversation {conversation_id} was already closed");
                }
            }
            _ => {}
        }

        if let Some(rating) = update.rating {
            self.conversations.set_rating(conversation_id, rating).await?;
        }

        self.summary(conversation_id).await
    }

    async fn delete_conversation(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
    ) -> Result<(), ServiceError> {
        owned_conversation(&*self.conversations, user_id, conversation_id).await?;

        if self.conversations.delete_conversation(conversation_id).await? {
            info!("conversation {conversation_id} deleted");
            Ok(())
        } else {
            Err(ServiceError::NotFound("conversation"))
        }
    }

    async fn conversation_stats(
        &self,
        conversation_id: Uuid,
    ) -> Result<ConversationStats, ServiceError> {
        let conversation = self
            .conversations
            .find_conversation(conversation_id)
            .await?
            .ok_or(ServiceError::NotFound("conversation"))?;

        let timeline = self.messages.message_timeline(conversation_id).await?;
        Ok(summarize_timeline(&timeline, conversation.duration))
    }
}

#[injectable(MessageService)]
pub struct MessageStore {
    conversations: Ref<dyn ConversationRepository>,
    messages: Ref<dyn MessageRepository>,
    locks: Ref<ConversationLocks>,
}

#[async_trait]
impl MessageService for MessageStore {
    async fn list_messages(
        &self,
        conversation_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<entities::MessageWithPrompt>, ServiceError> {
        self.conversations
            .find_conversation(conversation_id)
            .await?
            .ok_or(ServiceError::NotFound("conversation"))?;

        Ok(self
            .messages
            .list_messages(conversation_id, limit, offset)
            .await?)
    }

    async fn get_message(
        &self,
        message_id: Uuid,
    ) -> Result<entities::MessageWithPrompt, ServiceError> {
        self.messages
            .find_message(message_id)
            .await?
            .ok_or(ServiceError::NotFound("message"))
    }

    async fn create_message(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
        role: MessageRole,
        content: String,
    ) -> Result<Message, ServiceError> {
        require_text(&content, "content")?;

        // shared with chat sends on the same conversation
        let _guard = self.locks.acquire(conversation_id).await;
        let conversation =
            owned_conversation(&*self.conversations, user_id, conversation_id).await?;
        if conversation.is_closed() {
            return Err(ServiceError::InvalidState(
                "messages cannot be added to a closed conversation".to_owned(),
            ));
        }

        Ok(self
            .messages
            .create_message(Message {
                id: Uuid::new_v4(),
                conversation_id,
                role,
                content,
                timestamp: Utc::now(),
                response_time: None,
                prompt_id: None,
            })
            .await?)
    }

    async fn delete_message(&self, user_id: Uuid, message_id: Uuid) -> Result<(), ServiceError> {
        let message = self
            .messages
            .find_message(message_id)
            .await?
            .ok_or(ServiceError::NotFound("message"))?;

        owned_conversation(
            &*self.conversations,
            user_id,
            message.message.conversation_id,
        )
        .await
        .map_err(|e| match e {
            // a foreign conversation hides its messages as well
            ServiceError::Forbidden | ServiceError::NotFound(_) => {
                ServiceError::NotFound("message")
            }
            e => e,
        })?;

        if self.messages.delete_message(message_id).await? {
            Ok(())
        } else {
            Err(ServiceError::NotFound("message"))
        }
    }
}

#[injectable(PromptService)]
pub struct PromptCatalog {
    prompts: Ref<dyn PromptRepository>,
}

const DUPLICATE_PROMPT: &str = "a prompt with this name already exists";

#[async_trait]
impl PromptService for PromptCatalog {
    async fn list_prompts(&self) -> Result<Vec<entities::PromptUsage>, ServiceError> {
        Ok(self.prompts.list_prompts().await?)
    }

    async fn active_prompt(&self) -> Result<entities::Prompt, ServiceError> {
        self.prompts
            .current_prompt()
            .await?
            .ok_or(ServiceError::NotFound("active prompt"))
    }

    async fn get_prompt(&self, prompt_id: Uuid) -> Result<entities::PromptUsage, ServiceError> {
        self.prompts
            .find_prompt_usage(prompt_id)
            .await?
            .ok_or(ServiceError::NotFound("prompt"))
    }

    async fn create_prompt(&self, prompt: NewPrompt) -> Result<entities::Prompt, ServiceError> {
        require_text(&prompt.name, "name")?;
        require_text(&prompt.text, "text")?;

        let created = self
            .prompts
            .create_prompt(entities::Prompt {
                id: Uuid::new_v4(),
                name: prompt.name,
                description: prompt.description,
                text: prompt.text,
                is_active: prompt.is_active,
                is_default: prompt.is_default,
                created_at: Utc::now(),
            })
            .await
            .map_err(|e| ServiceError::from_write(e, DUPLICATE_PROMPT))?;

        info!("prompt {} ({}) created", created.id, created.name);
        Ok(created)
    }

    async fn update_prompt(
        &self,
        prompt_id: Uuid,
        changes: PromptChanges,
    ) -> Result<entities::Prompt, ServiceError> {
        if let Some(name) = &changes.name {
            require_text(name, "name")?;
        }
        if let Some(text) = &changes.text {
            require_text(text, "text")?;
        }

        self.prompts
            .update_prompt(prompt_id, changes)
            .await
            .map_err(|e| ServiceError::from_write(e, DUPLICATE_PROMPT))?
            .ok_or(ServiceError::NotFound("prompt"))
    }

    async fn toggle_prompt(&self, prompt_id: Uuid) -> Result<entities::Prompt, ServiceError> {
        let prompt = self
            .prompts
            .toggle_prompt(prompt_id)
            .await?
            .ok_or(ServiceError::NotFound("prompt"))?;

        info!(
            "prompt {} is now {}",
            prompt.id,
            if prompt.is_active { "active" } else { "inactive" }
        );
        Ok(prompt)
    }

    async fn delete_prompt(&self, prompt_id: Uuid) -> Result<(), ServiceError> {
        let prompt = self
            .prompts
            .find_prompt(prompt_id)
            .await?
            .ok_or(ServiceError::NotFound("prompt"))?;

        if prompt.is_default {
            return Err(ServiceError::InvalidState(
                "the default prompt cannot be deleted".to_owned(),
            ));
        }

        if self.prompts.delete_prompt(prompt_id).await? {
            Ok(())
        } else {
            Err(ServiceError::NotFound("prompt"))
        }
    }
}
