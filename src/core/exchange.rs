//! Chat exchange: user message in, AI reply out.

use crate::core::assistant::{ChatTurn, CompletionRequest, GatewayError};
use crate::core::errors::ServiceError;
use crate::core::realtime::RealtimeEvent;
use crate::core::replies::ReplyTemplates;
use crate::core::traits::{ChatExchange, ChatService, CompletionGateway, RealtimeNotifier};
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::entities::{Conversation, Message, MessageRole};
use crate::infrastructure::traits::{ConversationRepository, MessageRepository, PromptRepository};
use async_trait::async_trait;
use chrono::Utc;
use di::{Ref, inject, injectable};
use log::{error, info, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OwnedMutexGuard;
use tokio::time::{Instant, timeout};
use uuid::Uuid;

/// Number of earlier messages handed to the gateway as context.
pub const CONTEXT_WINDOW: i64 = 10;

/// Async mutex per conversation, so that sends on the same conversation run one at a time.
pub struct ConversationLocks {
    locks: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}

#[injectable]
impl ConversationLocks {
    #[inject]
    pub fn create() -> ConversationLocks {
        ConversationLocks {
            locks: Mutex::new(HashMap::new()),
        }
    }
}

impl ConversationLocks {
    pub async fn acquire(&self, conversation_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            // entries nobody holds or waits for
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(conversation_id).or_default().clone()
        };

        lock.lock_owned().await
    }

    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[injectable(ChatService)]
pub struct MessageExchange {
    conversations: Ref<dyn ConversationRepository>,
    messages: Ref<dyn MessageRepository>,
    prompts: Ref<dyn PromptRepository>,
    gateway: Ref<dyn CompletionGateway>,
    notifier: Ref<dyn RealtimeNotifier>,
    replies: Ref<ReplyTemplates>,
    locks: Ref<ConversationLocks>,
    config: Ref<AppConfig>,
}

impl MessageExchange {
    async fn writable_conversation(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
    ) -> Result<Conversation, ServiceError> {
        let conversation = self
            .conversations
            .find_conversation(conversation_id)
            .await?
            .ok_or(ServiceError::NotFound("conversation"))?;

        if conversation.user_id != user_id {
            return Err(ServiceError::Forbidden);
        }
        if conversation.is_closed() {
            return Err(ServiceError::InvalidState(
                "conversation is closed".to_owned(),
            ));
        }

        Ok(conversation)
    }

    async fn instruction_for(&self, conversation: &Conversation) -> String {
        let Some(prompt_id) = conversation.prompt_id else {
            return self.replies.default_instruction();
        };

        match self.prompts.find_prompt(prompt_id).await {
            Ok(Some(prompt)) => prompt.text,
            Ok(None) => self.replies.default_instruction(),
            Err(e) => {
                warn!("failed to load prompt {prompt_id}: {e}");
                self.replies.default_instruction()
            }
        }
    }

    /// Produces the reply text. Never fails: gateway problems become substitute replies.
    async fn generate_reply(
        &self,
        conversation: &Conversation,
        user_message: &Message,
    ) -> String {
        let history = match self
            .messages
            .recent_dialogue(conversation.id, user_message.id, CONTEXT_WINDOW)
            .await
        {
            Ok(history) => history,
            Err(e) => {
                error!("failed to load context for {}: {e}", conversation.id);
                return self
                    .replies
                    .for_failure(&GatewayError::Other(e.to_string()), &user_message.content);
            }
        };

        if !self.gateway.is_available() {
            return self
                .replies
                .for_failure(&GatewayError::NotConfigured, &user_message.content);
        }

        let request = CompletionRequest {
            instruction: self.instruction_for(conversation).await,
            history: history
                .into_iter()
                .filter_map(ChatTurn::from_message)
                .collect(),
            message: user_message.content.clone(),
        };

        let result = match timeout(self.config.ai_timeout, self.gateway.complete(&request)).await
        {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout),
        };

        result.unwrap_or_else(|e| {
            error!(
                "completion failed for conversation {}: {e}",
                conversation.id
            );
            self.replies.for_failure(&e, &user_message.content)
        })
    }
}

#[async_trait]
impl ChatService for MessageExchange {
    async fn send_message(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
        text: String,
    ) -> Result<ChatExchange, ServiceError> {
        if text.trim().is_empty() {
            return Err(ServiceError::Validation("message must not be empty".to_owned()));
        }

        let _guard = self.locks.acquire(conversation_id).await;
        let conversation = self.writable_conversation(user_id, conversation_id).await?;

        let user_message = self
            .messages
            .create_message(Message {
                id: Uuid::new_v4(),
                conversation_id,
                role: MessageRole::User,
                content: text,
                timestamp: Utc::now(),
                response_time: None,
                prompt_id: None,
            })
            .await?;

        self.notifier.publish(
            conversation_id,
            RealtimeEvent::AiTyping {
                conversation_id,
                is_typing: true,
            },
        );

        let started = Instant::now();
        let reply = self.generate_reply(&conversation, &user_message).await;
        let response_time = started.elapsed().as_secs() as i64;

        let ai_message = self
            .messages
            .create_message(Message {
                id: Uuid::new_v4(),
                conversation_id,
                role: MessageRole::Ai,
                content: reply,
                timestamp: Utc::now(),
                response_time: Some(response_time),
                prompt_id: conversation.prompt_id,
            })
            .await;

        self.notifier.publish(
            conversation_id,
            RealtimeEvent::AiTyping {
                conversation_id,
                is_typing: false,
            },
        );
        let ai_message = ai_message?;

        self.notifier.publish(
            conversation_id,
            RealtimeEvent::NewMessage {
                message: ai_message.clone(),
            },
        );
        info!("conversation {conversation_id}: replied in {response_time}s");

        Ok(ChatExchange {
            user_message,
            ai_message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_locks_serialize_same_conversation() {
        let locks = Arc::new(ConversationLocks::create());
        let conversation = Uuid::new_v4();

        let guard = locks.acquire(conversation).await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire(conversation).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn test_locks_do_not_block_other_conversations() {
        let locks = ConversationLocks::create();
        let _first = locks.acquire(Uuid::new_v4()).await;

        let second = tokio::time::timeout(
            Duration::from_millis(100),
            locks.acquire(Uuid::new_v4()),
        )
        .await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn test_released_locks_are_pruned() {
        let locks = ConversationLocks::create();
        for _ in 0..5 {
            let _guard = locks.acquire(Uuid::new_v4()).await;
        }

        let _guard = locks.acquire(Uuid::new_v4()).await;
        assert_eq!(locks.len(), 1);
    }
}
