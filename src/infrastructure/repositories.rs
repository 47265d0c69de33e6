//! DB Repository abstractions

use crate::infrastructure::database::DatabaseConnection;
use crate::infrastructure::entities::{
    Channel, Conversation, ConversationPoint, ConversationStatus, ConversationSummary,
    ConversationTotals, Message, MessageRole, MessageTotals, MessageWithPrompt, Prompt,
    PromptLabel, PromptRatingStats, PromptUsage,
};
use crate::infrastructure::traits::{
    AnalyticsRepository, ConversationFilter, ConversationRepository, MessageRepository,
    PromptChanges, PromptRepository,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use di::{Ref, injectable};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use uuid::Uuid;

const CONVERSATION_SUMMARY_SELECT: &str = "SELECT conversations.*, prompts.name AS prompt_name, prompts.description AS prompt_description, (SELECT COUNT(*) FROM messages WHERE messages.conversation_id = conversations.id) AS message_count FROM conversations LEFT JOIN prompts ON prompts.id = conversations.prompt_id";

const MESSAGE_WITH_PROMPT_SELECT: &str = "SELECT messages.*, prompts.name AS prompt_name FROM messages LEFT JOIN prompts ON prompts.id = messages.prompt_id";

const PROMPT_USAGE_SELECT: &str = "SELECT prompts.*, (SELECT COUNT(*) FROM conversations WHERE conversations.prompt_id = prompts.id) AS conversation_count, (SELECT COUNT(*) FROM messages WHERE messages.prompt_id = prompts.id) AS message_count FROM prompts";

#[injectable(ConversationRepository)]
pub struct DbConversationRepository {
    connection: Ref<DatabaseConnection>,
}

impl DbConversationRepository {
    fn pool(&self) -> &SqlitePool {
        &self.connection
    }
}

#[async_trait]
impl ConversationRepository for DbConversationRepository {
    async fn list_conversations(
        &self,
        filter: &ConversationFilter,
    ) -> Result<Vec<ConversationSummary>, sqlx::Error> {
        sqlx::query_as(&format!(
            "{CONVERSATION_SUMMARY_SELECT} WHERE (?1 IS NULL OR conversations.status = ?1) AND (?2 IS NULL OR conversations.channel = ?2) ORDER BY conversations.start_date DESC LIMIT ?3 OFFSET ?4"
        ))
        .bind(filter.status)
        .bind(filter.channel)
        .bind(filter.limit)
        .bind(filter.offset)
        .fetch_all(self.pool())
        .await
    }

    async fn find_conversation(
        &self,
        conversation_id: Uuid,
    ) -> Result<Option<Conversation>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM conversations WHERE id = ?")
            .bind(conversation_id)
            .fetch_optional(self.pool())
            .await
    }

    async fn find_conversation_summary(
        &self,
        conversation_id: Uuid,
    ) -> Result<Option<ConversationSummary>, sqlx::Error> {
        sqlx::query_as(&format!(
            "{CONVERSATION_SUMMARY_SELECT} WHERE conversations.id = ?"
        ))
        .bind(conversation_id)
        .fetch_optional(self.pool())
        .await
    }

    async fn create_conversation(
        &self,
        conversation: Conversation,
    ) -> Result<Conversation, sqlx::Error> {
        sqlx::query_as(
            "INSERT INTO conversations (id, user_id, channel, status, rating, start_date, end_date, duration, prompt_id) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING *",
        )
        .bind(conversation.id)
        .bind(conversation.user_id)
        .bind(conversation.channel)
        .bind(conversation.status)
        .bind(conversation.rating)
        .bind(conversation.start_date)
        .bind(conversation.end_date)
        .bind(conversation.duration)
        .bind(conversation.prompt_id)
        .fetch_one(self.pool())
        .await
    }

    async fn close_conversation(
        &self,
        conversation_id: Uuid,
        end_date: DateTime<Utc>,
        duration: i64,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE conversations SET status = ?, end_date = ?, duration = ? WHERE id = ? AND end_date IS NULL",
        )
        .bind(ConversationStatus::Closed)
        .bind(end_date)
        .bind(duration)
        .bind(conversation_id)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_rating(&self, conversation_id: Uuid, rating: i64) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE conversations SET rating = ? WHERE id = ?")
            .bind(rating)
            .bind(conversation_id)
            .execute(self.pool())
            .await
            .map(|_| ())
    }

    async fn delete_conversation(&self, conversation_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM conversations WHERE id = ?")
            .bind(conversation_id)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[injectable(MessageRepository)]
pub struct DbMessageRepository {
    connection: Ref<DatabaseConnection>,
}

impl DbMessageRepository {
    fn pool(&self) -> &SqlitePool {
        &self.connection
    }
}

#[async_trait]
impl MessageRepository for DbMessageRepository {
    async fn list_messages(
        &self,
        conversation_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<MessageWithPrompt>, sqlx::Error> {
        sqlx::query_as(&format!(
            "{MESSAGE_WITH_PROMPT_SELECT} WHERE messages.conversation_id = ? ORDER BY messages.timestamp ASC, messages.rowid ASC LIMIT ? OFFSET ?"
        ))
        .bind(conversation_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool())
        .await
    }

    async fn find_message(
        &self,
        message_id: Uuid,
    ) -> Result<Option<MessageWithPrompt>, sqlx::Error> {
        sqlx::query_as(&format!(
            "{MESSAGE_WITH_PROMPT_SELECT} WHERE messages.id = ?"
        ))
        .bind(message_id)
        .fetch_optional(self.pool())
        .await
    }

    async fn create_message(&self, message: Message) -> Result<Message, sqlx::Error> {
        sqlx::query_as(
            "INSERT INTO messages (id, conversation_id, role, content, timestamp, response_time, prompt_id) VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING *",
        )
        .bind(message.id)
        .bind(message.conversation_id)
        .bind(message.role)
        .bind(message.content)
        .bind(message.timestamp)
        .bind(message.response_time)
        .bind(message.prompt_id)
        .fetch_one(self.pool())
        .await
    }

    async fn delete_message(&self, message_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM messages WHERE id = ?")
            .bind(message_id)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn recent_dialogue(
        &self,
        conversation_id: Uuid,
        exclude: Uuid,
        limit: i64,
    ) -> Result<Vec<Message>, sqlx::Error> {
        let mut messages: Vec<Message> = sqlx::query_as(
            "SELECT * FROM messages WHERE conversation_id = ? AND id != ? AND role != ? ORDER BY timestamp DESC, rowid DESC LIMIT ?",
        )
        .bind(conversation_id)
        .bind(exclude)
        .bind(MessageRole::System)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        messages.reverse();
        Ok(messages)
    }

    async fn message_timeline(
        &self,
        conversation_id: Uuid,
    ) -> Result<Vec<(MessageRole, DateTime<Utc>)>, sqlx::Error> {
        sqlx::query_as(
            "SELECT role, timestamp FROM messages WHERE conversation_id = ? ORDER BY timestamp ASC, rowid ASC",
        )
        .bind(conversation_id)
        .fetch_all(self.pool())
        .await
    }
}

#[injectable(PromptRepository)]
pub struct DbPromptRepository {
    connection: Ref<DatabaseConnection>,
}

impl DbPromptRepository {
    fn pool(&self) -> &SqlitePool {
        &self.connection
    }
}

#[async_trait]
impl PromptRepository for DbPromptRepository {
    async fn list_prompts(&self) -> Result<Vec<PromptUsage>, sqlx::Error> {
        sqlx::query_as(&format!(
            "{PROMPT_USAGE_SELECT} ORDER BY prompts.is_default DESC, prompts.is_active DESC, prompts.created_at ASC"
        ))
        .fetch_all(self.pool())
        .await
    }

    async fn find_prompt(&self, prompt_id: Uuid) -> Result<Option<Prompt>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM prompts WHERE id = ?")
            .bind(prompt_id)
            .fetch_optional(self.pool())
            .await
    }

    async fn find_prompt_usage(&self, prompt_id: Uuid) -> Result<Option<PromptUsage>, sqlx::Error> {
        sqlx::query_as(&format!("{PROMPT_USAGE_SELECT} WHERE prompts.id = ?"))
            .bind(prompt_id)
            .fetch_optional(self.pool())
            .await
    }

    async fn current_prompt(&self) -> Result<Option<Prompt>, sqlx::Error> {
        sqlx::query_as(
            "SELECT * FROM prompts WHERE is_default = 1 OR is_active = 1 ORDER BY is_default DESC, created_at ASC LIMIT 1",
        )
        .fetch_optional(self.pool())
        .await
    }

    async fn create_prompt(&self, prompt: Prompt) -> Result<Prompt, sqlx::Error> {
        let mut tx = self.pool().begin().await?;

        if prompt.is_default {
            sqlx::query("UPDATE prompts SET is_default = 0 WHERE is_default = 1")
                .execute(&mut *tx)
                .await?;
        }
        if prompt.is_active {
            sqlx::query("UPDATE prompts SET is_active = 0 WHERE is_active = 1")
                .execute(&mut *tx)
                .await?;
        }

        let created = sqlx::query_as(
            "INSERT INTO prompts (id, name, description, text, is_active, is_default, created_at) VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING *",
        )
        .bind(prompt.id)
        .bind(prompt.name)
        .bind(prompt.description)
        .bind(prompt.text)
        .bind(prompt.is_active)
        .bind(prompt.is_default)
        .bind(prompt.created_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(created)
    }

    async fn update_prompt(
        &self,
        prompt_id: Uuid,
        changes: PromptChanges,
    ) -> Result<Option<Prompt>, sqlx::Error> {
        let mut tx = self.pool().begin().await?;

        if changes.is_default == Some(true) {
            sqlx::query("UPDATE prompts SET is_default = 0 WHERE is_default = 1 AND id != ?")
                .bind(prompt_id)
                .execute(&mut *tx)
                .await?;
        }
        if changes.is_active == Some(true) {
            sqlx::query("UPDATE prompts SET is_active = 0 WHERE is_active = 1 AND id != ?")
                .bind(prompt_id)
                .execute(&mut *tx)
                .await?;
        }

        let updated: Option<Prompt> = sqlx::query_as(
            "UPDATE prompts SET name = COALESCE(?, name), description = COALESCE(?, description), text = COALESCE(?, text), is_active = COALESCE(?, is_active), is_default = COALESCE(?, is_default) WHERE id = ? RETURNING *",
        )
        .bind(changes.name)
        .bind(changes.description)
        .bind(changes.text)
        .bind(changes.is_active)
        .bind(changes.is_default)
        .bind(prompt_id)
        .fetch_optional(&mut *tx)
        .await?;

        // an unknown id leaves the flags of the other prompts alone
        if updated.is_some() {
            tx.commit().await?;
        } else {
            tx.rollback().await?;
        }
        Ok(updated)
    }

    async fn toggle_prompt(&self, prompt_id: Uuid) -> Result<Option<Prompt>, sqlx::Error> {
        let mut tx = self.pool().begin().await?;

        // Only when the target is currently inactive, i.e. about to be activated.
        sqlx::query(
            "UPDATE prompts SET is_active = 0 WHERE is_active = 1 AND id != ?1 AND EXISTS (SELECT 1 FROM prompts WHERE id = ?1 AND is_active = 0)",
        )
        .bind(prompt_id)
        .execute(&mut *tx)
        .await?;

        let toggled: Option<Prompt> =
            sqlx::query_as("UPDATE prompts SET is_active = NOT is_active WHERE id = ? RETURNING *")
                .bind(prompt_id)
                .fetch_optional(&mut *tx)
                .await?;

        tx.commit().await?;
        Ok(toggled)
    }

    async fn delete_prompt(&self, prompt_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM prompts WHERE id = ?")
            .bind(prompt_id)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn prompt_labels(&self, ids: &[Uuid]) -> Result<Vec<PromptLabel>, sqlx::Error> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder =
            QueryBuilder::<Sqlite>::new("SELECT id, name, description FROM prompts WHERE id IN (");
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        builder
            .build_query_as::<PromptLabel>()
            .fetch_all(self.pool())
            .await
    }
}

#[injectable(AnalyticsRepository)]
pub struct DbAnalyticsRepository {
    connection: Ref<DatabaseConnection>,
}

impl DbAnalyticsRepository {
    fn pool(&self) -> &SqlitePool {
        &self.connection
    }
}

#[async_trait]
impl AnalyticsRepository for DbAnalyticsRepository {
    async fn conversation_totals(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<ConversationTotals, sqlx::Error> {
        sqlx::query_as(
            "SELECT COUNT(*) AS conversations, \
             COALESCE(SUM(CASE WHEN status = 'OPEN' THEN 1 ELSE 0 END), 0) AS open_conversations, \
             COALESCE(SUM(CASE WHEN rating IS NOT NULL THEN 1 ELSE 0 END), 0) AS rated_conversations, \
             COALESCE(SUM(CASE WHEN rating >= 4 THEN 1 ELSE 0 END), 0) AS satisfied_conversations, \
             AVG(rating) AS average_rating \
             FROM conversations WHERE (?1 IS NULL OR start_date >= ?1)",
        )
        .bind(since)
        .fetch_one(self.pool())
        .await
    }

    async fn message_totals(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<MessageTotals, sqlx::Error> {
        sqlx::query_as(
            "SELECT COUNT(*) AS messages, \
             AVG(CASE WHEN messages.role = 'AI' THEN messages.response_time END) AS average_response_time \
             FROM messages INNER JOIN conversations ON conversations.id = messages.conversation_id \
             WHERE (?1 IS NULL OR conversations.start_date >= ?1)",
        )
        .bind(since)
        .fetch_one(self.pool())
        .await
    }

    async fn channel_counts(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<(Channel, i64)>, sqlx::Error> {
        sqlx::query_as(
            "SELECT channel, COUNT(*) AS count FROM conversations WHERE (?1 IS NULL OR start_date >= ?1) GROUP BY channel ORDER BY count DESC, channel ASC",
        )
        .bind(since)
        .fetch_all(self.pool())
        .await
    }

    async fn status_counts(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<(ConversationStatus, i64)>, sqlx::Error> {
        sqlx::query_as(
            "SELECT status, COUNT(*) AS count FROM conversations WHERE (?1 IS NULL OR start_date >= ?1) GROUP BY status ORDER BY status ASC",
        )
        .bind(since)
        .fetch_all(self.pool())
        .await
    }

    async fn conversation_points(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<ConversationPoint>, sqlx::Error> {
        sqlx::query_as(
            "SELECT start_date, status, rating FROM conversations WHERE start_date >= ?",
        )
        .bind(since)
        .fetch_all(self.pool())
        .await
    }

    async fn rating_counts(&self) -> Result<Vec<(i64, i64)>, sqlx::Error> {
        sqlx::query_as(
            "SELECT rating, COUNT(*) AS count FROM conversations WHERE rating IS NOT NULL GROUP BY rating ORDER BY rating ASC",
        )
        .fetch_all(self.pool())
        .await
    }

    async fn prompt_rating_stats(&self) -> Result<Vec<PromptRatingStats>, sqlx::Error> {
        sqlx::query_as(
            "SELECT prompt_id, AVG(rating) AS average_rating, COUNT(*) AS conversation_count FROM conversations WHERE prompt_id IS NOT NULL AND rating IS NOT NULL GROUP BY prompt_id",
        )
        .fetch_all(self.pool())
        .await
    }
}
