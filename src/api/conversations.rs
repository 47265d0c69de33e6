//! Conversations endpoints

use crate::api::conversations::schemas::{
    ConversationQuery, CreateConversation, Deleted, UpdateConversation,
};
use crate::api::error::ApiError;
use crate::api::{ExtractUser, ValidatedJson, ValidatedPath, ValidatedQuery};
use crate::core::traits::{ConversationService, ConversationStats, ConversationUpdate};
use crate::infrastructure::traits::ConversationFilter;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use di_axum::Inject;
use uuid::Uuid;

pub const DEFAULT_PAGE_SIZE: i64 = 50;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_conversations).post(new_conversation))
        .route(
            "/:id",
            get(get_conversation)
                .patch(update_conversation)
                .delete(delete_conversation),
        )
        .route("/:id/stats", get(conversation_stats))
}

async fn list_conversations(
    Inject(conversation_service): Inject<dyn ConversationService>,
    ExtractUser(_current_user): ExtractUser,
    ValidatedQuery(query): ValidatedQuery<ConversationQuery>,
) -> Result<Json<Vec<schemas::Conversation>>, ApiError> {
    let conversations = conversation_service
        .list_conversations(ConversationFilter {
            status: query.status,
            channel: query.channel,
            limit: query.limit.unwrap_or(DEFAULT_PAGE_SIZE).max(0),
            offset: query.offset.unwrap_or(0).max(0),
        })
        .await?;

    Ok(Json(
        conversations
            .into_iter()
            .map(schemas::Conversation::from)
            .collect(),
    ))
}

async fn get_conversation(
    Inject(conversation_service): Inject<dyn ConversationService>,
    ExtractUser(_current_user): ExtractUser,
    ValidatedPath(conversation_id): ValidatedPath<Uuid>,
) -> Result<Json<schemas::Conversation>, ApiError> {
    let conversation = conversation_service
        .get_conversation(conversation_id)
        .await?;

    Ok(Json(conversation.into()))
}

async fn new_conversation(
    Inject(conversation_service): Inject<dyn ConversationService>,
    ExtractUser(current_user): ExtractUser,
    ValidatedJson(create_conversation): ValidatedJson<CreateConversation>,
) -> Result<(StatusCode, Json<schemas::Conversation>), ApiError> {
    let conversation = conversation_service
        .create_conversation(
            current_user,
            create_conversation.channel,
            create_conversation.status,
        )
        .await?;

    // reload to include the assigned prompt
    let conversation = conversation_service
        .get_conversation(conversation.id)
        .await?;

    Ok((StatusCode::CREATED, Json(conversation.into())))
}

async fn update_conversation(
    Inject(conversation_service): Inject<dyn ConversationService>,
    ExtractUser(current_user): ExtractUser,
    ValidatedPath(conversation_id): ValidatedPath<Uuid>,
    ValidatedJson(update): ValidatedJson<UpdateConversation>,
) -> Result<Json<schemas::Conversation>, ApiError> {
    let conversation = conversation_service
        .update_conversation(
            current_user,
            conversation_id,
            ConversationUpdate {
                status: update.status,
                rating: update.rating,
            },
        )
        .await?;

    Ok(Json(conversation.into()))
}

async fn delete_conversation(
    Inject(conversation_service): Inject<dyn ConversationService>,
    ExtractUser(current_user): ExtractUser,
    ValidatedPath(conversation_id): ValidatedPath<Uuid>,
) -> Result<Json<Deleted>, ApiError> {
    conversation_service
        .delete_conversation(current_user, conversation_id)
        .await?;

    Ok(Json(Deleted {
        message: "conversation deleted",
    }))
}

async fn conversation_stats(
    Inject(conversation_service): Inject<dyn ConversationService>,
    ExtractUser(_current_user): ExtractUser,
    ValidatedPath(conversation_id): ValidatedPath<Uuid>,
) -> Result<Json<ConversationStats>, ApiError> {
    Ok(Json(
        conversation_service
            .conversation_stats(conversation_id)
            .await?,
    ))
}

pub mod schemas {
    use crate::infrastructure::entities;
    use crate::infrastructure::entities::{Channel, ConversationStatus};
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Serialize};
    use uuid::Uuid;

    #[derive(Deserialize, Debug, Default)]
    pub struct ConversationQuery {
        pub status: Option<ConversationStatus>,
        pub channel: Option<Channel>,
        pub limit: Option<i64>,
        pub offset: Option<i64>,
    }

    #[derive(Deserialize, Debug, Default)]
    #[serde(default)]
    pub struct CreateConversation {
        pub channel: Channel,
        pub status: ConversationStatus,
    }

    /// Only status and rating can change; unknown fields are rejected.
    #[derive(Deserialize, Debug, Default)]
    #[serde(deny_unknown_fields)]
    pub struct UpdateConversation {
        pub status: Option<ConversationStatus>,
        pub rating: Option<i64>,
    }

    #[derive(Serialize, Debug)]
    pub struct PromptRef {
        pub id: Uuid,
        pub name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub description: Option<String>,
    }

    #[derive(Serialize, Debug)]
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
        pub prompt: Option<PromptRef>,
        pub message_count: i64,
    }

    impl From<entities::ConversationSummary> for Conversation {
        fn from(summary: entities::ConversationSummary) -> Self {
            let conversation = summary.conversation;
            let prompt = conversation
                .prompt_id
                .zip(summary.prompt_name)
                .map(|(id, name)| PromptRef {
                    id,
                    name,
                    description: summary.prompt_description,
                });

            Conversation {
                id: conversation.id,
                user_id: conversation.user_id,
                channel: conversation.channel,
                status: conversation.status,
                rating: conversation.rating,
                start_date: conversation.start_date,
                end_date: conversation.end_date,
                duration: conversation.duration,
                prompt_id: conversation.prompt_id,
                prompt,
                message_count: summary.message_count,
            }
        }
    }

    #[derive(Serialize, Debug)]
    pub struct Deleted {
        pub message: &'static str,
    }
}
