//! Messages endpoints

use crate::api::conversations::schemas::Deleted;
use crate::api::error::ApiError;
use crate::api::messages::schemas::{CreateMessage, Page};
use crate::api::{ExtractUser, ValidatedJson, ValidatedPath, ValidatedQuery};
use crate::core::traits::MessageService;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use di_axum::Inject;
use uuid::Uuid;

pub const DEFAULT_PAGE_SIZE: i64 = 100;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_message))
        .route("/conversation/:conversation_id", get(conversation_messages))
        .route("/:id", get(get_message).delete(delete_message))
}

async fn conversation_messages(
    Inject(message_service): Inject<dyn MessageService>,
    ExtractUser(_current_user): ExtractUser,
    ValidatedPath(conversation_id): ValidatedPath<Uuid>,
    ValidatedQuery(page): ValidatedQuery<Page>,
) -> Result<Json<Vec<schemas::Message>>, ApiError> {
    let messages = message_service
        .list_messages(
            conversation_id,
            page.limit.unwrap_or(DEFAULT_PAGE_SIZE).max(0),
            page.offset.unwrap_or(0).max(0),
        )
        .await?;

    Ok(Json(
        messages.into_iter().map(schemas::Message::from).collect(),
    ))
}

async fn get_message(
    Inject(message_service): Inject<dyn MessageService>,
    ExtractUser(_current_user): ExtractUser,
    ValidatedPath(message_id): ValidatedPath<Uuid>,
) -> Result<Json<schemas::Message>, ApiError> {
    Ok(Json(message_service.get_message(message_id).await?.into()))
}

async fn create_message(
    Inject(message_service): Inject<dyn MessageService>,
    ExtractUser(current_user): ExtractUser,
    ValidatedJson(message): ValidatedJson<CreateMessage>,
) -> Result<(StatusCode, Json<schemas::Message>), ApiError> {
    let message = message_service
        .create_message(
            current_user,
            message.conversation_id,
            message.role,
            message.content,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(message.into())))
}

async fn delete_message(
    Inject(message_service): Inject<dyn MessageService>,
    ExtractUser(current_user): ExtractUser,
    ValidatedPath(message_id): ValidatedPath<Uuid>,
) -> Result<Json<Deleted>, ApiError> {
    message_service
        .delete_message(current_user, message_id)
        .await?;

    Ok(Json(Deleted {
        message: "message deleted",
    }))
}

pub mod schemas {
    use crate::infrastructure::entities;
    use crate::infrastructure::entities::MessageRole;
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Serialize};
    use uuid::Uuid;

    #[derive(Deserialize, Debug, Default)]
    pub struct Page {
        pub limit: Option<i64>,
        pub offset: Option<i64>,
    }

    #[derive(Deserialize, Debug)]
    #[serde(rename_all = "camelCase")]
    pub struct CreateMessage {
        pub conversation_id: Uuid,
        pub content: String,
        pub role: MessageRole,
    }

    #[derive(Serialize, Debug)]
    pub struct PromptRef {
        pub id: Uuid,
        pub name: String,
    }

    #[derive(Serialize, Debug)]
    #[serde(rename_all = "camelCase")]
    pub struct Message {
        #[serde(flatten)]
        pub message: entities::Message,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub prompt: Option<PromptRef>,
    }

    impl From<entities::Message> for Message {
        fn from(message: entities::Message) -> Self {
            Message {
                message,
                prompt: None,
            }
        }
    }

    impl From<entities::MessageWithPrompt> for Message {
        fn from(message: entities::MessageWithPrompt) -> Self {
            let prompt = message
                .message
                .prompt_id
                .zip(message.prompt_name)
                .map(|(id, name)| PromptRef { id, name });

            Message {
                message: message.message,
                prompt,
            }
        }
    }
}
