//! Chat endpoint: one user message in, user and AI message out.

use crate::api::chat::schemas::SendMessage;
use crate::api::error::ApiError;
use crate::api::{ExtractUser, ValidatedJson};
use crate::core::traits::{ChatExchange, ChatService};
use axum::routing::post;
use axum::{Json, Router};
use di_axum::Inject;

pub fn router() -> Router {
    Router::new().route("/", post(send_message))
}

async fn send_message(
    Inject(chat_service): Inject<dyn ChatService>,
    ExtractUser(current_user): ExtractUser,
    ValidatedJson(request): ValidatedJson<SendMessage>,
) -> Result<Json<ChatExchange>, ApiError> {
    let exchange = chat_service
        .send_message(current_user, request.conversation_id, request.message)
        .await?;

    Ok(Json(exchange))
}

pub mod schemas {
    use serde::Deserialize;
    use uuid::Uuid;

    #[derive(Deserialize, Debug)]
    #[serde(rename_all = "camelCase")]
    pub struct SendMessage {
        pub conversation_id: Uuid,
        pub message: String,
    }
}
