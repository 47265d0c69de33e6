//! Prompts endpoints

use crate::api::conversations::schemas::Deleted;
use crate::api::error::ApiError;
use crate::api::prompts::schemas::{CreatePrompt, PromptWithUsage, UpdatePrompt};
use crate::api::{ExtractUser, ValidatedJson, ValidatedPath};
use crate::core::traits::{NewPrompt, PromptService};
use crate::infrastructure::entities::Prompt;
use crate::infrastructure::traits::PromptChanges;
use axum::http::StatusCode;
use axum::routing::{get, patch};
use axum::{Json, Router};
use di_axum::Inject;
use uuid::Uuid;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_prompts).post(create_prompt))
        .route("/active", get(active_prompt))
        .route(
            "/:id",
            get(get_prompt).patch(update_prompt).delete(delete_prompt),
        )
        .route("/:id/toggle", patch(toggle_prompt))
}

async fn list_prompts(
    Inject(prompt_service): Inject<dyn PromptService>,
    ExtractUser(_current_user): ExtractUser,
) -> Result<Json<Vec<PromptWithUsage>>, ApiError> {
    let prompts = prompt_service.list_prompts().await?;
    Ok(Json(prompts.into_iter().map(PromptWithUsage::from).collect()))
}

async fn active_prompt(
    Inject(prompt_service): Inject<dyn PromptService>,
    ExtractUser(_current_user): ExtractUser,
) -> Result<Json<Prompt>, ApiError> {
    Ok(Json(prompt_service.active_prompt().await?))
}

async fn get_prompt(
    Inject(prompt_service): Inject<dyn PromptService>,
    ExtractUser(_current_user): ExtractUser,
    ValidatedPath(prompt_id): ValidatedPath<Uuid>,
) -> Result<Json<PromptWithUsage>, ApiError> {
    Ok(Json(prompt_service.get_prompt(prompt_id).await?.into()))
}

async fn create_prompt(
    Inject(prompt_service): Inject<dyn PromptService>,
    ExtractUser(_current_user): ExtractUser,
    ValidatedJson(prompt): ValidatedJson<CreatePrompt>,
) -> Result<(StatusCode, Json<Prompt>), ApiError> {
    let prompt = prompt_service
        .create_prompt(NewPrompt {
            name: prompt.name,
            description: prompt.description,
            text: prompt.text,
            is_active: prompt.is_active,
            is_default: prompt.is_default,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(prompt)))
}

async fn update_prompt(
    Inject(prompt_service): Inject<dyn PromptService>,
    ExtractUser(_current_user): ExtractUser,
    ValidatedPath(prompt_id): ValidatedPath<Uuid>,
    ValidatedJson(changes): ValidatedJson<UpdatePrompt>,
) -> Result<Json<Prompt>, ApiError> {
    let prompt = prompt_service
        .update_prompt(
            prompt_id,
            PromptChanges {
                name: changes.name,
                description: changes.description,
                text: changes.text,
                is_active: changes.is_active,
                is_default: changes.is_default,
            },
        )
        .await?;

    Ok(Json(prompt))
}

async fn toggle_prompt(
    Inject(prompt_service): Inject<dyn PromptService>,
    ExtractUser(_current_user): ExtractUser,
    ValidatedPath(prompt_id): ValidatedPath<Uuid>,
) -> Result<Json<Prompt>, ApiError> {
    Ok(Json(prompt_service.toggle_prompt(prompt_id).await?))
}

async fn delete_prompt(
    Inject(prompt_service): Inject<dyn PromptService>,
    ExtractUser(_current_user): ExtractUser,
    ValidatedPath(prompt_id): ValidatedPath<Uuid>,
) -> Result<Json<Deleted>, ApiError> {
    prompt_service.delete_prompt(prompt_id).await?;

    Ok(Json(Deleted {
        message: "prompt deleted",
    }))
}

pub mod schemas {
    use crate::infrastructure::entities;
    use serde::{Deserialize, Serialize};

    fn enabled() -> bool {
        true
    }

    #[derive(Deserialize, Debug)]
    #[serde(rename_all = "camelCase")]
    pub struct CreatePrompt {
        pub name: String,
        pub description: Option<String>,
        pub text: String,
        #[serde(default = "enabled")]
        pub is_active: bool,
        #[serde(default)]
        pub is_default: bool,
    }

    #[derive(Deserialize, Debug, Default)]
    #[serde(rename_all = "camelCase")]
    pub struct UpdatePrompt {
        pub name: Option<String>,
        pub description: Option<String>,
        pub text: Option<String>,
        pub is_active: Option<bool>,
        pub is_default: Option<bool>,
    }

    #[derive(Serialize, Debug)]
    #[serde(rename_all = "camelCase")]
    pub struct PromptWithUsage {
        #[serde(flatten)]
        pub prompt: entities::Prompt,
        pub conversation_count: i64,
        pub message_count: i64,
    }

    impl From<entities::PromptUsage> for PromptWithUsage {
        fn from(usage: entities::PromptUsage) -> Self {
            PromptWithUsage {
                prompt: usage.prompt,
                conversation_count: usage.conversation_count,
                message_count: usage.message_count,
            }
        }
    }
}
