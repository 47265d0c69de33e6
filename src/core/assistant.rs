//! AI completion gateway.
//!

use crate::core::traits::CompletionGateway;
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::entities;
use crate::infrastructure::entities::MessageRole;
use async_trait::async_trait;
use di::{Ref, inject, injectable};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Speaker of a turn in the gateway's conversation format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnRole {
    User,
    Model,
}

impl TurnRole {
    /// Maps a stored message role onto a gateway turn. SYSTEM messages have no turn.
    pub fn from_message_role(role: MessageRole) -> Option<TurnRole> {
        match role {
            MessageRole::User => Some(TurnRole::User),
            MessageRole::Ai => Some(TurnRole::Model),
            MessageRole::System => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TurnRole::User => "user",
            TurnRole::Model => "model",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub role: TurnRole,
    pub text: String,
}

impl ChatTurn {
    pub fn from_message(message: entities::Message) -> Option<ChatTurn> {
        TurnRole::from_message_role(message.role).map(|role| ChatTurn {
            role,
            text: message.content,
        })
    }
}

/// Everything the gateway needs to produce the next reply.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub instruction: String,
    pub history: Vec<ChatTurn>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("completion gateway is not configured")]
    NotConfigured,

    #[error("invalid or expired API credential")]
    InvalidCredential,

    #[error("quota or rate limit exceeded")]
    QuotaExceeded,

    #[error("reply blocked by content safety filters")]
    ContentBlocked,

    #[error("completion timed out")]
    Timeout,

    #[error("completion failed: {0}")]
    Other(String),
}

impl GatewayError {
    /// Classifies a failed completion from the HTTP status and the error text.
    pub fn classify(status: Option<u16>, message: &str) -> GatewayError {
        let lower = message.to_lowercase();

        if matches!(status, Some(401) | Some(403))
            || lower.contains("api key")
            || lower.contains("api_key_invalid")
        {
            GatewayError::InvalidCredential
        } else if status == Some(429)
            || lower.contains("quota")
            || lower.contains("rate limit")
            || lower.contains("resource_exhausted")
        {
            GatewayError::QuotaExceeded
        } else if lower.contains("safety") || lower.contains("blocked") {
            GatewayError::ContentBlocked
        } else {
            GatewayError::Other(message.to_owned())
        }
    }
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    system_instruction: Content<'a>,
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize, Debug)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize, Debug)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
    temperature: f32,
    top_p: f32,
    top_k: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        GenerationConfig {
            max_output_tokens: 1000,
            temperature: 0.7,
            top_p: 0.8,
            top_k: 40,
        }
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize, Debug)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Deserialize, Debug)]
struct ErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

fn build_request(request: &CompletionRequest) -> GenerateContentRequest<'_> {
    let mut contents: Vec<Content<'_>> = request
        .history
        .iter()
        .map(|turn| Content {
            role: Some(turn.role.as_str()),
            parts: vec![Part { text: &turn.text }],
        })
        .collect();
    contents.push(Content {
        role: Some(TurnRole::User.as_str()),
        parts: vec![Part {
            text: &request.message,
        }],
    });

    GenerateContentRequest {
        system_instruction: Content {
            role: None,
            parts: vec![Part {
                text: &request.instruction,
            }],
        },
        contents,
        generation_config: GenerationConfig::default(),
    }
}

fn extract_text(response: GenerateContentResponse) -> Result<String, GatewayError> {
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        debug!("prompt blocked: {reason}");
        return Err(GatewayError::ContentBlocked);
    }

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| GatewayError::Other("no candidates returned".to_owned()))?;

    if candidate.finish_reason.as_deref() == Some("SAFETY") {
        return Err(GatewayError::ContentBlocked);
    }

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        Err(GatewayError::Other("empty response".to_owned()))
    } else {
        Ok(text)
    }
}

/// Google Gemini `generateContent` client.
pub struct GeminiGateway {
    client: reqwest::Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
}

#[injectable(CompletionGateway)]
impl GeminiGateway {
    #[inject]
    pub fn create(config: Ref<AppConfig>) -> GeminiGateway {
        GeminiGateway {
            client: reqwest::Client::new(),
            api_key: config.gemini_api_key.clone(),
            model: config.gemini_model.clone(),
            base_url: GEMINI_BASE_URL.to_owned(),
        }
    }
}

#[async_trait]
impl CompletionGateway for GeminiGateway {
    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, GatewayError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(GatewayError::NotConfigured);
        };

        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let response = self
            .client
            .post(url)
            .header(API_KEY_HEADER, api_key)
            .json(&build_request(request))
            .send()
            .await
            .map_err(|e| GatewayError::classify(None, &e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorEnvelope>(&body)
                .map(|e| format!("{} {}", e.error.status, e.error.message))
                .unwrap_or(body);
            warn!("gemini returned {status}: {message}");
            return Err(GatewayError::classify(Some(status.as_u16()), &message));
        }

        let body: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Other(e.to_string()))?;

        extract_text(body)
    }
}
