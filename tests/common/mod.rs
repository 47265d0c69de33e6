//! Shared fixtures for the integration suites.
//!
//! The `more-di` container builds its own `DatabaseConnection`, so the suites hand it an
//! in-memory pool through `DatabaseConnection::set_test_pool()` and run `#[serial]`.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use chrono::{DateTime, Duration, Utc};
use conversation_analytics_api::api;
use conversation_analytics_api::api::auth::issue_token;
use conversation_analytics_api::core::assistant::{CompletionRequest, GatewayError};
use conversation_analytics_api::core::traits::CompletionGateway;
use conversation_analytics_api::infrastructure::config::AppConfig;
use conversation_analytics_api::infrastructure::database::DatabaseConnection;
use conversation_analytics_api::infrastructure::entities::{
    Channel, ConversationStatus, MessageRole,
};
use conversation_analytics_api::service_collection;
use di::{Injectable, ServiceDescriptor, ServiceProvider, inject, injectable};
use di_axum::RouterServiceProviderExtensions;
use serde_json::Value;
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use tower::ServiceExt;
use uuid::Uuid;

/// Counter for unique test database URIs
static TEST_DB_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Setup an in-memory database with migrations and make DI use it.
pub async fn setup_test_db() -> SqlitePool {
    let db_num = TEST_DB_COUNTER.fetch_add(1, Ordering::SeqCst);
    let db_url = format!("sqlite:file:testdb{db_num}?mode=memory&cache=shared");

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect(&db_url)
        .await
        .unwrap();
    sqlx::migrate!().run(&pool).await.unwrap();

    DatabaseConnection::set_test_pool(pool.clone());

    pool
}

pub fn cleanup_test_db() {
    DatabaseConnection::clear_test_pool();
}

/// Router plus the provider behind it, with `gateway` as completion backend.
pub fn create_test_app_with(gateway: impl Into<ServiceDescriptor>) -> (axum::Router, ServiceProvider) {
    let mut services = service_collection();
    services.add(gateway.into());
    let provider = services.build_provider().unwrap();

    (api::router().with_provider(provider.clone()), provider)
}

pub fn create_test_app() -> axum::Router {
    create_test_app_with(EchoGateway::singleton()).0
}

pub fn token_for(user_id: Uuid) -> String {
    let config = AppConfig::from_env();
    issue_token(user_id, &config.jwt_secret, config.jwt_expires_in).unwrap()
}

/// Sends one request as `user` and returns the status with the decoded JSON body.
pub async fn call(
    app: &axum::Router,
    method: Method,
    uri: &str,
    user: Option<Uuid>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        request = request.header("Authorization", format!("Bearer {}", token_for(user)));
    }
    let request = match body {
        Some(body) => request
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };

    (status, json)
}

pub async fn insert_prompt(pool: &SqlitePool, name: &str, active: bool, default: bool) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO prompts (id, name, description, text, is_active, is_default, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(name)
    .bind(format!("{name} description"))
    .bind(format!("You are the {name} assistant."))
    .bind(active)
    .bind(default)
    .bind(Utc::now())
    .execute(pool)
    .await
    .unwrap();
    id
}

pub async fn insert_conversation(
    pool: &SqlitePool,
    user_id: Uuid,
    status: ConversationStatus,
    rating: Option<i64>,
    start_date: DateTime<Utc>,
    prompt_id: Option<Uuid>,
) -> Uuid {
    let id = Uuid::new_v4();
    let closed = status == ConversationStatus::Closed;
    sqlx::query(
        "INSERT INTO conversations (id, user_id, channel, status, rating, start_date, end_date, duration, prompt_id) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(user_id)
    .bind(Channel::Web)
    .bind(status)
    .bind(rating)
    .bind(start_date)
    .bind(closed.then_some(start_date + Duration::minutes(5)))
    .bind(closed.then_some(300i64))
    .bind(prompt_id)
    .execute(pool)
    .await
    .unwrap();
    id
}

pub async fn insert_message(
    pool: &SqlitePool,
    conversation_id: Uuid,
    role: MessageRole,
    content: &str,
    timestamp: DateTime<Utc>,
) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO messages (id, conversation_id, role, content, timestamp) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(conversation_id)
    .bind(role)
    .bind(content)
    .bind(timestamp)
    .execute(pool)
    .await
    .unwrap();
    id
}

pub async fn count_messages(pool: &SqlitePool, conversation_id: Uuid) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE conversation_id = ?")
        .bind(conversation_id)
        .fetch_one(pool)
        .await
        .unwrap()
}

/// Last request seen by `EchoGateway`.
pub static LAST_REQUEST: Mutex<Option<CompletionRequest>> = Mutex::new(None);

pub fn last_request() -> Option<CompletionRequest> {
    LAST_REQUEST.lock().unwrap().clone()
}

/// Replies with `echo: <message>` and records the request.
pub struct EchoGateway;

#[injectable(CompletionGateway)]
impl EchoGateway {
    #[inject]
    pub fn create() -> EchoGateway {
        LAST_REQUEST.lock().unwrap().take();
        EchoGateway
    }
}

#[async_trait]
impl CompletionGateway for EchoGateway {
    fn is_available(&self) -> bool {
        true
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, GatewayError> {
        *LAST_REQUEST.lock().unwrap() = Some(request.clone());
        Ok(format!("echo: {}", request.message))
    }
}

/// Always fails as if the API quota were exhausted.
pub struct QuotaGateway;

#[injectable(CompletionGateway)]
impl QuotaGateway {
    #[inject]
    pub fn create() -> QuotaGateway {
        QuotaGateway
    }
}

#[async_trait]
impl CompletionGateway for QuotaGateway {
    fn is_available(&self) -> bool {
        true
    }

    async fn complete(&self, _request: &CompletionRequest) -> Result<String, GatewayError> {
        Err(GatewayError::QuotaExceeded)
    }
}

/// Behaves like a deployment without an API key.
pub struct OfflineGateway;

#[injectable(CompletionGateway)]
impl OfflineGateway {
    #[inject]
    pub fn create() -> OfflineGateway {
        OfflineGateway
    }
}

#[async_trait]
impl CompletionGateway for OfflineGateway {
    fn is_available(&self) -> bool {
        false
    }

    async fn complete(&self, _request: &CompletionRequest) -> Result<String, GatewayError> {
        Err(GatewayError::NotConfigured)
    }
}
