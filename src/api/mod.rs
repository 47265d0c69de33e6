use crate::api::auth::verify_token;
use crate::api::error::ApiError;
use crate::infrastructure::config::AppConfig;
use async_trait::async_trait;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{FromRequest, FromRequestParts, Path, Query, Request};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use di_axum::Inject;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use uuid::Uuid;

pub mod analytics;
pub mod auth;
pub mod chat;
pub mod conversations;
pub mod error;
pub mod messages;
pub mod prompts;
pub mod realtime;

/// Verified caller identity, from an `Authorization: Bearer` token.
#[derive(Debug)]
pub struct ExtractUser(pub Uuid);

/// Reads and verifies the bearer token. A missing token is 401, a bad one 403.
pub fn user_from_headers(headers: &HeaderMap, secret: &str) -> Result<Uuid, ApiError> {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| ApiError::Unauthorized("authentication token required".to_owned()))?;

    user_from_token(token, secret)
}

pub fn user_from_token(token: &str, secret: &str) -> Result<Uuid, ApiError> {
    verify_token(token, secret)
        .map(|claims| claims.user_id)
        .map_err(|e| ApiError::Forbidden(format!("invalid or expired token: {e}")))
}

#[async_trait]
impl<S> FromRequestParts<S> for ExtractUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, ApiError> {
        let Inject(config) = Inject::<AppConfig>::from_request_parts(parts, state)
            .await
            .map_err(|_| ApiError::Internal("configuration unavailable".to_owned()))?;

        user_from_headers(&parts.headers, &config.jwt_secret).map(ExtractUser)
    }
}

/// `Json` whose rejections are reported as 400 with the usual error body.
#[derive(Debug)]
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, ApiError> {
        Json::<T>::from_request(req, state)
            .await
            .map(|Json(value)| ValidatedJson(value))
            .map_err(|rejection: JsonRejection| {
                ApiError::BadRequest(format!("invalid data: {}", rejection.body_text()))
            })
    }
}

/// `Query` whose rejections are reported as 400 with the usual error body.
#[derive(Debug)]
pub struct ValidatedQuery<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for ValidatedQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, ApiError> {
        Query::<T>::from_request_parts(parts, state)
            .await
            .map(|Query(value)| ValidatedQuery(value))
            .map_err(|rejection: QueryRejection| {
                ApiError::BadRequest(format!("invalid query: {}", rejection.body_text()))
            })
    }
}

/// `Path` whose rejections are reported as 400 with the usual error body.
#[derive(Debug)]
pub struct ValidatedPath<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for ValidatedPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, ApiError> {
        Path::<T>::from_request_parts(parts, state)
            .await
            .map(|Path(value)| ValidatedPath(value))
            .map_err(|rejection: PathRejection| {
                ApiError::BadRequest(format!("invalid path: {}", rejection.body_text()))
            })
    }
}

/// Every route of the service, without the dependency provider.
pub fn router() -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(realtime::ws_upgrade))
        .nest("/api/chat", chat::router())
        .nest("/api/conversations", conversations::router())
        .nest("/api/messages", messages::router())
        .nest("/api/prompts", prompts::router())
        .nest("/api/analytics", analytics::router())
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "timestamp": Utc::now() }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    const SECRET: &str = "extractor-secret";

    fn status(result: Result<Uuid, ApiError>) -> StatusCode {
        match result {
            Ok(_) => StatusCode::OK,
            Err(e) => e.into_response().status(),
        }
    }

    #[test]
    fn test_missing_header_is_unauthorized() {
        assert_eq!(
            status(user_from_headers(&HeaderMap::new(), SECRET)),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn test_non_bearer_header_is_unauthorized() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(
            status(user_from_headers(&headers, SECRET)),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn test_bad_token_is_forbidden() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer nope"));
        assert_eq!(
            status(user_from_headers(&headers, SECRET)),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn test_valid_token_yields_user() {
        let user = Uuid::new_v4();
        let token = auth::issue_token(user, SECRET, chrono::Duration::minutes(5)).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        assert_eq!(user_from_headers(&headers, SECRET).unwrap(), user);
    }
}
