//! Analytics endpoints

use crate::api::{ExtractUser, ValidatedQuery};
use crate::api::analytics::schemas::{DashboardQuery, TrendsQuery};
use crate::api::error::ApiError;
use crate::core::analytics::{
    DashboardReport, Period, PromptPerformance, RatingBucket, TrendPoint,
};
use crate::core::traits::AnalyticsService;
use axum::routing::get;
use axum::{Json, Router};
use di_axum::Inject;

pub const DEFAULT_TREND_DAYS: i64 = 30;

pub fn router() -> Router {
    Router::new()
        .route("/dashboard", get(dashboard))
        .route("/trends", get(trends))
        .route("/ratings", get(ratings))
        .route("/prompts", get(prompts))
}

async fn dashboard(
    Inject(analytics): Inject<dyn AnalyticsService>,
    ExtractUser(_current_user): ExtractUser,
    ValidatedQuery(query): ValidatedQuery<DashboardQuery>,
) -> Result<Json<DashboardReport>, ApiError> {
    let period = Period::parse(query.period.as_deref());
    Ok(Json(analytics.dashboard(period).await?))
}

async fn trends(
    Inject(analytics): Inject<dyn AnalyticsService>,
    ExtractUser(_current_user): ExtractUser,
    ValidatedQuery(query): ValidatedQuery<TrendsQuery>,
) -> Result<Json<Vec<TrendPoint>>, ApiError> {
    // non-numeric values fall back to the default window
    let days = query
        .days
        .as_deref()
        .and_then(|days| days.trim().parse().ok())
        .unwrap_or(DEFAULT_TREND_DAYS);

    Ok(Json(analytics.trends(days).await?))
}

async fn ratings(
    Inject(analytics): Inject<dyn AnalyticsService>,
    ExtractUser(_current_user): ExtractUser,
) -> Result<Json<Vec<RatingBucket>>, ApiError> {
    Ok(Json(analytics.rating_distribution().await?))
}

async fn prompts(
    Inject(analytics): Inject<dyn AnalyticsService>,
    ExtractUser(_current_user): ExtractUser,
) -> Result<Json<Vec<PromptPerformance>>, ApiError> {
    Ok(Json(analytics.prompt_performance().await?))
}

pub mod schemas {
    use serde::Deserialize;

    #[derive(Deserialize, Debug, Default)]
    pub struct DashboardQuery {
        pub period: Option<String>,
    }

    #[derive(Deserialize, Debug, Default)]
    pub struct TrendsQuery {
        pub days: Option<String>,
    }
}
