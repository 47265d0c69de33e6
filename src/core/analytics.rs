//! Dashboard aggregates over conversations and messages.

use crate::core::errors::ServiceError;
use crate::core::traits::AnalyticsService;
use crate::infrastructure::entities::{
    Channel, ConversationPoint, ConversationStatus, PromptLabel, PromptRatingStats,
};
use crate::infrastructure::traits::{AnalyticsRepository, PromptRepository};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Local, NaiveDate, NaiveTime, TimeZone, Utc};
use di::{Ref, injectable};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

/// Days covered by the dashboard's recent activity series.
pub const RECENT_ACTIVITY_DAYS: i64 = 7;

/// Number of prompts reported by the prompt ranking.
pub const WORST_PROMPTS: usize = 5;

pub const MAX_TREND_DAYS: i64 = 365;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Today,
    Week,
    Month,
    All,
}

impl Period {
    /// Unknown values fall back to `All`.
    pub fn parse(value: Option<&str>) -> Period {
        match value {
            Some("today") => Period::Today,
            Some("week") => Period::Week,
            Some("month") => Period::Month,
            _ => Period::All,
        }
    }

    /// Earliest conversation start included in the period, `None` for no bound.
    pub fn window_start(self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Period::Today => {
                let midnight = now.with_timezone(&Local).date_naive().and_time(NaiveTime::MIN);
                Some(
                    Local
                        .from_local_datetime(&midnight)
                        .earliest()
                        .map_or_else(|| midnight.and_utc(), |start| start.with_timezone(&Utc)),
                )
            }
            Period::Week => Some(now - Duration::days(7)),
            Period::Month => Some(now - Duration::days(30)),
            Period::All => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardTotals {
    pub conversations: i64,
    pub open_conversations: i64,
    pub messages: i64,
    pub average_rating: f64,
    pub satisfaction_percentage: f64,
    pub avg_response_time: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelCount {
    pub channel: Channel,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusCount {
    pub status: ConversationStatus,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyCount {
    pub date: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardReport {
    pub totals: DashboardTotals,
    pub by_channel: Vec<ChannelCount>,
    pub by_status: Vec<StatusCount>,
    pub recent_activity: Vec<DailyCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendPoint {
    pub date: String,
    pub conversations: i64,
    pub open: i64,
    pub closed: i64,
    pub avg_rating: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RatingBucket {
    pub rating: i64,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptPerformance {
    pub prompt_id: Uuid,
    pub prompt_name: String,
    pub prompt_description: Option<String>,
    pub avg_rating: f64,
    pub conversation_count: i64,
}

/// Share of rated conversations rated 4 or 5, in percent with one decimal. Zero when nothing is rated.
pub fn satisfaction_percentage(satisfied: i64, rated: i64) -> f64 {
    if rated <= 0 {
        return 0.0;
    }
    (satisfied as f64 / rated as f64 * 1000.0).round() / 10.0
}

#[derive(Default)]
struct DayTally {
    conversations: i64,
    open: i64,
    closed: i64,
    rating_sum: i64,
    rated: i64,
}

/// Groups conversations by the calendar date of their start in `tz`, ascending.
pub fn bucket_trends<Tz: TimeZone>(points: &[ConversationPoint], tz: &Tz) -> Vec<TrendPoint> {
    let mut days: BTreeMap<NaiveDate, DayTally> = BTreeMap::new();

    for point in points {
        let day = days
            .entry(point.start_date.with_timezone(tz).date_naive())
            .or_default();
        day.conversations += 1;
        match point.status {
            ConversationStatus::Open => day.open += 1,
            ConversationStatus::Closed => day.closed += 1,
        }
        if let Some(rating) = point.rating {
            day.rating_sum += rating;
            day.rated += 1;
        }
    }

    days.into_iter()
        .map(|(date, day)| TrendPoint {
            date: date.format("%Y-%m-%d").to_string(),
            conversations: day.conversations,
            open: day.open,
            closed: day.closed,
            avg_rating: (day.rated > 0).then(|| day.rating_sum as f64 / day.rated as f64),
        })
        .collect()
}

/// Conversation counts per UTC day, ascending.
pub fn daily_counts(points: &[ConversationPoint]) -> Vec<DailyCount> {
    let mut days: BTreeMap<NaiveDate, i64> = BTreeMap::new();
    for point in points {
        *days.entry(point.start_date.date_naive()).or_default() += 1;
    }

    days.into_iter()
        .map(|(date, count)| DailyCount {
            date: date.format("%Y-%m-%d").to_string(),
            count,
        })
        .collect()
}

/// One bucket per rating 1..=5, missing ratings counted as zero.
pub fn fill_rating_buckets(counts: &[(i64, i64)]) -> Vec<RatingBucket> {
    (1..=5)
        .map(|rating| RatingBucket {
            rating,
            count: counts
                .iter()
                .find(|(value, _)| *value == rating)
                .map_or(0, |(_, count)| *count),
        })
        .collect()
}

/// Labels the stats and keeps the worst rated prompts, ties broken by name.
pub fn rank_prompts(
    stats: Vec<PromptRatingStats>,
    labels: Vec<PromptLabel>,
) -> Vec<PromptPerformance> {
    let mut labels: HashMap<Uuid, PromptLabel> =
        labels.into_iter().map(|label| (label.id, label)).collect();

    let mut ranked: Vec<PromptPerformance> = stats
        .into_iter()
        .map(|stat| {
            let label = labels.remove(&stat.prompt_id);
            PromptPerformance {
                prompt_id: stat.prompt_id,
                prompt_name: label
                    .as_ref()
                    .map_or_else(|| "Unknown".to_owned(), |label| label.name.clone()),
                prompt_description: label.and_then(|label| label.description),
                avg_rating: stat.average_rating,
                conversation_count: stat.conversation_count,
            }
        })
        .collect();

    ranked.sort_by(|a, b| {
        a.avg_rating
            .total_cmp(&b.avg_rating)
            .then_with(|| a.prompt_name.cmp(&b.prompt_name))
    });
    ranked.truncate(WORST_PROMPTS);
    ranked
}

#[injectable(AnalyticsService)]
pub struct DashboardAnalytics {
    analytics: Ref<dyn AnalyticsRepository>,
    prompts: Ref<dyn PromptRepository>,
}

#[async_trait]
impl AnalyticsService for DashboardAnalytics {
    async fn dashboard(&self, period: Period) -> Result<DashboardReport, ServiceError> {
        let now = Utc::now();
        let since = period.window_start(now);

        let conversations = self.analytics.conversation_totals(since).await?;
        let messages = self.analytics.message_totals(since).await?;
        let by_channel = self.analytics.channel_counts(since).await?;
        let by_status = self.analytics.status_counts(since).await?;
        let recent = self
            .analytics
            .conversation_points(now - Duration::days(RECENT_ACTIVITY_DAYS))
            .await?;

        Ok(DashboardReport {
            totals: DashboardTotals {
                conversations: conversations.conversations,
                open_conversations: conversations.open_conversations,
                messages: messages.messages,
                average_rating: conversations.average_rating.unwrap_or(0.0),
                satisfaction_percentage: satisfaction_percentage(
                    conversations.satisfied_conversations,
                    conversations.rated_conversations,
                ),
                avg_response_time: messages.average_response_time.unwrap_or(0.0),
            },
            by_channel: by_channel
                .into_iter()
                .map(|(channel, count)| ChannelCount { channel, count })
                .collect(),
            by_status: by_status
                .into_iter()
                .map(|(status, count)| StatusCount { status, count })
                .collect(),
            recent_activity: daily_counts(&recent),
        })
    }

    async fn trends(&self, days: i64) -> Result<Vec<TrendPoint>, ServiceError> {
        let days = days.clamp(1, MAX_TREND_DAYS);
        let since = (Utc::now() - Duration::days(days))
            .date_naive()
            .and_time(NaiveTime::MIN)
            .and_utc();

        let points = self.analytics.conversation_points(since).await?;
        Ok(bucket_trends(&points, &Local))
    }

    async fn rating_distribution(&self) -> Result<Vec<RatingBucket>, ServiceError> {
        let counts = self.analytics.rating_counts().await?;
        Ok(fill_rating_buckets(&counts))
    }

    async fn prompt_performance(&self) -> Result<Vec<PromptPerformance>, ServiceError> {
        let stats = self.analytics.prompt_rating_stats().await?;
        if stats.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = stats.iter().map(|stat| stat.prompt_id).collect();
        let labels = self.prompts.prompt_labels(&ids).await?;
        Ok(rank_prompts(stats, labels))
    }
}
