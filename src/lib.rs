//! Conversation analytics web server - library exports for the binary and tests
//!
//! (c) Softlandia 2025

pub mod api;
pub mod core;
pub mod infrastructure;

use crate::core::analytics::DashboardAnalytics;
use crate::core::exchange::{ConversationLocks, MessageExchange};
use crate::core::realtime::RoomHub;
use crate::core::replies::ReplyTemplates;
use crate::core::services::{ConversationLifecycle, MessageStore, PromptCatalog};
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::database::DatabaseConnection;
use crate::infrastructure::repositories::{
    DbAnalyticsRepository, DbConversationRepository, DbMessageRepository, DbPromptRepository,
};
use di::{Injectable, ServiceCollection};

/// Registers everything except the completion gateway, which the caller picks.
pub fn service_collection() -> ServiceCollection {
    let mut services = ServiceCollection::new();
    services
        .add(AppConfig::singleton())
        .add(DatabaseConnection::singleton())
        .add(ReplyTemplates::singleton())
        .add(RoomHub::singleton())
        .add(ConversationLocks::singleton())
        .add(DbConversationRepository::scoped())
        .add(DbMessageRepository::scoped())
        .add(DbPromptRepository::scoped())
        .add(DbAnalyticsRepository::scoped())
        .add(ConversationLifecycle::scoped())
        .add(MessageStore::scoped())
        .add(PromptCatalog::scoped())
        .add(MessageExchange::scoped())
        .add(DashboardAnalytics::scoped());
    services
}
