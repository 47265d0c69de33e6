//! Environment configuration

use di::{inject, injectable};
use log::warn;
use std::env;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_JWT_SECRET: &str = "default-secret-change-in-production";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub environment: String,
    pub jwt_secret: String,
    pub jwt_expires_in: chrono::Duration,
    pub frontend_url: String,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub ai_timeout: Duration,
    pub reply_locale: String,
}

#[injectable]
impl AppConfig {
    #[inject]
    pub fn create() -> AppConfig {
        AppConfig::from_env()
    }
}

impl AppConfig {
    /// Reads the configuration from the process environment, loading `.env` first.
    ///
    /// Missing secrets are reported but never abort startup: an absent Gemini key degrades
    /// AI replies to a placeholder text.
    pub fn from_env() -> AppConfig {
        dotenvy::dotenv().ok();

        let jwt_secret = env::var("JWT_SECRET").unwrap_or_else(|_| {
            warn!("JWT_SECRET is not set, using the insecure development secret");
            DEFAULT_JWT_SECRET.to_owned()
        });

        let gemini_api_key = env::var("GEMINI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());
        if gemini_api_key.is_none() {
            warn!("GEMINI_API_KEY is not set, AI replies will be simulated");
        }

        let jwt_expires_in = env::var("JWT_EXPIRES_IN")
            .ok()
            .and_then(|value| parse_expiry(&value))
            .unwrap_or_else(|| chrono::Duration::days(7));

        AppConfig {
            port: parse_var("PORT").unwrap_or(3001),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:conversations.db?mode=rwc".to_owned()),
            environment: env::var("APP_ENV").unwrap_or_else(|_| "development".to_owned()),
            jwt_secret,
            jwt_expires_in,
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_owned()),
            gemini_api_key,
            gemini_model: env::var("GEMINI_MODEL")
                .unwrap_or_else(|_| "gemini-2.0-flash-exp".to_owned()),
            ai_timeout: Duration::from_secs(parse_var("AI_TIMEOUT_SECS").unwrap_or(30)),
            reply_locale: env::var("REPLY_LOCALE").unwrap_or_else(|_| "es".to_owned()),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

fn parse_var<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|s| T::from_str(s.trim()).ok())
}

/// Parses token lifetimes such as `7d`, `12h`, `30m`, `45s` or a bare number of seconds.
pub fn parse_expiry(value: &str) -> Option<chrono::Duration> {
    let value = value.trim();
    let (amount, unit) = match value.char_indices().last()? {
        (i, c) if c.is_ascii_alphabetic() => (&value[..i], c),
        _ => (value, 's'),
    };
    let amount = i64::from_str(amount).ok().filter(|n| *n > 0)?;

    match unit {
        'd' => chrono::Duration::try_days(amount),
        'h' => chrono::Duration::try_hours(amount),
        'm' => chrono::Duration::try_minutes(amount),
        's' => chrono::Duration::try_seconds(amount),
        _ => None,
    }
}
