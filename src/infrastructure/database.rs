//! Pooled SQLite connection

use crate::infrastructure::config::AppConfig;
use di::{Ref, inject, injectable};
use log::error;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::ops::{Deref, DerefMut};
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};

/// Pool handed out instead of the configured one while integration tests run.
static TEST_POOL: Mutex<Option<SqlitePool>> = Mutex::new(None);

pub struct DatabaseConnection {
    connection: SqlitePool,
}

#[injectable]
impl DatabaseConnection {
    #[inject]
    pub fn create(config: Ref<AppConfig>) -> DatabaseConnection {
        if let Some(pool) = TEST_POOL
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
        {
            return DatabaseConnection { connection: pool };
        }

        let options = SqliteConnectOptions::from_str(&config.database_url)
            .unwrap_or_else(|e| {
                error!("invalid DATABASE_URL {}: {e}", config.database_url);
                SqliteConnectOptions::new()
            })
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_lazy_with(options);

        DatabaseConnection { connection: pool }
    }
}

impl DatabaseConnection {
    /// Makes every `DatabaseConnection` resolved afterwards share `pool`.
    pub fn set_test_pool(pool: SqlitePool) {
        *TEST_POOL.lock().unwrap_or_else(PoisonError::into_inner) = Some(pool);
    }

    pub fn clear_test_pool() {
        TEST_POOL.lock().unwrap_or_else(PoisonError::into_inner).take();
    }

    /// Applies the embedded migrations.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!().run(&self.connection).await
    }
}

impl Deref for DatabaseConnection {
    type Target = SqlitePool;

    fn deref(&self) -> &Self::Target {
        &self.connection
    }
}

impl DerefMut for DatabaseConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.connection
    }
}
