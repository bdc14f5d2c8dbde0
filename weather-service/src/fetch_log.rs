use async_trait::async_trait;
use common::errors::AppError;
use common::models::FetchLogEntry;
use sqlx::PgPool;
use std::sync::Mutex;
use tracing::{info, instrument};

/// Append-only record of successful upstream fetches.
#[async_trait]
pub trait FetchLogStore: Send + Sync {
    async fn record(&self, entry: &FetchLogEntry) -> Result<(), AppError>;

    /// Release any held connections. Called once on shutdown.
    async fn close(&self) {}
}

pub struct PgFetchLogStore {
    pool: PgPool,
}

impl PgFetchLogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FetchLogStore for PgFetchLogStore {
    #[instrument(skip(self, entry), fields(city = %entry.city))]
    async fn record(&self, entry: &FetchLogEntry) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO fetch_logs (city, "timestamp", file_path)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(&entry.city)
        .bind(&entry.timestamp)
        .bind(entry.file_path.as_deref())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
        info!("Database pool closed");
    }
}

/// Fetch log kept in process memory. Lost on restart.
#[derive(Default)]
pub struct MemoryFetchLogStore {
    entries: Mutex<Vec<FetchLogEntry>>,
}

impl MemoryFetchLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<FetchLogEntry> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl FetchLogStore for MemoryFetchLogStore {
    async fn record(&self, entry: &FetchLogEntry) -> Result<(), AppError> {
        self.entries
            .lock()
            .map_err(|_| AppError::database("fetch log lock poisoned"))?
            .push(entry.clone());
        Ok(())
    }
}
