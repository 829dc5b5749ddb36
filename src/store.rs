//! SQLite-backed media store.
//!
//! Implements [`Persister`] (deduplicating on `file_unique_id`) and
//! [`CheckpointStore`] (one resume marker per source) over the schema
//! created by [`crate::migrate`].

use anyhow::Result;
use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;
use crate::error::PersistError;
use crate::migrate;
use crate::models::{ChatRef, MediaRecord};
use crate::traits::{CheckpointStore, Persister, SaveOutcome};

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open the configured database, creating the schema when missing.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl Persister for SqliteStore {
    async fn save(&self, record: &MediaRecord) -> Result<SaveOutcome, PersistError> {
        let now = chrono::Utc::now().timestamp();
        let result = sqlx::query(
            r#"
            INSERT INTO media (file_unique_id, file_id, kind, file_name, search_name, file_size, mime_type, caption, duration, width, height, message_id, indexed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(file_unique_id) DO NOTHING
            "#,
        )
        .bind(&record.file_unique_id)
        .bind(&record.file_id)
        .bind(record.kind.as_str())
        .bind(&record.file_name)
        .bind(&record.search_name)
        .bind(record.file_size as i64)
        .bind(&record.mime_type)
        .bind(&record.caption)
        .bind(record.duration.map(i64::from))
        .bind(record.width.map(i64::from))
        .bind(record.height.map(i64::from))
        .bind(record.message_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| PersistError::Failed(e.to_string()))?;

        if result.rows_affected() == 0 {
            Ok(SaveOutcome::Duplicate)
        } else {
            Ok(SaveOutcome::Saved)
        }
    }
}

#[async_trait]
impl CheckpointStore for SqliteStore {
    async fn load(&self, source: &ChatRef) -> Result<Option<i64>> {
        let result: Option<String> =
            sqlx::query_scalar("SELECT cursor FROM checkpoints WHERE source = ?")
                .bind(source.key())
                .fetch_optional(&self.pool)
                .await?;

        Ok(result.and_then(|s| s.parse::<i64>().ok()))
    }

    async fn store(&self, source: &ChatRef, cursor: i64) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO checkpoints (source, cursor, updated_at) VALUES (?, ?, ?)
            ON CONFLICT(source) DO UPDATE SET cursor = excluded.cursor, updated_at = excluded.updated_at
            "#,
        )
        .bind(source.key())
        .bind(cursor.to_string())
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn clear(&self, source: &ChatRef) -> Result<()> {
        sqlx::query("DELETE FROM checkpoints WHERE source = ?")
            .bind(source.key())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
