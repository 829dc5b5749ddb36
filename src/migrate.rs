use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create the schema on an open pool. Idempotent.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    // Indexed media, deduplicated by the content-addressable file id
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS media (
            file_unique_id TEXT PRIMARY KEY,
            file_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            file_name TEXT,
            search_name TEXT,
            file_size INTEGER NOT NULL DEFAULT 0,
            mime_type TEXT,
            caption TEXT,
            duration INTEGER,
            width INTEGER,
            height INTEGER,
            message_id INTEGER NOT NULL,
            indexed_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Resume markers of unfinished jobs
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS checkpoints (
            source TEXT PRIMARY KEY,
            cursor TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_media_kind ON media(kind)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_media_search_name ON media(search_name)")
        .execute(pool)
        .await?;

    Ok(())
}
