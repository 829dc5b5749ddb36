//! Index statistics.
//!
//! Summarizes what has been indexed: media counts and total size per kind,
//! plus the resume markers left behind by unfinished jobs. Used by
//! `mdx stats`.

use anyhow::Result;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::store::SqliteStore;

/// Per-kind breakdown of indexed media.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindStats {
    pub kind: String,
    pub count: i64,
    pub total_bytes: i64,
}

/// A stored resume marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerStats {
    pub source: String,
    pub cursor: String,
    pub updated_at: i64,
}

pub async fn kind_stats(pool: &SqlitePool) -> Result<Vec<KindStats>> {
    let rows = sqlx::query(
        r#"
        SELECT kind, COUNT(*) AS count, COALESCE(SUM(file_size), 0) AS total_bytes
        FROM media
        GROUP BY kind
        ORDER BY count DESC, kind
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| KindStats {
            kind: row.get("kind"),
            count: row.get("count"),
            total_bytes: row.get("total_bytes"),
        })
        .collect())
}

pub async fn marker_stats(pool: &SqlitePool) -> Result<Vec<MarkerStats>> {
    let rows = sqlx::query("SELECT source, cursor, updated_at FROM checkpoints ORDER BY source")
        .fetch_all(pool)
        .await?;

    Ok(rows
        .iter()
        .map(|row| MarkerStats {
            source: row.get("source"),
            cursor: row.get("cursor"),
            updated_at: row.get("updated_at"),
        })
        .collect())
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let kinds = kind_stats(store.pool()).await?;
    let markers = marker_stats(store.pool()).await?;

    let total: i64 = kinds.iter().map(|k| k.count).sum();
    let total_bytes: i64 = kinds.iter().map(|k| k.total_bytes).sum();

    println!("mediadex — Index Stats");
    println!("======================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Media:       {}", total);
    println!("  Total size:  {}", format_bytes(total_bytes.max(0) as u64));

    if !kinds.is_empty() {
        println!();
        println!("  By kind:");
        println!("  {:<12} {:>8} {:>12}", "KIND", "COUNT", "SIZE");
        println!("  {}", "-".repeat(34));
        for k in &kinds {
            println!(
                "  {:<12} {:>8} {:>12}",
                k.kind,
                k.count,
                format_bytes(k.total_bytes.max(0) as u64)
            );
        }
    }

    if !markers.is_empty() {
        println!();
        println!("  Unfinished jobs:");
        println!("  {:<24} {:>10}   {}", "SOURCE", "CURSOR", "UPDATED");
        println!("  {}", "-".repeat(52));
        let now = chrono::Utc::now().timestamp();
        for m in &markers {
            println!(
                "  {:<24} {:>10}   {}",
                m.source,
                m.cursor,
                marker_age(m.updated_at, now)
            );
        }
    }

    println!();

    store.close().await;
    Ok(())
}

/// Total size of indexed files, scaled to the largest whole unit.
fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

/// Age of a resume marker relative to `now` (both Unix seconds). Markers
/// older than a week, or from the future, show their date instead.
fn marker_age(updated_at: i64, now: i64) -> String {
    match now - updated_at {
        d if d < 0 => marker_date(updated_at),
        d if d < 60 => "just now".to_string(),
        d if d < 3_600 => format!("{}m ago", d / 60),
        d if d < 86_400 => format!("{}h ago", d / 3_600),
        d if d < 7 * 86_400 => format!("{}d ago", d / 86_400),
        _ => marker_date(updated_at),
    }
}

fn marker_date(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
