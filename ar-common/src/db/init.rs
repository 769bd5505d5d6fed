//! Database initialization
//!
//! Creates the SQLite file on first run and bootstraps the schema. Every
//! statement is idempotent, so opening an existing database is safe.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Busy timeout applied to every connection, in milliseconds
const BUSY_TIMEOUT_MS: u32 = 5000;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .min_connections(1)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // WAL lets queries read the last committed batch while an upload is writing
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;

    sqlx::query(&format!("PRAGMA busy_timeout = {}", BUSY_TIMEOUT_MS))
        .execute(&pool)
        .await?;

    create_schema_version_table(&pool).await?;
    create_weekly_records_table(&pool).await?;
    create_upload_log_table(&pool).await?;

    Ok(pool)
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (1)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Create the weekly_records table
///
/// One row per calendar week. `week_start` is stored as `YYYY-MM-DD` text so
/// lexical order equals chronological order.
pub async fn create_weekly_records_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS weekly_records (
            week_start TEXT PRIMARY KEY,
            overdue_gmv REAL,
            collected_gmv REAL,
            collected_invoices INTEGER,
            dso REAL,
            weighted_avg_days_overdue REAL,
            weighted_avg_days_late REAL,
            aging_0_to_10 REAL,
            aging_11_to_30 REAL,
            aging_31_to_60 REAL,
            aging_61_to_90 REAL,
            aging_90_plus REAL,
            credit_sales_percent REAL,
            cei REAL,
            ar_turnover_ratio REAL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the upload_log table
///
/// One row per committed upload batch.
pub async fn create_upload_log_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS upload_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            filename TEXT NOT NULL,
            uploaded_at TEXT NOT NULL,
            total_records INTEGER NOT NULL,
            success_count INTEGER NOT NULL,
            skip_count INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
