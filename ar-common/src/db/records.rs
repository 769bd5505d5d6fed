//! Weekly record store
//!
//! Keyed, ordered persistence of validated weekly rows. Writes go through a
//! single async mutex and one SQLite transaction per batch, so a batch is
//! either fully visible or not visible at all.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::models::{WeeklyRecord, WeeklyValues};
use crate::Result;

const SELECT_RECORD: &str = r#"
    SELECT week_start, overdue_gmv, collected_gmv, collected_invoices, dso,
           weighted_avg_days_overdue, weighted_avg_days_late,
           aging_0_to_10, aging_11_to_30, aging_31_to_60, aging_61_to_90, aging_90_plus,
           credit_sales_percent, cei, ar_turnover_ratio
    FROM weekly_records
"#;

/// Metadata of one committed upload batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadLogEntry {
    pub filename: String,
    pub uploaded_at: DateTime<Utc>,
    pub total_records: i64,
    pub success_count: i64,
    pub skip_count: i64,
}

/// Records visible to one metrics computation, read from a single committed state
#[derive(Debug, Clone)]
pub struct StoreSnapshot {
    /// Reference week of the computation
    pub current_week: NaiveDate,
    /// Latest records at or before `current_week`, ascending
    pub records: Vec<WeeklyRecord>,
    /// Number of stored records at or before `current_week`
    pub data_points: i64,
}

/// Whether any data has been uploaded yet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetStatus {
    Ready,
    Empty,
}

/// Store summary for collaborator surfaces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStatus {
    pub last_upload_timestamp: Option<DateTime<Utc>>,
    pub latest_data_week: Option<NaiveDate>,
    pub total_records: i64,
    pub status: DatasetStatus,
}

/// SQLite-backed store of weekly records
#[derive(Clone)]
pub struct WeeklyRecordStore {
    pool: SqlitePool,
    write_lock: Arc<Mutex<()>>,
}

impl WeeklyRecordStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Insert or wholly replace one record
    pub async fn upsert(&self, record: &WeeklyRecord) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;
        upsert_on(&mut tx, record).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Apply a whole upload batch atomically and log it.
    ///
    /// Existing weeks are replaced in full, including with nulls. Only one
    /// batch runs at a time; concurrent callers wait for the lock.
    pub async fn upsert_batch(
        &self,
        records: &[WeeklyRecord],
        upload: &UploadLogEntry,
    ) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        for record in records {
            upsert_on(&mut tx, record).await?;
        }

        sqlx::query(
            r#"
            INSERT INTO upload_log (filename, uploaded_at, total_records, success_count, skip_count)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&upload.filename)
        .bind(upload.uploaded_at)
        .bind(upload.total_records)
        .bind(upload.success_count)
        .bind(upload.skip_count)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            filename = %upload.filename,
            rows = records.len(),
            "Committed upload batch"
        );
        Ok(records.len())
    }

    /// Point lookup by week
    pub async fn get(&self, week: NaiveDate) -> Result<Option<WeeklyRecord>> {
        let row = sqlx::query(&format!("{} WHERE week_start = ?", SELECT_RECORD))
            .bind(week)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(record_from_row).transpose()?)
    }

    /// All records with `from <= week_start <= to`, ascending
    pub async fn range(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<WeeklyRecord>> {
        let mut conn = self.pool.acquire().await?;
        range_on(&mut conn, from, to).await
    }

    /// Every stored record, ascending
    pub async fn all(&self) -> Result<Vec<WeeklyRecord>> {
        let rows = sqlx::query(&format!("{} ORDER BY week_start ASC", SELECT_RECORD))
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| record_from_row(row).map_err(Into::into))
            .collect()
    }

    /// The latest `k` distinct weeks at or before `as_of`, ascending
    pub async fn latest_at_or_before(&self, as_of: NaiveDate, k: u32) -> Result<Vec<WeeklyRecord>> {
        let mut conn = self.pool.acquire().await?;
        latest_at_or_before_on(&mut conn, as_of, k).await
    }

    pub async fn latest_week(&self) -> Result<Option<NaiveDate>> {
        let mut conn = self.pool.acquire().await?;
        latest_week_on(&mut conn).await
    }

    pub async fn count(&self) -> Result<i64> {
        let mut conn = self.pool.acquire().await?;
        count_on(&mut conn).await
    }

    /// Record count, latest week and last upload, read from one committed state
    pub async fn status(&self) -> Result<StoreStatus> {
        let mut tx = self.pool.begin().await?;
        let total_records = count_on(&mut tx).await?;
        let latest_data_week = latest_week_on(&mut tx).await?;
        let last_upload = last_upload_on(&mut tx).await?;
        tx.commit().await?;

        Ok(StoreStatus {
            last_upload_timestamp: last_upload.map(|upload| upload.uploaded_at),
            latest_data_week,
            total_records,
            status: if total_records == 0 {
                DatasetStatus::Empty
            } else {
                DatasetStatus::Ready
            },
        })
    }

    /// Most recent committed upload, if any
    pub async fn last_upload(&self) -> Result<Option<UploadLogEntry>> {
        let mut conn = self.pool.acquire().await?;
        last_upload_on(&mut conn).await
    }

    /// Resolve the reference week and load the trailing `window` records in one
    /// read transaction.
    ///
    /// Returns `None` when the store is empty. `as_of` overrides the latest
    /// stored week.
    pub async fn metrics_snapshot(
        &self,
        as_of: Option<NaiveDate>,
        window: u32,
    ) -> Result<Option<StoreSnapshot>> {
        let mut tx = self.pool.begin().await?;

        let Some(current_week) = resolve_as_of(&mut tx, as_of).await? else {
            tx.commit().await?;
            return Ok(None);
        };

        let records = latest_at_or_before_on(&mut tx, current_week, window).await?;
        let data_points: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM weekly_records WHERE week_start <= ?")
                .bind(current_week)
                .fetch_one(&mut *tx)
                .await?;
        tx.commit().await?;

        debug!(%current_week, window, loaded = records.len(), "Loaded metrics snapshot");
        Ok(Some(StoreSnapshot {
            current_week,
            records,
            data_points,
        }))
    }

    /// Resolve the reference week and load every record in
    /// `[as_of - (weeks - 1) * 7 days, as_of]` in one read transaction.
    ///
    /// Returns `None` when the store is empty.
    pub async fn history_snapshot(
        &self,
        as_of: Option<NaiveDate>,
        weeks: u32,
    ) -> Result<Option<Vec<WeeklyRecord>>> {
        let mut tx = self.pool.begin().await?;

        let Some(as_of) = resolve_as_of(&mut tx, as_of).await? else {
            tx.commit().await?;
            return Ok(None);
        };

        let from = crate::time::window_start(as_of, weeks);
        let records = range_on(&mut tx, from, as_of).await?;
        tx.commit().await?;

        Ok(Some(records))
    }
}

/// Explicit reference week, or the latest stored one; `None` on an empty store
async fn resolve_as_of(
    conn: &mut SqliteConnection,
    as_of: Option<NaiveDate>,
) -> Result<Option<NaiveDate>> {
    if count_on(conn).await? == 0 {
        return Ok(None);
    }
    match as_of {
        Some(week) => Ok(Some(week)),
        None => latest_week_on(conn).await,
    }
}

async fn upsert_on(conn: &mut SqliteConnection, record: &WeeklyRecord) -> Result<()> {
    let v = &record.values;
    sqlx::query(
        r#"
        INSERT INTO weekly_records (
            week_start, overdue_gmv, collected_gmv, collected_invoices, dso,
            weighted_avg_days_overdue, weighted_avg_days_late,
            aging_0_to_10, aging_11_to_30, aging_31_to_60, aging_61_to_90, aging_90_plus,
            credit_sales_percent, cei, ar_turnover_ratio
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(week_start) DO UPDATE SET
            overdue_gmv = excluded.overdue_gmv,
            collected_gmv = excluded.collected_gmv,
            collected_invoices = excluded.collected_invoices,
            dso = excluded.dso,
            weighted_avg_days_overdue = excluded.weighted_avg_days_overdue,
            weighted_avg_days_late = excluded.weighted_avg_days_late,
            aging_0_to_10 = excluded.aging_0_to_10,
            aging_11_to_30 = excluded.aging_11_to_30,
            aging_31_to_60 = excluded.aging_31_to_60,
            aging_61_to_90 = excluded.aging_61_to_90,
            aging_90_plus = excluded.aging_90_plus,
            credit_sales_percent = excluded.credit_sales_percent,
            cei = excluded.cei,
            ar_turnover_ratio = excluded.ar_turnover_ratio
        "#,
    )
    .bind(record.week_start)
    .bind(v.overdue_gmv)
    .bind(v.collected_gmv)
    .bind(v.collected_invoices)
    .bind(v.dso)
    .bind(v.weighted_avg_days_overdue)
    .bind(v.weighted_avg_days_late)
    .bind(v.aging_0_to_10)
    .bind(v.aging_11_to_30)
    .bind(v.aging_31_to_60)
    .bind(v.aging_61_to_90)
    .bind(v.aging_90_plus)
    .bind(v.credit_sales_percent)
    .bind(v.cei)
    .bind(v.ar_turnover_ratio)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn range_on(
    conn: &mut SqliteConnection,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<WeeklyRecord>> {
    let rows = sqlx::query(&format!(
        "{} WHERE week_start >= ? AND week_start <= ? ORDER BY week_start ASC",
        SELECT_RECORD
    ))
    .bind(from)
    .bind(to)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter()
        .map(|row| record_from_row(row).map_err(Into::into))
        .collect()
}

async fn latest_at_or_before_on(
    conn: &mut SqliteConnection,
    as_of: NaiveDate,
    k: u32,
) -> Result<Vec<WeeklyRecord>> {
    let rows = sqlx::query(&format!(
        "{} WHERE week_start <= ? ORDER BY week_start DESC LIMIT ?",
        SELECT_RECORD
    ))
    .bind(as_of)
    .bind(i64::from(k))
    .fetch_all(&mut *conn)
    .await?;

    let mut records = rows
        .iter()
        .map(record_from_row)
        .collect::<std::result::Result<Vec<_>, _>>()?;
    records.reverse();
    Ok(records)
}

async fn latest_week_on(conn: &mut SqliteConnection) -> Result<Option<NaiveDate>> {
    let week = sqlx::query_scalar::<_, NaiveDate>(
        "SELECT week_start FROM weekly_records ORDER BY week_start DESC LIMIT 1",
    )
    .fetch_optional(&mut *conn)
    .await?;

    Ok(week)
}

async fn count_on(conn: &mut SqliteConnection) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM weekly_records")
        .fetch_one(&mut *conn)
        .await?;

    Ok(count)
}

async fn last_upload_on(conn: &mut SqliteConnection) -> Result<Option<UploadLogEntry>> {
    let row = sqlx::query(
        r#"
        SELECT filename, uploaded_at, total_records, success_count, skip_count
        FROM upload_log
        ORDER BY id DESC
        LIMIT 1
        "#,
    )
    .fetch_optional(&mut *conn)
    .await?;

    let entry = match row {
        Some(row) => Some(UploadLogEntry {
            filename: row.try_get("filename")?,
            uploaded_at: row.try_get("uploaded_at")?,
            total_records: row.try_get("total_records")?,
            success_count: row.try_get("success_count")?,
            skip_count: row.try_get("skip_count")?,
        }),
        None => None,
    };
    Ok(entry)
}

fn record_from_row(row: &SqliteRow) -> std::result::Result<WeeklyRecord, sqlx::Error> {
    Ok(WeeklyRecord::new(
        row.try_get("week_start")?,
        WeeklyValues {
            overdue_gmv: row.try_get("overdue_gmv")?,
            collected_gmv: row.try_get("collected_gmv")?,
            collected_invoices: row.try_get("collected_invoices")?,
            dso: row.try_get("dso")?,
            weighted_avg_days_overdue: row.try_get("weighted_avg_days_overdue")?,
            weighted_avg_days_late: row.try_get("weighted_avg_days_late")?,
            aging_0_to_10: row.try_get("aging_0_to_10")?,
            aging_11_to_30: row.try_get("aging_11_to_30")?,
            aging_31_to_60: row.try_get("aging_31_to_60")?,
            aging_61_to_90: row.try_get("aging_61_to_90")?,
            aging_90_plus: row.try_get("aging_90_plus")?,
            credit_sales_percent: row.try_get("credit_sales_percent")?,
            cei: row.try_get("cei")?,
            ar_turnover_ratio: row.try_get("ar_turnover_ratio")?,
        },
    ))
}
