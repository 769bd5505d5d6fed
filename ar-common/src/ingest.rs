//! Upload ingestion: raw CSV bytes to a committed (or rejected) batch

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::csv_import::{parse_weekly_csv_bytes, ParseOutcome};
use crate::db::{UploadLogEntry, WeeklyRecordStore};
use crate::Result;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadDetails {
    pub filename: String,
    pub total_records: usize,
    pub success_count: usize,
    pub skip_count: usize,
}

/// Response body of an upload, whether committed or rejected
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReport {
    pub success: bool,
    pub message: String,
    pub details: UploadDetails,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Parse `bytes` and, when no structural error occurred, commit every record
/// as one batch.
///
/// A rejected batch is reported through [`UploadReport::success`], not as an
/// `Err`; `Err` is reserved for storage failures.
pub async fn ingest_csv(
    store: &WeeklyRecordStore,
    filename: &str,
    bytes: &[u8],
    uploaded_at: DateTime<Utc>,
) -> Result<UploadReport> {
    let outcome = parse_weekly_csv_bytes(bytes);

    if !outcome.is_committable() {
        warn!(
            filename,
            errors = outcome.errors.len(),
            "Rejected upload with structural errors"
        );
        let message = format!(
            "Upload rejected: {} structural error(s); no records were saved",
            outcome.errors.len()
        );
        return Ok(report(false, message, filename, outcome));
    }

    let entry = UploadLogEntry {
        filename: filename.to_string(),
        uploaded_at,
        total_records: outcome.total_rows as i64,
        success_count: outcome.success_count as i64,
        skip_count: outcome.skip_count as i64,
    };
    store.upsert_batch(&outcome.records, &entry).await?;

    let mut message = format!(
        "Successfully processed {} weekly records from {}",
        outcome.success_count, filename
    );
    if !outcome.warnings.is_empty() {
        message.push_str(&format!(" with {} warning(s)", outcome.warnings.len()));
    }
    info!(filename, warnings = outcome.warnings.len(), "{}", message);

    Ok(report(true, message, filename, outcome))
}

fn report(success: bool, message: String, filename: &str, outcome: ParseOutcome) -> UploadReport {
    UploadReport {
        success,
        message,
        details: UploadDetails {
            filename: filename.to_string(),
            total_records: outcome.total_rows,
            success_count: outcome.success_count,
            skip_count: outcome.skip_count,
        },
        errors: outcome.errors.iter().map(ToString::to_string).collect(),
        warnings: outcome.warnings.iter().map(ToString::to_string).collect(),
    }
}
