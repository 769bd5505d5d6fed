//! Historical aggregation for charting
//!
//! Produces the raw per-week values for the trailing `months` months ending at
//! a reference week. The series is sparse: weeks without a stored record are
//! left out rather than zero-filled.

use chrono::NaiveDate;
use serde::Serialize;

use crate::db::WeeklyRecordStore;
use crate::models::{WeeklyRecord, WeeklyValues};
use crate::time::weeks_for_months;
use crate::{Error, Result};

pub const MIN_HISTORY_MONTHS: u32 = 1;
pub const MAX_HISTORY_MONTHS: u32 = 36;
pub const DEFAULT_HISTORY_MONTHS: u32 = 12;

/// One charted week
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPoint {
    pub week: NaiveDate,
    #[serde(flatten)]
    pub values: WeeklyValues,
}

impl From<WeeklyRecord> for HistoryPoint {
    fn from(record: WeeklyRecord) -> Self {
        Self {
            week: record.week_start,
            values: record.values,
        }
    }
}

/// Reject month counts outside the supported range
pub fn validate_months(months: u32) -> Result<u32> {
    if (MIN_HISTORY_MONTHS..=MAX_HISTORY_MONTHS).contains(&months) {
        Ok(months)
    } else {
        Err(Error::InvalidInput(format!(
            "months must be between {} and {}, got {}",
            MIN_HISTORY_MONTHS, MAX_HISTORY_MONTHS, months
        )))
    }
}

/// Load the trailing `months` months ending at `as_of` (default: latest stored week).
///
/// An empty store yields an empty series.
pub async fn historical_series(
    store: &WeeklyRecordStore,
    months: u32,
    as_of: Option<NaiveDate>,
) -> Result<Vec<HistoryPoint>> {
    let months = validate_months(months)?;
    let weeks = weeks_for_months(months);

    // The store applies the window; records arrive ascending and in range
    let records = match store.history_snapshot(as_of, weeks).await? {
        Some(records) => records,
        None => return Ok(Vec::new()),
    };

    Ok(records.into_iter().map(HistoryPoint::from).collect())
}
