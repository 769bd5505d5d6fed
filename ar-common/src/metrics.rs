//! Metrics engine
//!
//! Computes, for each tracked [`Metric`], the current value, the
//! week-over-week delta and trailing 3/6/12-month averages. All computation is
//! a pure function of a [`StoreSnapshot`]; the reference week is part of the
//! snapshot, never the wall clock.
//!
//! Null rules:
//! - week-over-week needs a stored record exactly seven days earlier; gaps are
//!   never interpolated
//! - the percentage delta is null when the previous value is null or zero
//! - trailing averages skip null samples in both numerator and denominator
//! - any non-finite intermediate is reported as null

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::db::{StoreSnapshot, WeeklyRecordStore};
use crate::models::{Metric, QueryOutcome, WeeklyRecord};
use crate::time::{previous_week, weeks_for_months};
use crate::Result;

/// Trailing average horizons, in months
pub const THREE_MONTHS: u32 = 3;
pub const SIX_MONTHS: u32 = 6;
pub const TWELVE_MONTHS: u32 = 12;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekOverWeek {
    pub absolute: Option<f64>,
    pub percentage: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrailingAverages {
    pub three_month: Option<f64>,
    pub six_month: Option<f64>,
    pub twelve_month: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSnapshot {
    pub current: Option<f64>,
    pub week_over_week: WeekOverWeek,
    pub trailing_averages: TrailingAverages,
}

/// Headline metrics for one reference week
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsReport {
    pub current_week: NaiveDate,
    pub metrics: BTreeMap<Metric, MetricSnapshot>,
    pub data_points: i64,
}

/// Largest number of records any trailing window reads
pub fn max_window_weeks() -> u32 {
    weeks_for_months(TWELVE_MONTHS)
}

/// Load a snapshot from the store and compute every tracked metric.
///
/// `as_of` overrides the latest stored week. An empty store yields
/// [`QueryOutcome::Empty`].
pub async fn current_metrics(
    store: &WeeklyRecordStore,
    as_of: Option<NaiveDate>,
) -> Result<QueryOutcome<MetricsReport>> {
    let snapshot = store.metrics_snapshot(as_of, max_window_weeks()).await?;
    Ok(match snapshot {
        Some(snapshot) => QueryOutcome::Ready(compute_metrics(&snapshot)),
        None => QueryOutcome::Empty,
    })
}

/// Compute the report for a snapshot
pub fn compute_metrics(snapshot: &StoreSnapshot) -> MetricsReport {
    let metrics = Metric::ALL
        .into_iter()
        .map(|metric| {
            (
                metric,
                metric_snapshot(&snapshot.records, snapshot.current_week, metric),
            )
        })
        .collect();

    MetricsReport {
        current_week: snapshot.current_week,
        metrics,
        data_points: snapshot.data_points,
    }
}

/// Compute one metric over ascending `records` for `current_week`
pub fn metric_snapshot(
    records: &[WeeklyRecord],
    current_week: NaiveDate,
    metric: Metric,
) -> MetricSnapshot {
    let value_at = |week: NaiveDate| {
        records
            .iter()
            .find(|r| r.week_start == week)
            .and_then(|r| r.values.metric(metric))
            .and_then(finite)
    };

    let current = value_at(current_week);
    let previous = value_at(previous_week(current_week));

    MetricSnapshot {
        current,
        week_over_week: week_over_week(current, previous),
        trailing_averages: TrailingAverages {
            three_month: trailing_average(records, current_week, weeks_for_months(THREE_MONTHS), metric),
            six_month: trailing_average(records, current_week, weeks_for_months(SIX_MONTHS), metric),
            twelve_month: trailing_average(records, current_week, weeks_for_months(TWELVE_MONTHS), metric),
        },
    }
}

/// Difference against the previous week; percentage is relative to |previous|
pub fn week_over_week(current: Option<f64>, previous: Option<f64>) -> WeekOverWeek {
    let (Some(current), Some(previous)) = (current, previous) else {
        return WeekOverWeek::default();
    };

    let absolute = finite(current - previous);
    let percentage = match absolute {
        Some(delta) if previous != 0.0 => finite(delta / previous.abs() * 100.0),
        _ => None,
    };

    WeekOverWeek {
        absolute,
        percentage,
    }
}

/// Mean of the non-null samples among the last `weeks` records at or before
/// `current_week`.
///
/// `records` must be ascending by week. Returns `None` when the window holds no
/// non-null sample.
pub fn trailing_average(
    records: &[WeeklyRecord],
    current_week: NaiveDate,
    weeks: u32,
    metric: Metric,
) -> Option<f64> {
    let eligible = records.partition_point(|r| r.week_start <= current_week);
    let start = eligible.saturating_sub(weeks as usize);

    let (sum, samples) = records[start..eligible]
        .iter()
        .filter_map(|r| r.values.metric(metric).and_then(finite))
        .fold((0.0, 0u32), |(sum, n), value| (sum + value, n + 1));

    if samples == 0 {
        return None;
    }
    finite(sum / f64::from(samples))
}

fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}
