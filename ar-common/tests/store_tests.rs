//! Integration tests for the weekly record store, ingestion and the queries
//! built on top of it

use ar_common::db::{init_database, DatasetStatus, UploadLogEntry, WeeklyRecordStore};
use ar_common::history::historical_series;
use ar_common::ingest::ingest_csv;
use ar_common::metrics::current_metrics;
use ar_common::{Metric, QueryOutcome, WeeklyRecord, WeeklyValues};
use chrono::{NaiveDate, TimeZone, Utc};
use tempfile::TempDir;

const HEADER: &str = "Week,Overdue GMV,Collected GMV,Collected Invoices,DSO,Weighted Avg Days Overdue,Weighted Avg Days Late,0-10 Days,11-30 Days,31-60 Days,61-90 Days,90+ Days,% Credit Sales,CEI,AR Turnover Ratio";

/// Test helper: fresh store backed by a throwaway database file
async fn setup_store() -> (TempDir, WeeklyRecordStore) {
    let dir = tempfile::tempdir().expect("Should create temp dir");
    let pool = init_database(&dir.path().join("ar_metrics.db"))
        .await
        .expect("Should initialize database");
    (dir, WeeklyRecordStore::new(pool))
}

fn csv_with(rows: &[&str]) -> String {
    let mut text = String::from(HEADER);
    for row in rows {
        text.push('\n');
        text.push_str(row);
    }
    text.push('\n');
    text
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn upload_time() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 6, 1, 12, 0, 0).unwrap()
}

fn dso_record(week: NaiveDate, dso: Option<f64>) -> WeeklyRecord {
    WeeklyRecord::new(
        week,
        WeeklyValues {
            dso,
            ..Default::default()
        },
    )
}

fn upload_entry(filename: &str) -> UploadLogEntry {
    UploadLogEntry {
        filename: filename.to_string(),
        uploaded_at: upload_time(),
        total_records: 0,
        success_count: 0,
        skip_count: 0,
    }
}

// =============================================================================
// Store operations
// =============================================================================

#[tokio::test]
async fn test_empty_store() {
    let (_dir, store) = setup_store().await;

    assert_eq!(store.count().await.unwrap(), 0);
    assert_eq!(store.latest_week().await.unwrap(), None);
    assert_eq!(store.get(date(2023, 1, 2)).await.unwrap(), None);
    assert!(store.last_upload().await.unwrap().is_none());

    let status = store.status().await.unwrap();
    assert_eq!(status.status, DatasetStatus::Empty);
    assert_eq!(status.total_records, 0);
    assert_eq!(status.latest_data_week, None);
    assert_eq!(status.last_upload_timestamp, None);
}

#[tokio::test]
async fn test_upsert_replaces_whole_row() {
    let (_dir, store) = setup_store().await;
    let week = date(2023, 1, 2);

    store
        .upsert(&WeeklyRecord::new(
            week,
            WeeklyValues {
                overdue_gmv: Some(100.0),
                dso: Some(40.0),
                ..Default::default()
            },
        ))
        .await
        .unwrap();

    // Second version leaves dso null; it must not keep the stale 40.0
    let replacement = WeeklyRecord::new(
        week,
        WeeklyValues {
            overdue_gmv: Some(200.0),
            cei: Some(75.0),
            ..Default::default()
        },
    );
    store.upsert(&replacement).await.unwrap();

    assert_eq!(store.count().await.unwrap(), 1);
    assert_eq!(store.get(week).await.unwrap(), Some(replacement));
}

#[tokio::test]
async fn test_queries_are_ascending() {
    let (_dir, store) = setup_store().await;
    let weeks = [date(2023, 1, 16), date(2023, 1, 2), date(2023, 1, 30), date(2023, 1, 9)];
    let records: Vec<WeeklyRecord> = weeks.iter().map(|w| dso_record(*w, Some(1.0))).collect();
    store.upsert_batch(&records, &upload_entry("a.csv")).await.unwrap();

    let all: Vec<NaiveDate> = store.all().await.unwrap().iter().map(|r| r.week_start).collect();
    assert_eq!(
        all,
        vec![date(2023, 1, 2), date(2023, 1, 9), date(2023, 1, 16), date(2023, 1, 30)]
    );

    let range: Vec<NaiveDate> = store
        .range(date(2023, 1, 9), date(2023, 1, 16))
        .await
        .unwrap()
        .iter()
        .map(|r| r.week_start)
        .collect();
    assert_eq!(range, vec![date(2023, 1, 9), date(2023, 1, 16)]);

    let latest: Vec<NaiveDate> = store
        .latest_at_or_before(date(2023, 1, 20), 2)
        .await
        .unwrap()
        .iter()
        .map(|r| r.week_start)
        .collect();
    assert_eq!(latest, vec![date(2023, 1, 9), date(2023, 1, 16)]);

    assert_eq!(store.latest_week().await.unwrap(), Some(date(2023, 1, 30)));
}

#[tokio::test]
async fn test_upload_log_feeds_status() {
    let (_dir, store) = setup_store().await;
    store
        .upsert_batch(&[dso_record(date(2023, 1, 2), Some(1.0))], &upload_entry("first.csv"))
        .await
        .unwrap();

    let last = store.last_upload().await.unwrap().unwrap();
    assert_eq!(last.filename, "first.csv");
    assert_eq!(last.uploaded_at, upload_time());

    let status = store.status().await.unwrap();
    assert_eq!(status.status, DatasetStatus::Ready);
    assert_eq!(status.total_records, 1);
    assert_eq!(status.latest_data_week, Some(date(2023, 1, 2)));
    assert_eq!(status.last_upload_timestamp, Some(upload_time()));
}

// =============================================================================
// Ingestion
// =============================================================================

#[tokio::test]
async fn test_ingest_round_trip_is_bit_identical() {
    let (_dir, store) = setup_store().await;
    let text = csv_with(&["1/2/2023,1234.56,987.65,42,45.5,12.25,3.125,100.5,200.25,300,400,500.75,65.4,82.1,7.3"]);

    let report = ingest_csv(&store, "clean.csv", text.as_bytes(), upload_time())
        .await
        .unwrap();
    assert!(report.success, "{:?}", report.errors);
    assert_eq!(report.details.success_count, 1);

    let stored = store.get(date(2023, 1, 2)).await.unwrap().unwrap();
    let v = stored.values;
    assert_eq!(v.overdue_gmv.map(f64::to_bits), Some(1234.56f64.to_bits()));
    assert_eq!(v.collected_gmv.map(f64::to_bits), Some(987.65f64.to_bits()));
    assert_eq!(v.collected_invoices, Some(42));
    assert_eq!(v.weighted_avg_days_late.map(f64::to_bits), Some(3.125f64.to_bits()));
    assert_eq!(v.aging_90_plus.map(f64::to_bits), Some(500.75f64.to_bits()));
    assert_eq!(v.credit_sales_percent.map(f64::to_bits), Some(65.4f64.to_bits()));
    assert_eq!(v.cei.map(f64::to_bits), Some(82.1f64.to_bits()));
    assert_eq!(v.ar_turnover_ratio.map(f64::to_bits), Some(7.3f64.to_bits()));
}

#[tokio::test]
async fn test_ingest_is_idempotent() {
    let (_dir, store) = setup_store().await;
    let text = csv_with(&[
        "1/2/2023,$100,$50,10,45,10,2,1,2,3,4,5,60%,80%,7",
        "1/9/2023,$110,#N/A,11,46,11,3,1,2,3,4,5,61%,81%,7.5",
        "1/16/2023,$120,$60,,47,12,4,1,2,3,4,5,62%,82%,8",
    ]);

    let first = ingest_csv(&store, "weekly.csv", text.as_bytes(), upload_time())
        .await
        .unwrap();
    assert!(first.success);
    let after_first = store.all().await.unwrap();

    let second = ingest_csv(&store, "weekly.csv", text.as_bytes(), upload_time())
        .await
        .unwrap();
    assert!(second.success);
    let after_second = store.all().await.unwrap();

    assert_eq!(after_first.len(), 3);
    assert_eq!(after_first, after_second);
    assert_eq!(first.warnings, second.warnings);
}

#[tokio::test]
async fn test_duplicate_week_rejects_whole_batch() {
    let (_dir, store) = setup_store().await;
    let text = csv_with(&[
        "5/8/2023,100,50,10,45,10,2,1,2,3,4,5,60,80,7",
        "5/15/2023,100,50,10,45,10,2,1,2,3,4,5,60,80,7",
        "5/15/2023,200,50,10,45,10,2,1,2,3,4,5,60,80,7",
    ]);

    let report = ingest_csv(&store, "dupes.csv", text.as_bytes(), upload_time())
        .await
        .unwrap();

    assert!(!report.success);
    assert_eq!(report.details.total_records, 3);
    assert_eq!(report.details.skip_count, 1);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].contains("duplicate week 2023-05-15"));
    assert_eq!(store.count().await.unwrap(), 0);
    assert!(store.last_upload().await.unwrap().is_none());
}

#[tokio::test]
async fn test_rejected_batch_leaves_previous_data_untouched() {
    let (_dir, store) = setup_store().await;
    let good = csv_with(&["1/2/2023,100,50,10,45,10,2,1,2,3,4,5,60,80,7"]);
    assert!(ingest_csv(&store, "good.csv", good.as_bytes(), upload_time())
        .await
        .unwrap()
        .success);

    let bad = csv_with(&[
        "1/2/2023,999,999,999,999,999,999,999,999,999,999,999,999,999,999",
        "not-a-date,1,2,3,4,5,6,7,8,9,10,11,12,13,14",
    ]);
    let report = ingest_csv(&store, "bad.csv", bad.as_bytes(), upload_time())
        .await
        .unwrap();

    assert!(!report.success);
    let stored = store.get(date(2023, 1, 2)).await.unwrap().unwrap();
    assert_eq!(stored.values.overdue_gmv, Some(100.0));
    assert_eq!(store.last_upload().await.unwrap().unwrap().filename, "good.csv");
}

#[tokio::test]
async fn test_reupload_with_blank_cell_replaces_value_with_null() {
    let (_dir, store) = setup_store().await;
    let original = csv_with(&["1/2/2023,100,50,10,45,10,2,1,2,3,4,5,60,80,7"]);
    let corrected = csv_with(&["1/2/2023,100,50,10,,10,2,1,2,3,4,5,60,80,7"]);

    ingest_csv(&store, "v1.csv", original.as_bytes(), upload_time())
        .await
        .unwrap();
    let report = ingest_csv(&store, "v2.csv", corrected.as_bytes(), upload_time())
        .await
        .unwrap();

    assert!(report.success);
    assert_eq!(report.warnings.len(), 1);
    let stored = store.get(date(2023, 1, 2)).await.unwrap().unwrap();
    assert_eq!(stored.values.dso, None);
    assert_eq!(stored.values.overdue_gmv, Some(100.0));
}

#[tokio::test]
async fn test_concurrent_uploads_serialize() {
    let (_dir, store) = setup_store().await;
    let first = csv_with(&[
        "1/2/2023,1,1,1,1,1,1,1,1,1,1,1,1,1,1",
        "1/9/2023,1,1,1,1,1,1,1,1,1,1,1,1,1,1",
    ]);
    let second = csv_with(&[
        "1/2/2023,2,2,2,2,2,2,2,2,2,2,2,2,2,2",
        "1/9/2023,2,2,2,2,2,2,2,2,2,2,2,2,2,2",
    ]);

    let (a, b) = tokio::join!(
        ingest_csv(&store, "one.csv", first.as_bytes(), upload_time()),
        ingest_csv(&store, "two.csv", second.as_bytes(), upload_time()),
    );
    assert!(a.unwrap().success);
    assert!(b.unwrap().success);

    // Whichever batch committed last owns both weeks; rows never mix batches
    let records = store.all().await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].values, records[1].values);
}

// =============================================================================
// Metrics and history over the store
// =============================================================================

#[tokio::test]
async fn test_current_metrics_on_empty_store() {
    let (_dir, store) = setup_store().await;
    let outcome = current_metrics(&store, None).await.unwrap();
    assert_eq!(outcome, QueryOutcome::Empty);
}

#[tokio::test]
async fn test_current_metrics_with_gap() {
    let (_dir, store) = setup_store().await;
    store
        .upsert_batch(
            &[
                dso_record(date(2023, 1, 2), Some(40.0)),
                dso_record(date(2023, 1, 16), Some(50.0)),
            ],
            &upload_entry("gap.csv"),
        )
        .await
        .unwrap();

    let report = current_metrics(&store, None).await.unwrap().ready().unwrap();
    assert_eq!(report.current_week, date(2023, 1, 16));
    assert_eq!(report.data_points, 2);

    for metric in Metric::ALL {
        let snapshot = report.metrics[&metric];
        assert_eq!(snapshot.week_over_week.absolute, None, "{:?}", metric);
        assert_eq!(snapshot.week_over_week.percentage, None, "{:?}", metric);
    }
    let dso = report.metrics[&Metric::Dso];
    assert_eq!(dso.current, Some(50.0));
    assert_eq!(dso.trailing_averages.three_month, Some(45.0));
}

#[tokio::test]
async fn test_current_metrics_with_explicit_week() {
    let (_dir, store) = setup_store().await;
    store
        .upsert_batch(
            &[
                dso_record(date(2023, 1, 2), Some(40.0)),
                dso_record(date(2023, 1, 9), Some(44.0)),
                dso_record(date(2023, 1, 16), Some(50.0)),
            ],
            &upload_entry("three.csv"),
        )
        .await
        .unwrap();

    let report = current_metrics(&store, Some(date(2023, 1, 9)))
        .await
        .unwrap()
        .ready()
        .unwrap();
    assert_eq!(report.current_week, date(2023, 1, 9));
    assert_eq!(report.data_points, 2);

    let dso = report.metrics[&Metric::Dso];
    assert_eq!(dso.current, Some(44.0));
    assert_eq!(dso.week_over_week.absolute, Some(4.0));
    assert_eq!(dso.week_over_week.percentage, Some(10.0));
    assert_eq!(dso.trailing_averages.three_month, Some(42.0));
}

#[tokio::test]
async fn test_historical_series_is_sparse() {
    let (_dir, store) = setup_store().await;
    store
        .upsert_batch(
            &[
                dso_record(date(2022, 6, 6), Some(1.0)),
                dso_record(date(2023, 2, 6), Some(2.0)),
                dso_record(date(2023, 3, 27), Some(3.0)),
            ],
            &upload_entry("sparse.csv"),
        )
        .await
        .unwrap();

    let points = historical_series(&store, 3, None).await.unwrap();
    assert_eq!(points.len(), 2);
    assert_eq!(points[0].week, date(2023, 2, 6));
    assert_eq!(points[1].week, date(2023, 3, 27));

    let all = historical_series(&store, 36, None).await.unwrap();
    assert_eq!(all.len(), 3);

    let as_of = historical_series(&store, 3, Some(date(2023, 2, 6))).await.unwrap();
    assert_eq!(as_of.len(), 1);
}

#[tokio::test]
async fn test_historical_series_bounds_and_empty_store() {
    let (_dir, store) = setup_store().await;
    assert!(historical_series(&store, 12, None).await.unwrap().is_empty());
    assert!(matches!(
        historical_series(&store, 0, None).await,
        Err(ar_common::Error::InvalidInput(_))
    ));
    assert!(matches!(
        historical_series(&store, 37, None).await,
        Err(ar_common::Error::InvalidInput(_))
    ));
}

#[tokio::test]
async fn test_historical_series_window_edges() {
    let (_dir, store) = setup_store().await;
    store
        .upsert_batch(
            &[
                dso_record(date(2023, 2, 27), Some(1.0)),
                dso_record(date(2023, 3, 6), Some(2.0)),
                dso_record(date(2023, 3, 27), Some(3.0)),
                dso_record(date(2023, 4, 3), Some(4.0)),
            ],
            &upload_entry("edges.csv"),
        )
        .await
        .unwrap();

    // 1 month = 4 weekly slots ending 3/27: 3/6, 3/13, 3/20, 3/27
    let weeks: Vec<NaiveDate> = historical_series(&store, 1, Some(date(2023, 3, 27)))
        .await
        .unwrap()
        .iter()
        .map(|p| p.week)
        .collect();
    assert_eq!(weeks, vec![date(2023, 3, 6), date(2023, 3, 27)]);
}

#[tokio::test]
async fn test_headerless_upload_stores_nothing() {
    let (_dir, store) = setup_store().await;
    let text = "1/2/2023,1,2,3,4,5,6,7,8,9,10,11,12,13,14\n\
                1/9/2023,1,2,3,4,5,6,7,8,9,10,11,12,13,14\n";

    let report = ingest_csv(&store, "no-header.csv", text.as_bytes(), upload_time())
        .await
        .unwrap();

    assert!(!report.success);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].contains("instead of a header row"));
    assert_eq!(store.count().await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_readers_never_see_partial_batch() {
    let (_dir, store) = setup_store().await;
    let first_week = date(2015, 1, 5);
    let rows: Vec<String> = (0..400)
        .map(|i| {
            let week = first_week + chrono::Duration::weeks(i);
            format!("{},1,1,1,1,1,1,1,1,1,1,1,1,1,1", week.format("%-m/%-d/%Y"))
        })
        .collect();
    let row_refs: Vec<&str> = rows.iter().map(String::as_str).collect();
    let text = csv_with(&row_refs);

    let writer_store = store.clone();
    let writer = tokio::spawn(async move {
        ingest_csv(&writer_store, "large.csv", text.as_bytes(), upload_time()).await
    });

    let mut totals = std::collections::BTreeSet::new();
    let mut history_lengths = std::collections::BTreeSet::new();
    loop {
        let finished = writer.is_finished();
        totals.insert(store.status().await.unwrap().total_records);
        history_lengths.insert(historical_series(&store, 36, None).await.unwrap().len());
        if finished {
            break;
        }
        tokio::task::yield_now().await;
    }

    let report = writer.await.unwrap().unwrap();
    assert!(report.success);
    assert_eq!(report.details.success_count, 400);

    // 36 months = 156 weeks of the 400 stored
    assert!(totals.iter().all(|t| *t == 0 || *t == 400), "{:?}", totals);
    assert!(totals.contains(&400));
    assert!(
        history_lengths.iter().all(|n| *n == 0 || *n == 156),
        "{:?}",
        history_lengths
    );
    assert!(history_lengths.contains(&156));
}
