//! # AR Metrics Common Library
//!
//! Weekly accounts-receivable metrics core shared by the service:
//! - Data model (weekly records, tracked metrics)
//! - CSV parsing and validation
//! - SQLite weekly record store
//! - Metrics engine (current, week-over-week, trailing averages)
//! - Historical aggregation
//! - Configuration loading

pub mod config;
pub mod csv_import;
pub mod db;
pub mod error;
pub mod history;
pub mod ingest;
pub mod metrics;
pub mod models;
pub mod time;

pub use error::{Error, Result};
pub use models::{Metric, QueryOutcome, WeeklyRecord, WeeklyValues};
