//! CSV parsing and validation for weekly AR uploads
//!
//! Expected layout: one header row followed by one row per week, exactly
//! [`COLUMN_COUNT`] positional columns:
//!
//! ```text
//! Week, Overdue GMV, Collected GMV, Collected Invoices, DSO,
//! Weighted Avg Days Overdue, Weighted Avg Days Late,
//! 0-10 Days, 11-30 Days, 31-60 Days, 61-90 Days, 90+ Days,
//! % Credit Sales, CEI, AR Turnover Ratio
//! ```
//!
//! Structural defects (missing header, column count, week date, duplicate
//! week) reject the row and fail the batch. Cell-level noise degrades the
//! cell to `None` and is reported as a warning.

use std::collections::HashMap;
use std::fmt;

use chrono::NaiveDate;
use thiserror::Error;

use crate::models::{WeeklyRecord, WeeklyValues};
use crate::time::parse_week_date;

/// Number of columns every row must carry
pub const COLUMN_COUNT: usize = 15;

/// Canonical column names, in file order
pub const COLUMNS: [&str; COLUMN_COUNT] = [
    "Week",
    "Overdue GMV",
    "Collected GMV",
    "Collected Invoices",
    "DSO",
    "Weighted Avg Days Overdue",
    "Weighted Avg Days Late",
    "0-10 Days",
    "11-30 Days",
    "31-60 Days",
    "61-90 Days",
    "90+ Days",
    "% Credit Sales",
    "CEI",
    "AR Turnover Ratio",
];

const INVOICE_COUNT_COLUMN: usize = 3;

/// Defect that rejects a row (or the whole file) and fails the batch
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StructuralCsvError {
    #[error("CSV file is empty; expected a header row")]
    Empty,

    #[error("File is not valid UTF-8 text")]
    InvalidEncoding,

    #[error("Row {line}: malformed CSV: {message}")]
    Malformed { line: u64, message: String },

    #[error("Header row has {found} columns; expected 15")]
    HeaderColumnCount { found: usize },

    #[error("Row 1 holds week '{week}' instead of a header row")]
    MissingHeader { week: String },

    #[error("Row {line}: expected 15 columns, found {found}")]
    ColumnCount { line: u64, found: usize },

    #[error("Row {line}: invalid week date '{value}' (expected M/D/YYYY)")]
    InvalidWeek { line: u64, value: String },

    #[error("Row {line}: duplicate week {week} (first seen on row {first_line})")]
    DuplicateWeek {
        line: u64,
        week: NaiveDate,
        first_line: u64,
    },

    #[error("CSV contains no data rows")]
    NoDataRows,
}

/// Why a cell was stored as null
#[derive(Debug, Clone, PartialEq)]
pub enum CellDefect {
    Blank,
    ErrorSentinel(String),
    Unparseable(String),
    NonFinite(String),
    FractionalCount(String),
    NegativeCount(String),
    CountOutOfRange(String),
}

impl fmt::Display for CellDefect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellDefect::Blank => write!(f, "blank value"),
            CellDefect::ErrorSentinel(raw) => write!(f, "spreadsheet error '{}'", raw),
            CellDefect::Unparseable(raw) => write!(f, "'{}' is not a number", raw),
            CellDefect::NonFinite(raw) => write!(f, "'{}' is not a finite number", raw),
            CellDefect::FractionalCount(raw) => write!(f, "'{}' is not a whole count", raw),
            CellDefect::NegativeCount(raw) => write!(f, "'{}' is a negative count", raw),
            CellDefect::CountOutOfRange(raw) => write!(f, "'{}' is too large for a count", raw),
        }
    }
}

/// Soft defect: the cell became null but the row was kept
#[derive(Debug, Clone, PartialEq)]
pub struct FieldNormalizationWarning {
    pub line: u64,
    pub column: &'static str,
    pub defect: CellDefect,
}

impl fmt::Display for FieldNormalizationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Row {}, column '{}': {}; stored as null",
            self.line, self.column, self.defect
        )
    }
}

/// Result of parsing one uploaded file
#[derive(Debug, Clone, Default)]
pub struct ParseOutcome {
    /// Validated records in file order
    pub records: Vec<WeeklyRecord>,
    /// Non-blank data rows seen
    pub total_rows: usize,
    pub success_count: usize,
    /// Rows dropped for structural defects
    pub skip_count: usize,
    pub warnings: Vec<FieldNormalizationWarning>,
    pub errors: Vec<StructuralCsvError>,
}

impl ParseOutcome {
    /// A batch may be committed only when no structural error occurred
    pub fn is_committable(&self) -> bool {
        self.errors.is_empty()
    }

    fn fail(error: StructuralCsvError) -> Self {
        Self {
            errors: vec![error],
            ..Default::default()
        }
    }
}

/// Normalize a numeric cell.
///
/// Strips currency symbols, thousands separators, inner whitespace and `%`
/// (percent values stay on the 0-100 scale). `(1,234)` and `$(1,234)` are
/// read as `-1234`.
pub fn normalize_number(raw: &str) -> Result<f64, CellDefect> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CellDefect::Blank);
    }
    if trimmed.starts_with('#') || trimmed.eq_ignore_ascii_case("n/a") {
        return Err(CellDefect::ErrorSentinel(trimmed.to_string()));
    }

    let cleaned: String = trimmed
        .chars()
        .filter(|c| !matches!(c, '$' | '€' | '£' | '¥' | '₹' | ',' | '%') && !c.is_whitespace())
        .collect();

    let (negative, body) = match cleaned.strip_prefix('(').and_then(|s| s.strip_suffix(')')) {
        Some(inner) => (true, inner),
        None => (false, cleaned.as_str()),
    };

    let value: f64 = body
        .parse()
        .map_err(|_| CellDefect::Unparseable(trimmed.to_string()))?;
    if !value.is_finite() {
        return Err(CellDefect::NonFinite(trimmed.to_string()));
    }

    Ok(if negative { -value } else { value })
}

/// Normalize an invoice count cell; fractional and negative values are rejected
pub fn normalize_count(raw: &str) -> Result<i64, CellDefect> {
    let value = normalize_number(raw)?;
    if value.fract() != 0.0 {
        return Err(CellDefect::FractionalCount(raw.trim().to_string()));
    }
    // i64::MAX rounds up to 2^63 as f64, so the bound is exclusive
    if value >= i64::MAX as f64 {
        return Err(CellDefect::CountOutOfRange(raw.trim().to_string()));
    }
    if value < 0.0 {
        return Err(CellDefect::NegativeCount(raw.trim().to_string()));
    }
    Ok(value as i64)
}

/// Parse raw uploaded bytes; anything that is not UTF-8 fails the batch
pub fn parse_weekly_csv_bytes(bytes: &[u8]) -> ParseOutcome {
    match std::str::from_utf8(bytes) {
        Ok(text) => parse_weekly_csv(text),
        Err(_) => ParseOutcome::fail(StructuralCsvError::InvalidEncoding),
    }
}

/// Parse an uploaded CSV document into validated weekly records
pub fn parse_weekly_csv(text: &str) -> ParseOutcome {
    let text = text.trim_start_matches('\u{feff}');
    if text.trim().is_empty() {
        return ParseOutcome::fail(StructuralCsvError::Empty);
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    match reader.headers() {
        Ok(headers) if headers.len() != COLUMN_COUNT => {
            return ParseOutcome::fail(StructuralCsvError::HeaderColumnCount {
                found: headers.len(),
            });
        }
        // Row 1 must be a header, not a week
        Ok(headers) if parse_week_date(&headers[0]).is_some() => {
            return ParseOutcome::fail(StructuralCsvError::MissingHeader {
                week: headers[0].to_string(),
            });
        }
        Ok(_) => {}
        Err(e) => {
            return ParseOutcome::fail(StructuralCsvError::Malformed {
                line: 1,
                message: e.to_string(),
            });
        }
    }

    let mut outcome = ParseOutcome::default();
    let mut seen_weeks: HashMap<NaiveDate, u64> = HashMap::new();

    for (index, result) in reader.records().enumerate() {
        let fallback_line = index as u64 + 2;
        let row = match result {
            Ok(row) => row,
            Err(e) => {
                let line = e.position().map(|p| p.line()).unwrap_or(fallback_line);
                outcome.total_rows += 1;
                outcome.skip_count += 1;
                outcome.errors.push(StructuralCsvError::Malformed {
                    line,
                    message: e.to_string(),
                });
                continue;
            }
        };
        let line = row.position().map(|p| p.line()).unwrap_or(fallback_line);

        if row.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        outcome.total_rows += 1;

        match parse_row(&row, line, &mut seen_weeks, &mut outcome.warnings) {
            Ok(record) => outcome.records.push(record),
            Err(error) => {
                outcome.skip_count += 1;
                outcome.errors.push(error);
            }
        }
    }

    if outcome.total_rows == 0 {
        outcome.errors.push(StructuralCsvError::NoDataRows);
    }
    outcome.success_count = outcome.records.len();
    outcome
}

fn parse_row(
    row: &csv::StringRecord,
    line: u64,
    seen_weeks: &mut HashMap<NaiveDate, u64>,
    warnings: &mut Vec<FieldNormalizationWarning>,
) -> Result<WeeklyRecord, StructuralCsvError> {
    if row.len() != COLUMN_COUNT {
        return Err(StructuralCsvError::ColumnCount {
            line,
            found: row.len(),
        });
    }

    let week_cell = &row[0];
    let week = parse_week_date(week_cell).ok_or_else(|| StructuralCsvError::InvalidWeek {
        line,
        value: week_cell.to_string(),
    })?;

    if let Some(&first_line) = seen_weeks.get(&week) {
        return Err(StructuralCsvError::DuplicateWeek {
            line,
            week,
            first_line,
        });
    }
    seen_weeks.insert(week, line);

    let mut amount = |column: usize| -> Option<f64> {
        normalize_number(&row[column])
            .map_err(|defect| {
                warnings.push(FieldNormalizationWarning {
                    line,
                    column: COLUMNS[column],
                    defect,
                })
            })
            .ok()
    };

    let overdue_gmv = amount(1);
    let collected_gmv = amount(2);
    let dso = amount(4);
    let weighted_avg_days_overdue = amount(5);
    let weighted_avg_days_late = amount(6);
    let aging_0_to_10 = amount(7);
    let aging_11_to_30 = amount(8);
    let aging_31_to_60 = amount(9);
    let aging_61_to_90 = amount(10);
    let aging_90_plus = amount(11);
    let credit_sales_percent = amount(12);
    let cei = amount(13);
    let ar_turnover_ratio = amount(14);

    let collected_invoices = normalize_count(&row[INVOICE_COUNT_COLUMN])
        .map_err(|defect| {
            warnings.push(FieldNormalizationWarning {
                line,
                column: COLUMNS[INVOICE_COUNT_COLUMN],
                defect,
            })
        })
        .ok();

    Ok(WeeklyRecord::new(
        week,
        WeeklyValues {
            overdue_gmv,
            collected_gmv,
            collected_invoices,
            dso,
            weighted_avg_days_overdue,
            weighted_avg_days_late,
            aging_0_to_10,
            aging_11_to_30,
            aging_31_to_60,
            aging_61_to_90,
            aging_90_plus,
            credit_sales_percent,
            cei,
            ar_turnover_ratio,
        },
    ))
}
