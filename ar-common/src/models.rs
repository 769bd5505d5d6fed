//! Weekly accounts-receivable data model

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Raw per-week AR figures as uploaded.
///
/// Every field is optional: blank or unparseable source cells are stored as
/// `None`, never as zero. Percent-style fields (`credit_sales_percent`, `cei`)
/// hold values on a 0-100 scale.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyValues {
    pub overdue_gmv: Option<f64>,
    pub collected_gmv: Option<f64>,
    pub collected_invoices: Option<i64>,
    pub dso: Option<f64>,
    pub weighted_avg_days_overdue: Option<f64>,
    pub weighted_avg_days_late: Option<f64>,
    #[serde(rename = "aging0To10")]
    pub aging_0_to_10: Option<f64>,
    #[serde(rename = "aging11To30")]
    pub aging_11_to_30: Option<f64>,
    #[serde(rename = "aging31To60")]
    pub aging_31_to_60: Option<f64>,
    #[serde(rename = "aging61To90")]
    pub aging_61_to_90: Option<f64>,
    #[serde(rename = "aging90Plus")]
    pub aging_90_plus: Option<f64>,
    pub credit_sales_percent: Option<f64>,
    pub cei: Option<f64>,
    pub ar_turnover_ratio: Option<f64>,
}

impl WeeklyValues {
    /// Value of a tracked metric as a float
    pub fn metric(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::OverdueGmv => self.overdue_gmv,
            Metric::CollectedGmv => self.collected_gmv,
            Metric::CollectedInvoices => self.collected_invoices.map(|count| count as f64),
            Metric::Dso => self.dso,
            Metric::WeightedAvgDaysOverdue => self.weighted_avg_days_overdue,
            Metric::WeightedAvgDaysLate => self.weighted_avg_days_late,
            Metric::CreditSalesPercent => self.credit_sales_percent,
            Metric::Cei => self.cei,
            Metric::ArTurnoverRatio => self.ar_turnover_ratio,
        }
    }
}

/// One stored row, unique per `week_start`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyRecord {
    pub week_start: NaiveDate,
    #[serde(flatten)]
    pub values: WeeklyValues,
}

impl WeeklyRecord {
    pub fn new(week_start: NaiveDate, values: WeeklyValues) -> Self {
        Self { week_start, values }
    }
}

/// The tracked headline metrics reported by the metrics query
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Metric {
    OverdueGmv,
    CollectedGmv,
    CollectedInvoices,
    Dso,
    WeightedAvgDaysOverdue,
    WeightedAvgDaysLate,
    CreditSalesPercent,
    Cei,
    ArTurnoverRatio,
}

impl Metric {
    pub const ALL: [Metric; 9] = [
        Metric::OverdueGmv,
        Metric::CollectedGmv,
        Metric::CollectedInvoices,
        Metric::Dso,
        Metric::WeightedAvgDaysOverdue,
        Metric::WeightedAvgDaysLate,
        Metric::CreditSalesPercent,
        Metric::Cei,
        Metric::ArTurnoverRatio,
    ];

    /// JSON key of the metric
    pub fn key(self) -> &'static str {
        match self {
            Metric::OverdueGmv => "overdueGmv",
            Metric::CollectedGmv => "collectedGmv",
            Metric::CollectedInvoices => "collectedInvoices",
            Metric::Dso => "dso",
            Metric::WeightedAvgDaysOverdue => "weightedAvgDaysOverdue",
            Metric::WeightedAvgDaysLate => "weightedAvgDaysLate",
            Metric::CreditSalesPercent => "creditSalesPercent",
            Metric::Cei => "cei",
            Metric::ArTurnoverRatio => "arTurnoverRatio",
        }
    }
}

/// Result of a query that distinguishes an empty store from a populated one
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome<T> {
    /// The store holds no records at all
    Empty,
    Ready(T),
}

impl<T> QueryOutcome<T> {
    pub fn ready(self) -> Option<T> {
        match self {
            QueryOutcome::Empty => None,
            QueryOutcome::Ready(value) => Some(value),
        }
    }
}
