use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::market::Weights;
use super::series::TimeSeries;

/// Look-back window for the performance chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HistoryPeriod {
    OneMonth,
    ThreeMonths,
    SixMonths,
    OneYear,
    /// Purchase dates are not recorded, so "All" falls back to one year.
    All,
}

impl HistoryPeriod {
    pub fn days(&self) -> i64 {
        match self {
            HistoryPeriod::OneMonth => 30,
            HistoryPeriod::ThreeMonths => 91,
            HistoryPeriod::SixMonths => 182,
            HistoryPeriod::OneYear | HistoryPeriod::All => 365,
        }
    }

    /// First calendar date of the window ending at `today`.
    pub fn start_date(&self, today: NaiveDate) -> NaiveDate {
        today - chrono::Duration::days(self.days())
    }
}

impl std::fmt::Display for HistoryPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HistoryPeriod::OneMonth => write!(f, "1M"),
            HistoryPeriod::ThreeMonths => write!(f, "3M"),
            HistoryPeriod::SixMonths => write!(f, "6M"),
            HistoryPeriod::OneYear => write!(f, "1Y"),
            HistoryPeriod::All => write!(f, "All"),
        }
    }
}

impl std::str::FromStr for HistoryPeriod {
    type Err = crate::errors::CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "1M" => Ok(HistoryPeriod::OneMonth),
            "3M" => Ok(HistoryPeriod::ThreeMonths),
            "6M" => Ok(HistoryPeriod::SixMonths),
            "1Y" => Ok(HistoryPeriod::OneYear),
            "ALL" => Ok(HistoryPeriod::All),
            other => Err(crate::errors::CoreError::Validation(format!(
                "unknown history period: {other}"
            ))),
        }
    }
}

/// Actual vs. target-weighted vs. benchmark value over time, all in the
/// reporting currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub actual: TimeSeries,
    pub hypothetical: TimeSeries,
    /// Benchmark rescaled to start at the actual portfolio's first value
    pub benchmark: Option<TimeSeries>,

    /// Target weights the hypothetical series was built from
    pub target_weights: Weights,

    /// Amount allocated at the start of the hypothetical series
    pub invested: f64,

    pub actual_return_pct: Option<f64>,
    pub hypothetical_return_pct: Option<f64>,
    pub benchmark_return_pct: Option<f64>,
}
