use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::errors::CoreError;
use super::series::TimeSeries;

/// Symbol → latest local-currency price. Absent symbols are unpriced.
pub type PriceSnapshot = HashMap<String, f64>;

/// Symbol → sector label.
pub type SectorMap = HashMap<String, String>;

/// Symbol → quality score (0–100).
pub type ScoreMap = HashMap<String, f64>;

/// Symbol → (metric name → value), e.g. "P/E Ratio" or "Score".
pub type MetricMap = HashMap<String, HashMap<String, f64>>;

/// Symbol → fraction of total reporting-currency value.
pub type Weights = HashMap<String, f64>;

/// Sector label used when none is known.
pub const UNKNOWN_SECTOR: &str = "Unknown";

/// Units of reporting currency per one unit of each currency.
///
/// The reporting currency itself is implicitly 1.0 and is never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateTable {
    reporting_currency: String,
    rates: HashMap<String, f64>,
}

impl RateTable {
    pub fn new(reporting_currency: impl Into<String>) -> Self {
        Self {
            reporting_currency: reporting_currency.into().trim().to_uppercase(),
            rates: HashMap::new(),
        }
    }

    /// Build a table from `(currency, rate)` pairs, rejecting bad rates.
    pub fn from_rates<I, S>(reporting_currency: impl Into<String>, rates: I) -> Result<Self, CoreError>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let mut table = Self::new(reporting_currency);
        for (currency, rate) in rates {
            table.set_rate(currency, rate)?;
        }
        Ok(table)
    }

    pub fn reporting_currency(&self) -> &str {
        &self.reporting_currency
    }

    pub fn set_rate(&mut self, currency: impl Into<String>, rate: f64) -> Result<(), CoreError> {
        let currency = currency.into().trim().to_uppercase();
        if !rate.is_finite() || rate <= 0.0 {
            return Err(CoreError::Validation(format!(
                "FX rate for {currency} must be positive and finite, got {rate}"
            )));
        }
        if currency != self.reporting_currency {
            self.rates.insert(currency, rate);
        }
        Ok(())
    }

    /// Rate for `currency`; always `Some(1.0)` for the reporting currency.
    pub fn rate(&self, currency: &str) -> Option<f64> {
        let upper = currency.to_uppercase();
        if upper == self.reporting_currency {
            return Some(1.0);
        }
        self.rates.get(&upper).copied()
    }

    pub fn currencies(&self) -> impl Iterator<Item = &str> {
        self.rates.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

/// Latest close plus the close before it, both in the trading currency.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub price: f64,
    pub previous_close: Option<f64>,
}

impl Quote {
    pub fn new(price: f64) -> Self {
        Self {
            price,
            previous_close: None,
        }
    }

    #[must_use]
    pub fn with_previous_close(mut self, previous_close: f64) -> Self {
        self.previous_close = Some(previous_close);
        self
    }

    /// `price - previous_close`.
    pub fn day_change(&self) -> Option<f64> {
        self.previous_close.map(|prev| self.price - prev)
    }

    /// Change since the previous close in percent; `None` without a
    /// positive previous close.
    pub fn day_change_pct(&self) -> Option<f64> {
        day_change_pct(self.price, self.previous_close?)
    }
}

/// `(price - previous) / previous * 100`, or `None` when `previous` is not
/// a positive number.
pub fn day_change_pct(price: f64, previous: f64) -> Option<f64> {
    (previous > 0.0 && previous.is_finite() && price.is_finite())
        .then(|| (price - previous) / previous * 100.0)
}

/// Descriptive data about a symbol.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SymbolProfile {
    pub sector: Option<String>,
    pub long_name: Option<String>,
}

/// Everything the engine needs for a point-in-time valuation, gathered in
/// one batch before any computation runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub prices: PriceSnapshot,
    /// Close before the latest one, for symbols whose quote carried it.
    #[serde(default)]
    pub previous_closes: PriceSnapshot,
    pub rates: RateTable,
    pub sectors: SectorMap,
    pub company_names: HashMap<String, String>,
    pub scores: ScoreMap,
}

impl MarketSnapshot {
    pub fn new(rates: RateTable) -> Self {
        Self {
            prices: HashMap::new(),
            previous_closes: HashMap::new(),
            rates,
            sectors: HashMap::new(),
            company_names: HashMap::new(),
            scores: HashMap::new(),
        }
    }
}

/// Histories for the performance report, keyed by symbol / currency code.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistorySnapshot {
    pub prices: HashMap<String, TimeSeries>,
    pub fx: HashMap<String, TimeSeries>,
    pub benchmark: Option<TimeSeries>,
}
