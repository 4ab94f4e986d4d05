use chrono::NaiveDate;
use log::debug;
use std::collections::HashMap;

use crate::models::holding::Holding;
use crate::models::market::Weights;
use crate::models::series::{intersect_dates, TimeSeries};
use crate::models::settings::EngineConfig;

/// Reconstructs daily portfolio value series in the reporting currency.
///
/// Histories are keyed by symbol (prices) and by currency code (FX, in
/// units of reporting currency per unit). Every series is aligned onto the
/// intersection of the price histories' dates:
/// - a date where any contributing symbol lacks a price is dropped
/// - FX values are carried forward from the latest observation
/// - the reporting currency, or a currency without FX history, uses 1.0
pub struct ChartService {
    config: EngineConfig,
}

impl ChartService {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// value(t) = Σ shares × close(t) × fx(t) over holdings with history.
    pub fn actual_series(
        &self,
        holdings: &[Holding],
        price_histories: &HashMap<String, TimeSeries>,
        fx_histories: &HashMap<String, TimeSeries>,
    ) -> TimeSeries {
        let held: Vec<(&Holding, &TimeSeries)> = holdings
            .iter()
            .filter_map(|h| {
                h.find_in(price_histories)
                    .filter(|s| !s.is_empty())
                    .map(|s| (h, s))
            })
            .collect();
        if held.is_empty() {
            return TimeSeries::default();
        }

        let index = intersect_dates(held.iter().map(|(_, s)| *s));
        if index.is_empty() {
            debug!("Price histories of {} holdings share no dates", held.len());
            return TimeSeries::default();
        }

        let mut totals = vec![0.0; index.len()];
        for (holding, history) in held {
            let closes = history.forward_fill(&index);
            let fx = self.fx_path(&holding.currency, fx_histories, &index);
            for (i, close) in closes.iter().enumerate() {
                if let Some(close) = close {
                    totals[i] += holding.shares * close * fx[i];
                }
            }
        }

        TimeSeries::from_pairs(index.into_iter().zip(totals))
    }

    /// Value of a portfolio that put `invested` into `target` weights at
    /// the first common date on or after `start_date` and never traded.
    ///
    /// `currencies` maps symbols to their trading currency; symbols missing
    /// from it fall back to the exchange-suffix table.
    pub fn hypothetical_series(
        &self,
        target: &Weights,
        invested: f64,
        price_histories: &HashMap<String, TimeSeries>,
        fx_histories: &HashMap<String, TimeSeries>,
        start_date: NaiveDate,
        currencies: &HashMap<String, String>,
    ) -> TimeSeries {
        let mut relevant: Vec<(&String, f64, &TimeSeries)> = target
            .iter()
            .filter(|(_, w)| w.is_finite() && **w > 0.0)
            .filter_map(|(symbol, w)| {
                price_histories
                    .get(symbol)
                    .filter(|s| !s.is_empty())
                    .map(|s| (symbol, *w, s))
            })
            .collect();
        if relevant.is_empty() {
            return TimeSeries::default();
        }
        relevant.sort_by(|a, b| a.0.cmp(b.0));

        let mut index = intersect_dates(relevant.iter().map(|(_, _, s)| *s));
        index.retain(|d| *d >= start_date);
        if index.is_empty() {
            return TimeSeries::default();
        }

        let mut totals = vec![0.0; index.len()];
        for (symbol, weight, history) in relevant {
            let closes = history.forward_fill(&index);
            let currency = currencies
                .get(symbol)
                .map(String::as_str)
                .unwrap_or_else(|| self.config.listing_currency(symbol));
            let fx = self.fx_path(currency, fx_histories, &index);

            let start_value = match closes.first() {
                Some(Some(close)) => close * fx[0],
                _ => continue,
            };
            if start_value == 0.0 {
                debug!("Skipping {symbol}: zero start price");
                continue;
            }

            let shares = invested * weight / start_value;
            for (i, close) in closes.iter().enumerate() {
                if let Some(close) = close {
                    totals[i] += shares * close * fx[i];
                }
            }
        }

        TimeSeries::from_pairs(index.into_iter().zip(totals))
    }

    /// Benchmark rescaled onto `actual`'s dates so both start at the same
    /// value. `None` when the benchmark has no observation on or before
    /// the first date, or that observation is zero.
    pub fn benchmark_series(&self, benchmark: &TimeSeries, actual: &TimeSeries) -> Option<TimeSeries> {
        let first_value = actual.first()?.price;
        let index = actual.dates();
        let aligned = benchmark.forward_fill(&index);
        let base = aligned.first().copied().flatten()?;
        if base == 0.0 {
            return None;
        }
        let factor = first_value / base;
        Some(TimeSeries::from_pairs(
            index
                .into_iter()
                .zip(aligned)
                .filter_map(|(date, value)| value.map(|v| (date, v * factor))),
        ))
    }

    /// FX multiplier for every date of `index`.
    fn fx_path(
        &self,
        currency: &str,
        fx_histories: &HashMap<String, TimeSeries>,
        index: &[NaiveDate],
    ) -> Vec<f64> {
        if currency.eq_ignore_ascii_case(&self.config.reporting_currency) {
            return vec![1.0; index.len()];
        }
        match fx_histories
            .get(&currency.to_uppercase())
            .filter(|s| !s.is_empty())
        {
            Some(history) => history
                .forward_fill(index)
                .into_iter()
                .map(|rate| rate.unwrap_or(1.0))
                .collect(),
            None => {
                debug!("No FX history for {currency}; using 1.0");
                vec![1.0; index.len()]
            }
        }
    }
}

impl Default for ChartService {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}
