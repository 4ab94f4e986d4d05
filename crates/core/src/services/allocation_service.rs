use std::collections::HashMap;

use crate::models::holding::Holding;
use crate::models::market::{MetricMap, PriceSnapshot, RateTable, SectorMap, Weights, UNKNOWN_SECTOR};
use crate::models::settings::EngineConfig;
use crate::services::valuation_service::ValuationService;

/// Per-symbol weights and region/sector allocation breakdowns.
///
/// Weights are fractions (0–1); allocations are percentages (0–100).
/// A portfolio with no priced value yields empty maps everywhere.
#[derive(Debug, Clone)]
pub struct AllocationService {
    valuation: ValuationService,
    region_table: HashMap<String, String>,
    default_region: String,
}

impl AllocationService {
    pub fn new(
        valuation: ValuationService,
        region_table: HashMap<String, String>,
        default_region: impl Into<String>,
    ) -> Self {
        Self {
            valuation,
            region_table: region_table
                .into_iter()
                .map(|(c, r)| (c.to_uppercase(), r))
                .collect(),
            default_region: default_region.into(),
        }
    }

    pub fn from_config(valuation: ValuationService, config: &EngineConfig) -> Self {
        Self::new(
            valuation,
            config.region_table.clone(),
            config.default_region.clone(),
        )
    }

    pub fn region_for(&self, currency: &str) -> &str {
        self.region_table
            .get(&currency.to_uppercase())
            .map(String::as_str)
            .unwrap_or(&self.default_region)
    }

    /// Symbol → share of total value. Repeated symbols accumulate.
    pub fn weights(
        &self,
        holdings: &[Holding],
        prices: &PriceSnapshot,
        rates: &RateTable,
    ) -> Weights {
        self.group_fractions(holdings, prices, rates, Holding::symbol_key)
    }

    /// Region label → percentage of total value.
    pub fn region_allocation(
        &self,
        holdings: &[Holding],
        prices: &PriceSnapshot,
        rates: &RateTable,
    ) -> HashMap<String, f64> {
        to_percentages(self.group_fractions(holdings, prices, rates, |h| {
            self.region_for(&h.currency).to_string()
        }))
    }

    /// Sector label → percentage of total value; unknown sectors pool under
    /// `"Unknown"`.
    pub fn sector_allocation(
        &self,
        holdings: &[Holding],
        prices: &PriceSnapshot,
        rates: &RateTable,
        sectors: &SectorMap,
    ) -> HashMap<String, f64> {
        to_percentages(self.group_fractions(holdings, prices, rates, |h| {
            h.find_in(sectors)
                .filter(|s| !s.trim().is_empty())
                .cloned()
                .unwrap_or_else(|| UNKNOWN_SECTOR.to_string())
        }))
    }

    /// Value-weighted average of `metrics[symbol][key]`.
    ///
    /// A metric of exactly 0 means "not available" for financial ratios and
    /// is left out of the sum, as are non-finite values. The result is not
    /// rescaled for the missing weight.
    pub fn weighted_metric(weights: &Weights, metrics: &MetricMap, key: &str) -> f64 {
        weights
            .iter()
            .filter_map(|(symbol, weight)| {
                let value = metrics.get(symbol)?.get(key).copied()?;
                (value != 0.0 && value.is_finite()).then_some(weight * value)
            })
            .sum()
    }

    /// Symbols whose weight is strictly above `cap`, heaviest first.
    /// Ties are ordered by symbol.
    pub fn over_cap(weights: &Weights, cap: f64) -> Vec<(String, f64)> {
        let mut flagged: Vec<(String, f64)> = weights
            .iter()
            .filter(|(_, w)| **w > cap)
            .map(|(symbol, w)| (symbol.clone(), *w))
            .collect();
        flagged.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        flagged
    }

    fn group_fractions<F>(
        &self,
        holdings: &[Holding],
        prices: &PriceSnapshot,
        rates: &RateTable,
        group_of: F,
    ) -> HashMap<String, f64>
    where
        F: Fn(&Holding) -> String,
    {
        let mut values: HashMap<String, f64> = HashMap::new();
        let mut total = 0.0;
        for holding in holdings {
            if let Some(value) = self.valuation.position_value(holding, prices, rates) {
                *values.entry(group_of(holding)).or_insert(0.0) += value;
                total += value;
            }
        }

        if !(total > 0.0 && total.is_finite()) {
            return HashMap::new();
        }

        values
            .into_iter()
            .map(|(group, value)| (group, value / total))
            .collect()
    }
}

/// Fractions → percentages, dropping empty groups.
fn to_percentages(fractions: HashMap<String, f64>) -> HashMap<String, f64> {
    fractions
        .into_iter()
        .filter(|(_, f)| *f > 0.0)
        .map(|(group, f)| (group, f * 100.0))
        .collect()
}
