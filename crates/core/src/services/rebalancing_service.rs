use std::collections::{BTreeSet, HashMap};

use crate::models::analytics::{RebalancingAction, TradeAction};
use crate::models::holding::Holding;
use crate::models::market::Weights;

/// Diffs current against target weights and labels each symbol
/// Buy / Sell / Hold.
///
/// Moves smaller than the deadband (in percentage points) are Hold so that
/// trivial trades are never recommended.
#[derive(Debug, Clone, Copy)]
pub struct RebalancingService {
    deadband_pct: f64,
}

impl Default for RebalancingService {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl RebalancingService {
    pub fn new(deadband_pct: f64) -> Self {
        Self { deadband_pct }
    }

    pub fn deadband_pct(&self) -> f64 {
        self.deadband_pct
    }

    /// `|delta| < deadband` → Hold, positive → Buy, otherwise Sell.
    pub fn classify(&self, delta_pct: f64) -> TradeAction {
        if delta_pct.abs() < self.deadband_pct {
            TradeAction::Hold
        } else if delta_pct > 0.0 {
            TradeAction::Buy
        } else {
            TradeAction::Sell
        }
    }

    /// One action per symbol in either weight map, sorted by symbol.
    pub fn rebalancing_actions(
        &self,
        holdings: &[Holding],
        current: &Weights,
        target: &Weights,
        total_value: f64,
    ) -> Vec<RebalancingAction> {
        let companies: HashMap<&str, &str> = holdings
            .iter()
            .map(|h| (h.symbol.as_str(), h.company.as_str()))
            .collect();

        let symbols: BTreeSet<&String> = current.keys().chain(target.keys()).collect();

        symbols
            .into_iter()
            .map(|symbol| {
                let current_pct = current.get(symbol).copied().unwrap_or(0.0) * 100.0;
                let suggested_pct = target.get(symbol).copied().unwrap_or(0.0) * 100.0;
                let delta_pct = suggested_pct - current_pct;
                RebalancingAction {
                    symbol: symbol.clone(),
                    company: companies
                        .get(symbol.as_str())
                        .map(|c| c.to_string())
                        .unwrap_or_else(|| symbol.clone()),
                    current_pct,
                    suggested_pct,
                    delta_pct,
                    delta_value: delta_pct / 100.0 * total_value,
                    action: self.classify(delta_pct),
                }
            })
            .collect()
    }
}
