use std::collections::HashMap;

use crate::models::analytics::{HoldingSummary, PortfolioSummary};
use crate::models::chart::PerformanceReport;
use crate::models::holding::Holding;
use crate::models::market::{
    day_change_pct, HistorySnapshot, MarketSnapshot, PriceSnapshot, RateTable, ScoreMap,
};
use crate::models::series::TimeSeries;
use crate::models::settings::EngineConfig;
use crate::services::chart_service::ChartService;
use crate::services::currency_service::CurrencyService;
use crate::services::target_weight_service::TargetWeightService;
use crate::services::valuation_service::ValuationService;

/// Computes portfolio analytics: gain/loss, returns, per-holding breakdown
/// and the actual vs. suggested vs. benchmark performance report.
pub struct AnalyticsService {
    valuation: ValuationService,
    chart_service: ChartService,
    target_weights: TargetWeightService,
}

impl AnalyticsService {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            valuation: ValuationService::new(CurrencyService::new(config.missing_rate_policy)),
            chart_service: ChartService::new(config.clone()),
            target_weights: TargetWeightService::from_config(config),
        }
    }

    /// Totals plus one row per holding.
    ///
    /// Return percentages are only computed against a positive cost, so a
    /// zero cost basis yields 0 rather than a division by zero. Rows carry
    /// no day change; see `snapshot_summary`.
    pub fn portfolio_summary(
        &self,
        holdings: &[Holding],
        prices: &PriceSnapshot,
        rates: &RateTable,
    ) -> PortfolioSummary {
        self.summarize(holdings, prices, &PriceSnapshot::new(), rates)
    }

    /// `portfolio_summary` over a fetched snapshot, with each row's move
    /// since the previous close.
    pub fn snapshot_summary(
        &self,
        holdings: &[Holding],
        snapshot: &MarketSnapshot,
    ) -> PortfolioSummary {
        self.summarize(
            holdings,
            &snapshot.prices,
            &snapshot.previous_closes,
            &snapshot.rates,
        )
    }

    fn summarize(
        &self,
        holdings: &[Holding],
        prices: &PriceSnapshot,
        previous_closes: &PriceSnapshot,
        rates: &RateTable,
    ) -> PortfolioSummary {
        let total_value = self.valuation.total_value(holdings, prices, rates);
        let cost_basis = self.valuation.cost_basis(holdings, rates);
        let gain_loss = total_value - cost_basis;

        let mut rows: Vec<HoldingSummary> = holdings
            .iter()
            .map(|h| {
                let market_value = self.valuation.position_value(h, prices, rates);
                let cost = self.valuation.position_cost(h, rates).unwrap_or(0.0);
                let gain_loss = market_value.map(|v| v - cost);
                let price = ValuationService::local_price(h, prices);
                let day_change = price
                    .zip(h.find_in(previous_closes).copied())
                    .and_then(|(price, previous)| day_change_pct(price, previous));
                HoldingSummary {
                    symbol: h.symbol.clone(),
                    company: h.company.clone(),
                    shares: h.shares,
                    currency: h.currency.clone(),
                    price,
                    market_value,
                    cost,
                    gain_loss,
                    return_pct: gain_loss.and_then(|g| (cost > 0.0).then(|| g / cost * 100.0)),
                    day_change_pct: day_change,
                    weight_pct: match market_value {
                        Some(v) if total_value > 0.0 => v / total_value * 100.0,
                        _ => 0.0,
                    },
                }
            })
            .collect();

        // Largest value first, unpriced rows last
        rows.sort_by(|a, b| {
            let a = a.market_value.unwrap_or(f64::NEG_INFINITY);
            let b = b.market_value.unwrap_or(f64::NEG_INFINITY);
            b.partial_cmp(&a).unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut unpriced_symbols: Vec<String> = rows
            .iter()
            .filter(|r| r.market_value.is_none())
            .map(|r| r.symbol.clone())
            .collect();
        unpriced_symbols.sort();
        unpriced_symbols.dedup();

        PortfolioSummary {
            reporting_currency: rates.reporting_currency().to_string(),
            total_value,
            cost_basis,
            gain_loss,
            return_pct: if cost_basis > 0.0 {
                gain_loss / cost_basis * 100.0
            } else {
                0.0
            },
            priced_holdings: rows.iter().filter(|r| r.market_value.is_some()).count(),
            unpriced_symbols,
            holdings: rows,
        }
    }

    /// Actual history, the score-weighted alternative and the benchmark.
    ///
    /// The alternative starts on the actual series' first date with the
    /// portfolio's cost basis (or, without one, its first actual value).
    pub fn performance_report(
        &self,
        holdings: &[Holding],
        candidates: &[String],
        scores: &ScoreMap,
        history: &HistorySnapshot,
        rates: &RateTable,
    ) -> PerformanceReport {
        let actual = self
            .chart_service
            .actual_series(holdings, &history.prices, &history.fx);
        let target_weights = self.target_weights.suggest_weights(candidates, scores);

        let Some(first) = actual.first().copied() else {
            return PerformanceReport {
                actual,
                hypothetical: TimeSeries::default(),
                benchmark: None,
                target_weights,
                invested: 0.0,
                actual_return_pct: None,
                hypothetical_return_pct: None,
                benchmark_return_pct: None,
            };
        };

        let cost_basis = self.valuation.cost_basis(holdings, rates);
        let invested = if cost_basis > 0.0 { cost_basis } else { first.price };

        let currencies: HashMap<String, String> = holdings
            .iter()
            .map(|h| (h.symbol.clone(), h.currency.clone()))
            .collect();

        let hypothetical = self.chart_service.hypothetical_series(
            &target_weights,
            invested,
            &history.prices,
            &history.fx,
            first.date,
            &currencies,
        );
        let benchmark = history
            .benchmark
            .as_ref()
            .and_then(|b| self.chart_service.benchmark_series(b, &actual));

        PerformanceReport {
            actual_return_pct: actual.return_pct(),
            hypothetical_return_pct: hypothetical.return_pct(),
            benchmark_return_pct: benchmark.as_ref().and_then(TimeSeries::return_pct),
            actual,
            hypothetical,
            benchmark,
            target_weights,
            invested,
        }
    }
}

impl Default for AnalyticsService {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}
