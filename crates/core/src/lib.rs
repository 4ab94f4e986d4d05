pub mod errors;
pub mod models;
pub mod providers;
pub mod services;

use chrono::NaiveDate;
use std::collections::HashMap;

use errors::CoreError;
use models::{
    analytics::{PortfolioSummary, RebalancingAction},
    chart::PerformanceReport,
    holding::Holding,
    market::{
        HistorySnapshot, MarketSnapshot, MetricMap, PriceSnapshot, RateTable, ScoreMap, SectorMap,
        Weights,
    },
    series::TimeSeries,
    settings::EngineConfig,
};
use providers::registry::ProviderRegistry;
use services::{
    allocation_service::AllocationService, analytics_service::AnalyticsService,
    chart_service::ChartService, currency_service::CurrencyService,
    market_data_service::MarketDataService, rebalancing_service::RebalancingService,
    target_weight_service::TargetWeightService, valuation_service::ValuationService,
};

/// Main entry point for the portfolio engine.
///
/// Holds an immutable, validated `EngineConfig` and the services built from
/// it. Every operation is a pure function of its arguments: the engine does
/// no I/O and keeps no state between calls. Use `market_data_service` to
/// gather the snapshots it consumes.
#[must_use]
pub struct PortfolioEngine {
    config: EngineConfig,
    currency_service: CurrencyService,
    valuation_service: ValuationService,
    allocation_service: AllocationService,
    target_weight_service: TargetWeightService,
    rebalancing_service: RebalancingService,
    chart_service: ChartService,
    analytics_service: AnalyticsService,
}

impl std::fmt::Debug for PortfolioEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortfolioEngine")
            .field("reporting_currency", &self.config.reporting_currency)
            .field("concentration_cap", &self.config.concentration_cap)
            .field("missing_rate_policy", &self.config.missing_rate_policy)
            .finish()
    }
}

impl PortfolioEngine {
    /// Build an engine from a configuration, validating it first.
    pub fn new(config: EngineConfig) -> Result<Self, CoreError> {
        let config = config.normalized();
        config.validate()?;
        Ok(Self::build(config))
    }

    /// Wire the services for an already validated config.
    fn build(config: EngineConfig) -> Self {
        let currency_service = CurrencyService::new(config.missing_rate_policy);
        let valuation_service = ValuationService::new(currency_service);
        Self {
            allocation_service: AllocationService::from_config(valuation_service, &config),
            target_weight_service: TargetWeightService::from_config(&config),
            rebalancing_service: RebalancingService::new(config.rebalance_deadband_pct),
            chart_service: ChartService::new(config.clone()),
            analytics_service: AnalyticsService::new(&config),
            currency_service,
            valuation_service,
            config,
        }
    }

    /// Build an engine from a JSON config; missing fields take defaults.
    pub fn from_json_config(json: &str) -> Result<Self, CoreError> {
        Self::new(EngineConfig::from_json_str(json)?)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// A batch-fetch service sharing this engine's configuration.
    pub fn market_data_service(&self, registry: ProviderRegistry) -> MarketDataService {
        MarketDataService::new(registry, self.config.clone())
    }

    // ── Currency & valuation ────────────────────────────────────────

    /// Convert a local-currency amount to the reporting currency.
    /// `None` only under `MissingRatePolicy::Exclude` with no rate.
    pub fn to_reporting_currency(&self, amount: f64, currency: &str, rates: &RateTable) -> Option<f64> {
        self.currency_service
            .to_reporting_currency(amount, currency, rates)
    }

    /// Market value of all priced holdings in the reporting currency.
    pub fn total_value(&self, holdings: &[Holding], prices: &PriceSnapshot, rates: &RateTable) -> f64 {
        self.valuation_service.total_value(holdings, prices, rates)
    }

    /// Purchase cost of all holdings in the reporting currency.
    pub fn cost_basis(&self, holdings: &[Holding], rates: &RateTable) -> f64 {
        self.valuation_service.cost_basis(holdings, rates)
    }

    // ── Weights & allocation ────────────────────────────────────────

    pub fn weights(&self, holdings: &[Holding], prices: &PriceSnapshot, rates: &RateTable) -> Weights {
        self.allocation_service.weights(holdings, prices, rates)
    }

    /// Region label → percent of total value.
    pub fn region_allocation(
        &self,
        holdings: &[Holding],
        prices: &PriceSnapshot,
        rates: &RateTable,
    ) -> HashMap<String, f64> {
        self.allocation_service
            .region_allocation(holdings, prices, rates)
    }

    /// Sector label → percent of total value.
    pub fn sector_allocation(
        &self,
        holdings: &[Holding],
        prices: &PriceSnapshot,
        rates: &RateTable,
        sectors: &SectorMap,
    ) -> HashMap<String, f64> {
        self.allocation_service
            .sector_allocation(holdings, prices, rates, sectors)
    }

    pub fn weighted_metric(&self, weights: &Weights, metrics: &MetricMap, key: &str) -> f64 {
        AllocationService::weighted_metric(weights, metrics, key)
    }

    /// Current positions heavier than the configured concentration cap,
    /// heaviest first.
    pub fn concentration_warnings(&self, weights: &Weights) -> Vec<(String, f64)> {
        AllocationService::over_cap(weights, self.config.concentration_cap)
    }

    // ── Targets & rebalancing ───────────────────────────────────────

    /// Concentration-capped target weights from quality scores.
    pub fn suggest_weights(&self, candidates: &[String], scores: &ScoreMap) -> Weights {
        self.target_weight_service
            .suggest_weights(candidates, scores)
    }

    /// Buy / Sell / Hold per symbol, sorted by symbol.
    pub fn rebalancing_actions(
        &self,
        holdings: &[Holding],
        current: &Weights,
        target: &Weights,
        total_value: f64,
    ) -> Vec<RebalancingAction> {
        self.rebalancing_service
            .rebalancing_actions(holdings, current, target, total_value)
    }

    // ── History ─────────────────────────────────────────────────────

    pub fn actual_series(
        &self,
        holdings: &[Holding],
        price_histories: &HashMap<String, TimeSeries>,
        fx_histories: &HashMap<String, TimeSeries>,
    ) -> TimeSeries {
        self.chart_service
            .actual_series(holdings, price_histories, fx_histories)
    }

    /// Buy-and-hold value of `invested` split by `target` from `start_date`.
    /// Symbol currencies come from `holdings`, then the suffix table.
    pub fn hypothetical_series(
        &self,
        holdings: &[Holding],
        target: &Weights,
        invested: f64,
        price_histories: &HashMap<String, TimeSeries>,
        fx_histories: &HashMap<String, TimeSeries>,
        start_date: NaiveDate,
    ) -> TimeSeries {
        let currencies: HashMap<String, String> = holdings
            .iter()
            .map(|h| (h.symbol.clone(), h.currency.clone()))
            .collect();
        self.chart_service.hypothetical_series(
            target,
            invested,
            price_histories,
            fx_histories,
            start_date,
            &currencies,
        )
    }

    pub fn benchmark_series(&self, benchmark: &TimeSeries, actual: &TimeSeries) -> Option<TimeSeries> {
        self.chart_service.benchmark_series(benchmark, actual)
    }

    // ── Reports ─────────────────────────────────────────────────────

    /// Gain/loss, return and a per-holding breakdown.
    pub fn summary(
        &self,
        holdings: &[Holding],
        prices: &PriceSnapshot,
        rates: &RateTable,
    ) -> PortfolioSummary {
        self.analytics_service
            .portfolio_summary(holdings, prices, rates)
    }

    /// `summary` over a fetched snapshot, including day changes.
    pub fn snapshot_summary(
        &self,
        holdings: &[Holding],
        snapshot: &MarketSnapshot,
    ) -> PortfolioSummary {
        self.analytics_service.snapshot_summary(holdings, snapshot)
    }

    /// Actual vs. suggested vs. benchmark over the fetched history.
    pub fn performance(
        &self,
        holdings: &[Holding],
        candidates: &[String],
        scores: &ScoreMap,
        history: &HistorySnapshot,
        rates: &RateTable,
    ) -> PerformanceReport {
        self.analytics_service
            .performance_report(holdings, candidates, scores, history, rates)
    }
}

impl Default for PortfolioEngine {
    fn default() -> Self {
        Self::build(EngineConfig::default())
    }
}
