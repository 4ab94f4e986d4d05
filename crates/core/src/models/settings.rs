use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::errors::CoreError;
use crate::models::cache::DataKind;

/// What to do when a holding's currency has no entry in the rate table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MissingRatePolicy {
    /// Treat one unit of the currency as one unit of the reporting currency.
    #[default]
    AssumeParity,
    /// Leave the amount unconverted and drop it from totals.
    Exclude,
}

/// Cache lifetimes in seconds, one per kind of market data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheTtl {
    pub quote_secs: i64,
    pub fx_rate_secs: i64,
    pub profile_secs: i64,
    pub history_secs: i64,
    pub score_secs: i64,
}

impl Default for CacheTtl {
    fn default() -> Self {
        Self {
            quote_secs: 300,
            fx_rate_secs: 300,
            profile_secs: 600,
            history_secs: 86_400,
            score_secs: 3_600,
        }
    }
}

impl CacheTtl {
    pub fn for_kind(&self, kind: DataKind) -> chrono::Duration {
        let secs = match kind {
            DataKind::Quote => self.quote_secs,
            DataKind::FxRate => self.fx_rate_secs,
            DataKind::Profile => self.profile_secs,
            DataKind::History | DataKind::FxHistory => self.history_secs,
            DataKind::Score => self.score_secs,
        };
        chrono::Duration::seconds(secs)
    }

    /// Every lifetime must be zero or more seconds.
    pub fn validate(&self) -> Result<(), CoreError> {
        let fields = [
            ("quote_secs", self.quote_secs),
            ("fx_rate_secs", self.fx_rate_secs),
            ("profile_secs", self.profile_secs),
            ("history_secs", self.history_secs),
            ("score_secs", self.score_secs),
        ];
        match fields.iter().find(|(_, secs)| *secs < 0) {
            Some((name, secs)) => Err(CoreError::InvalidConfig(format!(
                "cache_ttl.{name} must not be negative, got {secs}"
            ))),
            None => Ok(()),
        }
    }
}

/// Engine configuration. Every field has a default for an SGD-reporting
/// portfolio, so an empty JSON object is a valid config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Currency all aggregate values are expressed in.
    pub reporting_currency: String,

    /// Currency code → region label for region allocation.
    pub region_table: HashMap<String, String>,

    /// Region for currencies missing from `region_table`.
    pub default_region: String,

    /// Symbol suffix → listing currency, used only when a symbol's currency
    /// is not known from a holding record.
    pub symbol_suffix_currencies: HashMap<String, String>,

    /// Listing currency for symbols matching no suffix.
    pub default_listing_currency: String,

    /// Static rates used when a live FX lookup fails.
    pub fallback_rates: HashMap<String, f64>,

    pub missing_rate_policy: MissingRatePolicy,

    /// Maximum target weight of any single symbol, in (0, 1].
    pub concentration_cap: f64,

    /// |delta| in percentage points below which an action is Hold.
    pub rebalance_deadband_pct: f64,

    pub solver_epsilon: f64,
    pub solver_max_iterations: usize,

    pub cache_ttl: CacheTtl,

    /// Index used for the benchmark line of the performance report.
    pub benchmark_symbol: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let region_table = [("SGD", "SG"), ("HKD", "HK"), ("USD", "US")]
            .into_iter()
            .map(|(c, r)| (c.to_string(), r.to_string()))
            .collect();
        let symbol_suffix_currencies = [(".SI", "SGD"), (".HK", "HKD")]
            .into_iter()
            .map(|(s, c)| (s.to_string(), c.to_string()))
            .collect();
        let fallback_rates = [("HKD", 0.173), ("USD", 1.35)]
            .into_iter()
            .map(|(c, r)| (c.to_string(), r))
            .collect();
        Self {
            reporting_currency: "SGD".to_string(),
            region_table,
            default_region: "US".to_string(),
            symbol_suffix_currencies,
            default_listing_currency: "USD".to_string(),
            fallback_rates,
            missing_rate_policy: MissingRatePolicy::default(),
            concentration_cap: 0.25,
            rebalance_deadband_pct: 1.0,
            solver_epsilon: 1e-9,
            solver_max_iterations: 100,
            cache_ttl: CacheTtl::default(),
            benchmark_symbol: "^GSPC".to_string(),
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON config. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, CoreError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        let config = config.normalized();
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON config file (native only, not WASM).
    #[cfg(not(target_arch = "wasm32"))]
    pub fn from_json_file(path: impl AsRef<std::path::Path>) -> Result<Self, CoreError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.reporting_currency.trim().is_empty() {
            return Err(CoreError::InvalidConfig(
                "reporting_currency must not be empty".into(),
            ));
        }
        if !(self.concentration_cap > 0.0 && self.concentration_cap <= 1.0) {
            return Err(CoreError::InvalidConfig(format!(
                "concentration_cap must be in (0, 1], got {}",
                self.concentration_cap
            )));
        }
        if !self.rebalance_deadband_pct.is_finite() || self.rebalance_deadband_pct < 0.0 {
            return Err(CoreError::InvalidConfig(format!(
                "rebalance_deadband_pct must be a non-negative number, got {}",
                self.rebalance_deadband_pct
            )));
        }
        if !(self.solver_epsilon.is_finite() && self.solver_epsilon > 0.0) {
            return Err(CoreError::InvalidConfig(format!(
                "solver_epsilon must be positive, got {}",
                self.solver_epsilon
            )));
        }
        if self.solver_max_iterations == 0 {
            return Err(CoreError::InvalidConfig(
                "solver_max_iterations must be at least 1".into(),
            ));
        }
        self.cache_ttl.validate()?;
        for (currency, rate) in &self.fallback_rates {
            if !rate.is_finite() || *rate <= 0.0 {
                return Err(CoreError::InvalidConfig(format!(
                    "fallback rate for {currency} must be positive, got {rate}"
                )));
            }
        }
        Ok(())
    }

    /// Uppercase every currency code so table lookups match `Holding`.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.reporting_currency = self.reporting_currency.trim().to_uppercase();
        self.default_listing_currency = self.default_listing_currency.trim().to_uppercase();
        self.region_table = self
            .region_table
            .into_iter()
            .map(|(c, r)| (c.to_uppercase(), r))
            .collect();
        self.symbol_suffix_currencies = self
            .symbol_suffix_currencies
            .into_iter()
            .map(|(s, c)| (s.to_uppercase(), c.to_uppercase()))
            .collect();
        self.fallback_rates = self
            .fallback_rates
            .into_iter()
            .map(|(c, r)| (c.to_uppercase(), r))
            .collect();
        self
    }

    /// Listing currency inferred from the symbol's exchange suffix.
    /// The longest matching suffix wins.
    pub fn listing_currency(&self, symbol: &str) -> &str {
        let upper = symbol.to_uppercase();
        self.symbol_suffix_currencies
            .iter()
            .filter(|(suffix, _)| upper.ends_with(suffix.as_str()))
            .max_by_key(|(suffix, _)| suffix.len())
            .map(|(_, currency)| currency.as_str())
            .unwrap_or(&self.default_listing_currency)
    }
}
