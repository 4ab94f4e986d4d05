use serde::{Deserialize, Serialize};

/// Valuation summary of the whole portfolio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSummary {
    /// Currency used for all monetary values
    pub reporting_currency: String,

    /// Market value of all priced holdings
    pub total_value: f64,

    /// Purchase cost of all holdings
    pub cost_basis: f64,

    /// total_value - cost_basis
    pub gain_loss: f64,

    /// (gain_loss / cost_basis) * 100, or 0 when there is no cost basis
    pub return_pct: f64,

    /// Number of holdings that contributed to `total_value`
    pub priced_holdings: usize,

    /// Symbols skipped for lack of a price, sorted
    pub unpriced_symbols: Vec<String>,

    /// Per-holding breakdown, largest value first, unpriced rows last
    pub holdings: Vec<HoldingSummary>,
}

/// One row of the holdings breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldingSummary {
    pub symbol: String,
    pub company: String,
    pub shares: f64,
    pub currency: String,

    /// Latest local-currency price, if known
    pub price: Option<f64>,

    /// Market value in the reporting currency, if priced
    pub market_value: Option<f64>,

    /// Purchase cost in the reporting currency
    pub cost: f64,

    pub gain_loss: Option<f64>,
    pub return_pct: Option<f64>,

    /// Percent move since the previous close, when it is known
    #[serde(default)]
    pub day_change_pct: Option<f64>,

    /// Share of total value, 0–100 (0 when unpriced)
    pub weight_pct: f64,
}

/// Recommended direction of a rebalancing trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TradeAction {
    Buy,
    Sell,
    Hold,
}

impl std::fmt::Display for TradeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeAction::Buy => write!(f, "Buy"),
            TradeAction::Sell => write!(f, "Sell"),
            TradeAction::Hold => write!(f, "Hold"),
        }
    }
}

/// Move needed to take one symbol from its current to its target weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RebalancingAction {
    pub symbol: String,
    pub company: String,
    pub current_pct: f64,
    pub suggested_pct: f64,
    /// suggested_pct - current_pct
    pub delta_pct: f64,
    /// delta_pct / 100 * total value, in the reporting currency
    pub delta_value: f64,
    pub action: TradeAction,
}
