use log::warn;

use crate::models::market::RateTable;
use crate::models::settings::MissingRatePolicy;

/// Converts local-currency amounts into the reporting currency.
///
/// Uses only the rates it is handed. When a currency has no rate the
/// configured `MissingRatePolicy` decides:
/// - `AssumeParity`: the amount passes through unchanged (rate 1.0)
/// - `Exclude`: the conversion yields `None` and callers skip the amount
#[derive(Debug, Clone, Copy, Default)]
pub struct CurrencyService {
    missing_rate_policy: MissingRatePolicy,
}

impl CurrencyService {
    pub fn new(missing_rate_policy: MissingRatePolicy) -> Self {
        Self { missing_rate_policy }
    }

    pub fn missing_rate_policy(&self) -> MissingRatePolicy {
        self.missing_rate_policy
    }

    /// Convert `amount` in `currency` to the table's reporting currency.
    /// E.g., to_reporting_currency(20.0, "USD", {USD: 1.35}) → 27.0
    pub fn to_reporting_currency(
        &self,
        amount: f64,
        currency: &str,
        rates: &RateTable,
    ) -> Option<f64> {
        if currency.eq_ignore_ascii_case(rates.reporting_currency()) {
            return Some(amount);
        }

        match rates.rate(currency) {
            Some(rate) => Some(amount * rate),
            None => match self.missing_rate_policy {
                MissingRatePolicy::AssumeParity => {
                    warn!(
                        "No FX rate for {currency}; assuming parity with {}",
                        rates.reporting_currency()
                    );
                    Some(amount)
                }
                MissingRatePolicy::Exclude => {
                    warn!("No FX rate for {currency}; amount excluded");
                    None
                }
            },
        }
    }
}
