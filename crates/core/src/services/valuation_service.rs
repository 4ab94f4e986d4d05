use crate::models::holding::Holding;
use crate::models::market::{PriceSnapshot, RateTable};
use crate::services::currency_service::CurrencyService;

/// Market value and cost basis in the reporting currency.
///
/// Holdings without a known price are skipped, not zeroed: a partial price
/// outage lowers the total instead of invalidating it.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValuationService {
    currency_service: CurrencyService,
}

impl ValuationService {
    pub fn new(currency_service: CurrencyService) -> Self {
        Self { currency_service }
    }

    pub fn currency_service(&self) -> &CurrencyService {
        &self.currency_service
    }

    /// Latest trading-currency price of one holding, if known.
    pub fn local_price(holding: &Holding, prices: &PriceSnapshot) -> Option<f64> {
        holding.find_in(prices).copied()
    }

    /// Reporting-currency value of one holding, `None` if unpriced.
    pub fn position_value(
        &self,
        holding: &Holding,
        prices: &PriceSnapshot,
        rates: &RateTable,
    ) -> Option<f64> {
        let price = Self::local_price(holding, prices)?;
        let price = self
            .currency_service
            .to_reporting_currency(price, &holding.currency, rates)?;
        Some(holding.shares * price)
    }

    /// Reporting-currency purchase cost of one holding.
    pub fn position_cost(&self, holding: &Holding, rates: &RateTable) -> Option<f64> {
        let price = self.currency_service.to_reporting_currency(
            holding.purchase_price,
            &holding.currency,
            rates,
        )?;
        Some(holding.shares * price)
    }

    pub fn total_value(
        &self,
        holdings: &[Holding],
        prices: &PriceSnapshot,
        rates: &RateTable,
    ) -> f64 {
        holdings
            .iter()
            .filter_map(|h| self.position_value(h, prices, rates))
            .sum()
    }

    /// Purchase price is recorded at entry, so every holding counts.
    pub fn cost_basis(&self, holdings: &[Holding], rates: &RateTable) -> f64 {
        holdings
            .iter()
            .filter_map(|h| self.position_cost(h, rates))
            .sum()
    }
}
