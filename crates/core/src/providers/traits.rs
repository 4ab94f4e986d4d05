use async_trait::async_trait;
use chrono::NaiveDate;

use crate::errors::CoreError;
use crate::models::cache::DataKind;
use crate::models::market::{Quote, SymbolProfile};
use crate::models::series::PricePoint;

/// Trait abstraction for market data sources.
///
/// Each source (Yahoo Finance, Frankfurter, test doubles) implements the
/// methods for the kinds it lists in `capabilities`; the rest keep the
/// default `Unsupported` error. The registry only routes a request to
/// providers that declare the matching capability.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait MarketDataProvider: Send + Sync {
    /// Human-readable name of this provider (for logs/errors).
    fn name(&self) -> &str;

    /// Which kinds of data this provider can serve.
    fn capabilities(&self) -> Vec<DataKind>;

    /// Latest close of `symbol` in its trading currency.
    async fn get_current_price(&self, symbol: &str) -> Result<f64, CoreError> {
        let _ = symbol;
        Err(self.unsupported(DataKind::Quote))
    }

    /// Latest close with the close before it. Sources without a previous
    /// close only fill in the price.
    async fn get_quote(&self, symbol: &str) -> Result<Quote, CoreError> {
        Ok(Quote::new(self.get_current_price(symbol).await?))
    }

    /// Units of `to` per one unit of `from`.
    async fn get_fx_rate(&self, from: &str, to: &str) -> Result<f64, CoreError> {
        let _ = (from, to);
        Err(self.unsupported(DataKind::FxRate))
    }

    /// Daily closes of `symbol` between two dates (inclusive), sorted.
    async fn get_price_history(
        &self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<PricePoint>, CoreError> {
        let _ = (symbol, from, to);
        Err(self.unsupported(DataKind::History))
    }

    /// Daily `from_currency → to_currency` rates between two dates, sorted.
    async fn get_fx_history(
        &self,
        from_currency: &str,
        to_currency: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<PricePoint>, CoreError> {
        let _ = (from_currency, to_currency, from, to);
        Err(self.unsupported(DataKind::FxHistory))
    }

    /// Sector classification and long name.
    async fn get_profile(&self, symbol: &str) -> Result<SymbolProfile, CoreError> {
        let _ = symbol;
        Err(self.unsupported(DataKind::Profile))
    }

    fn unsupported(&self, capability: DataKind) -> CoreError {
        CoreError::Unsupported {
            provider: self.name().to_string(),
            capability,
        }
    }
}

/// Source of per-symbol quality scores (0–100).
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait ScoreProvider: Send + Sync {
    fn name(&self) -> &str;

    /// `Ok(None)` means the symbol is known to have no score.
    async fn get_score(&self, symbol: &str) -> Result<Option<f64>, CoreError>;
}
