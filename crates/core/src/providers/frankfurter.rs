use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
#[cfg(not(target_arch = "wasm32"))]
use std::time::Duration;

use crate::errors::CoreError;
use crate::models::cache::DataKind;
use crate::models::series::PricePoint;
use super::traits::MarketDataProvider;

const DEFAULT_BASE_URL: &str = "https://api.frankfurter.dev/v1";

/// ECB reference rates via the Frankfurter API. FX only, business days
/// only, no key.
pub struct FrankfurterProvider {
    client: Client,
    base_url: String,
}

#[derive(Deserialize)]
struct LatestRates {
    rates: BTreeMap<String, f64>,
}

#[derive(Deserialize)]
struct RateSeries {
    rates: BTreeMap<NaiveDate, BTreeMap<String, f64>>,
}

impl FrankfurterProvider {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Point at a self-hosted Frankfurter instance.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let builder = Client::builder();
        #[cfg(not(target_arch = "wasm32"))]
        let builder = builder.timeout(Duration::from_secs(30));
        Self {
            client: builder.build().unwrap_or_else(|_| Client::new()),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, pair: &str) -> Result<T, CoreError> {
        self.client
            .get(format!("{}/{path}", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .map_err(|e| CoreError::Api {
                provider: self.name().to_string(),
                message: format!("Unreadable response for {pair}: {e}"),
            })
    }
}

impl Default for FrankfurterProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl MarketDataProvider for FrankfurterProvider {
    fn name(&self) -> &str {
        "Frankfurter"
    }

    fn capabilities(&self) -> Vec<DataKind> {
        vec![DataKind::FxRate, DataKind::FxHistory]
    }

    async fn get_fx_rate(&self, from: &str, to: &str) -> Result<f64, CoreError> {
        let (base, quote) = (from.to_uppercase(), to.to_uppercase());
        if base == quote {
            return Ok(1.0);
        }

        let pair = format!("{base}/{quote}");
        let latest: LatestRates = self
            .get_json(&format!("latest?base={base}&symbols={quote}"), &pair)
            .await?;
        latest.rates.get(&quote).copied().ok_or_else(|| CoreError::DataNotAvailable {
            symbol: pair,
            what: "FX rate".into(),
        })
    }

    /// Same-currency requests are answered locally with one point per
    /// calendar day.
    async fn get_fx_history(
        &self,
        from_currency: &str,
        to_currency: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<PricePoint>, CoreError> {
        let (base, quote) = (from_currency.to_uppercase(), to_currency.to_uppercase());
        if base == quote {
            return Ok(from
                .iter_days()
                .take_while(|d| *d <= to)
                .map(|d| PricePoint::new(d, 1.0))
                .collect());
        }

        let series: RateSeries = self
            .get_json(
                &format!("{from}..{to}?base={base}&symbols={quote}"),
                &format!("{base}/{quote}"),
            )
            .await?;

        // BTreeMap keys keep the points in date order
        Ok(series
            .rates
            .into_iter()
            .filter_map(|(date, rates)| rates.get(&quote).map(|r| PricePoint::new(date, *r)))
            .collect())
    }
}
