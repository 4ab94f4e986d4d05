use chrono::{NaiveDate, Utc};
use log::{debug, warn};
use std::collections::{BTreeSet, HashSet};
use std::future::Future;

use crate::errors::CoreError;
use crate::models::cache::{CachedValue, DataKind, MarketDataCache};
use crate::models::chart::HistoryPeriod;
use crate::models::holding::{normalize_symbol, Holding};
use crate::models::market::{HistorySnapshot, MarketSnapshot, Quote, RateTable, SymbolProfile};
use crate::models::series::TimeSeries;
use crate::models::settings::EngineConfig;
use crate::providers::registry::ProviderRegistry;
use crate::providers::traits::{MarketDataProvider, ScoreProvider};

/// Batch-fetch stage between the providers and the pure engine.
///
/// Cache strategy: every lookup checks the caller's `MarketDataCache`
/// first and only goes to a provider when the entry is absent or older
/// than the TTL of its `DataKind`. Providers are tried in registration
/// order; the first success wins.
///
/// `fetch_snapshot` / `fetch_histories` never fail as a whole. A datum
/// that cannot be fetched is logged and left out, and the engine treats
/// it as unknown. Missing live FX rates fall back to the configured
/// static rates.
pub struct MarketDataService {
    registry: ProviderRegistry,
    score_provider: Option<Box<dyn ScoreProvider>>,
    config: EngineConfig,
}

impl MarketDataService {
    pub fn new(registry: ProviderRegistry, config: EngineConfig) -> Self {
        Self {
            registry,
            score_provider: None,
            config,
        }
    }

    #[must_use]
    pub fn with_score_provider(mut self, provider: Box<dyn ScoreProvider>) -> Self {
        self.score_provider = Some(provider);
        self
    }

    /// Check if at least one provider serves the given kind.
    pub fn has_provider_for(&self, kind: DataKind) -> bool {
        if kind == DataKind::Score {
            return self.score_provider.is_some();
        }
        self.registry.get_provider_for(kind).is_some()
    }

    /// Names of the providers serving a kind, in priority order.
    pub fn get_provider_names(&self, kind: DataKind) -> Vec<String> {
        if kind == DataKind::Score {
            return self
                .score_provider
                .iter()
                .map(|p| p.name().to_string())
                .collect();
        }
        self.registry
            .get_providers_for(kind)
            .iter()
            .map(|p| p.name().to_string())
            .collect()
    }

    // ── Single lookups ──────────────────────────────────────────────

    /// Latest local-currency price of `symbol`.
    pub async fn get_current_price(
        &self,
        cache: &mut MarketDataCache,
        symbol: &str,
    ) -> Result<f64, CoreError> {
        Ok(self.get_quote(cache, symbol).await?.price)
    }

    /// Latest close of `symbol` and, when the provider has it, the close
    /// before. An unusable previous close is dropped, not treated as a
    /// failure.
    pub async fn get_quote(
        &self,
        cache: &mut MarketDataCache,
        symbol: &str,
    ) -> Result<Quote, CoreError> {
        let now = Utc::now();
        if let Some(CachedValue::Quote(quote)) = cache.get(DataKind::Quote, symbol, now) {
            return Ok(*quote);
        }

        let quote = self
            .with_fallback(DataKind::Quote, symbol, |p| async move {
                let mut quote = p.get_quote(symbol).await?;
                // Providers occasionally return NaN or negative closes
                if !quote.price.is_finite() || quote.price < 0.0 {
                    return Err(CoreError::Api {
                        provider: p.name().to_string(),
                        message: format!(
                            "Invalid price returned for {symbol}: {} (must be finite and non-negative)",
                            quote.price
                        ),
                    });
                }
                quote.previous_close = quote
                    .previous_close
                    .filter(|prev| prev.is_finite() && *prev > 0.0);
                Ok(quote)
            })
            .await?;

        cache.insert(DataKind::Quote, symbol, CachedValue::Quote(quote), now);
        Ok(quote)
    }

    /// Units of reporting currency per unit of `currency`.
    pub async fn get_fx_rate(
        &self,
        cache: &mut MarketDataCache,
        currency: &str,
    ) -> Result<f64, CoreError> {
        let reporting = self.config.reporting_currency.as_str();
        if currency.eq_ignore_ascii_case(reporting) {
            return Ok(1.0);
        }

        let key = format!("{currency}/{reporting}");
        let now = Utc::now();
        if let Some(CachedValue::Number(rate)) = cache.get(DataKind::FxRate, &key, now) {
            return Ok(*rate);
        }

        let rate = self
            .with_fallback(DataKind::FxRate, &key, |p| async move {
                let rate = p.get_fx_rate(currency, reporting).await?;
                if !rate.is_finite() || rate <= 0.0 {
                    return Err(CoreError::Api {
                        provider: p.name().to_string(),
                        message: format!("Invalid FX rate returned for {currency}/{reporting}: {rate}"),
                    });
                }
                Ok(rate)
            })
            .await?;

        cache.insert(DataKind::FxRate, &key, CachedValue::Number(rate), now);
        Ok(rate)
    }

    pub async fn get_profile(
        &self,
        cache: &mut MarketDataCache,
        symbol: &str,
    ) -> Result<SymbolProfile, CoreError> {
        let now = Utc::now();
        if let Some(CachedValue::Profile(profile)) = cache.get(DataKind::Profile, symbol, now) {
            return Ok(profile.clone());
        }

        let profile = self
            .with_fallback(DataKind::Profile, symbol, |p| p.get_profile(symbol))
            .await?;

        cache.insert(DataKind::Profile, symbol, CachedValue::Profile(profile.clone()), now);
        Ok(profile)
    }

    /// Daily closes of `symbol` between two dates (inclusive).
    pub async fn get_price_history(
        &self,
        cache: &mut MarketDataCache,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<TimeSeries, CoreError> {
        let key = format!("{symbol}|{from}|{to}");
        let now = Utc::now();
        if let Some(CachedValue::Series(series)) = cache.get(DataKind::History, &key, now) {
            return Ok(series.clone());
        }

        let points = self
            .with_fallback(DataKind::History, symbol, |p| {
                p.get_price_history(symbol, from, to)
            })
            .await?;
        let series = TimeSeries::new(points);

        cache.insert(DataKind::History, &key, CachedValue::Series(series.clone()), now);
        Ok(series)
    }

    /// Daily reporting-currency-per-unit rates of `currency`.
    pub async fn get_fx_history(
        &self,
        cache: &mut MarketDataCache,
        currency: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<TimeSeries, CoreError> {
        let reporting = self.config.reporting_currency.as_str();
        let key = format!("{currency}/{reporting}|{from}|{to}");
        let now = Utc::now();
        if let Some(CachedValue::Series(series)) = cache.get(DataKind::FxHistory, &key, now) {
            return Ok(series.clone());
        }

        let points = self
            .with_fallback(DataKind::FxHistory, &key, |p| {
                p.get_fx_history(currency, reporting, from, to)
            })
            .await?;
        let series = TimeSeries::new(points);

        cache.insert(DataKind::FxHistory, &key, CachedValue::Series(series.clone()), now);
        Ok(series)
    }

    /// Quality score of `symbol`; `Ok(None)` when it has none.
    pub async fn get_score(
        &self,
        cache: &mut MarketDataCache,
        symbol: &str,
    ) -> Result<Option<f64>, CoreError> {
        let provider = self
            .score_provider
            .as_ref()
            .ok_or(CoreError::NoProvider(DataKind::Score))?;

        let now = Utc::now();
        match cache.get(DataKind::Score, symbol, now) {
            Some(CachedValue::Number(score)) => return Ok(Some(*score)),
            Some(CachedValue::Missing) => return Ok(None),
            _ => {}
        }

        let score = provider
            .get_score(symbol)
            .await?
            .filter(|s| s.is_finite());

        let cached = score.map_or(CachedValue::Missing, CachedValue::Number);
        cache.insert(DataKind::Score, symbol, cached, now);
        Ok(score)
    }

    // ── Batch fetches ───────────────────────────────────────────────

    /// Gather prices, FX rates, sectors, names and scores in one pass.
    ///
    /// Prices are fetched for held symbols; profiles and scores for the
    /// held symbols plus every candidate.
    pub async fn fetch_snapshot(
        &self,
        cache: &mut MarketDataCache,
        holdings: &[Holding],
        candidates: &[String],
    ) -> MarketSnapshot {
        let rates = self.fetch_rates(cache, holdings).await;
        let mut snapshot = MarketSnapshot::new(rates);

        let held = unique_symbols(holdings.iter().map(|h| h.symbol.as_str()));
        for symbol in &held {
            match self.get_quote(cache, symbol).await {
                Ok(quote) => {
                    snapshot.prices.insert(symbol.clone(), quote.price);
                    if let Some(previous) = quote.previous_close {
                        snapshot.previous_closes.insert(symbol.clone(), previous);
                    }
                }
                Err(e) => warn!("No price for {symbol}: {e}"),
            }
        }

        let all = unique_symbols(
            held.iter()
                .map(String::as_str)
                .chain(candidates.iter().map(String::as_str)),
        );

        if self.has_provider_for(DataKind::Profile) {
            for symbol in &all {
                match self.get_profile(cache, symbol).await {
                    Ok(profile) => {
                        if let Some(sector) = profile.sector {
                            snapshot.sectors.insert(symbol.clone(), sector);
                        }
                        if let Some(name) = profile.long_name {
                            snapshot.company_names.insert(symbol.clone(), name);
                        }
                    }
                    Err(e) => debug!("No profile for {symbol}: {e}"),
                }
            }
        }

        if self.score_provider.is_some() {
            for symbol in &all {
                match self.get_score(cache, symbol).await {
                    Ok(Some(score)) => {
                        snapshot.scores.insert(symbol.clone(), score);
                    }
                    Ok(None) => debug!("{symbol} has no score"),
                    Err(e) => warn!("Score lookup failed for {symbol}: {e}"),
                }
            }
        }

        debug!(
            "Snapshot ready: {} prices, {} rates, {} sectors, {} scores",
            snapshot.prices.len(),
            snapshot.rates.len(),
            snapshot.sectors.len(),
            snapshot.scores.len()
        );
        snapshot
    }

    /// Price histories for held symbols plus `extra_symbols`, FX histories
    /// for every currency involved and the configured benchmark index.
    pub async fn fetch_histories(
        &self,
        cache: &mut MarketDataCache,
        holdings: &[Holding],
        extra_symbols: &[String],
        period: HistoryPeriod,
        today: NaiveDate,
    ) -> HistorySnapshot {
        let from = period.start_date(today);
        let mut snapshot = HistorySnapshot::default();

        let symbols = unique_symbols(
            holdings
                .iter()
                .map(|h| h.symbol.as_str())
                .chain(extra_symbols.iter().map(String::as_str)),
        );
        for symbol in &symbols {
            match self.get_price_history(cache, symbol, from, today).await {
                Ok(series) if !series.is_empty() => {
                    snapshot.prices.insert(symbol.clone(), series);
                }
                Ok(_) => debug!("Empty history for {symbol}"),
                Err(e) => warn!("No history for {symbol}: {e}"),
            }
        }

        let held: HashSet<String> = holdings.iter().map(Holding::symbol_key).collect();
        let currencies: BTreeSet<String> = holdings
            .iter()
            .map(|h| h.currency.trim().to_uppercase())
            .chain(
                extra_symbols
                    .iter()
                    .filter(|s| !held.contains(&normalize_symbol(s)))
                    .map(|s| self.config.listing_currency(s).to_string()),
            )
            .filter(|c| !c.eq_ignore_ascii_case(&self.config.reporting_currency))
            .collect();
        for currency in &currencies {
            match self.get_fx_history(cache, currency, from, today).await {
                Ok(series) if !series.is_empty() => {
                    snapshot.fx.insert(currency.clone(), series);
                }
                Ok(_) => debug!("Empty FX history for {currency}"),
                Err(e) => warn!("No FX history for {currency}: {e}"),
            }
        }

        let benchmark = self.config.benchmark_symbol.trim();
        if !benchmark.is_empty() {
            match self.get_price_history(cache, benchmark, from, today).await {
                Ok(series) if !series.is_empty() => snapshot.benchmark = Some(series),
                Ok(_) => debug!("Empty benchmark history for {benchmark}"),
                Err(e) => warn!("No benchmark history for {benchmark}: {e}"),
            }
        }

        snapshot
    }

    // ── Internal ────────────────────────────────────────────────────

    /// Live rate for every non-reporting currency held, else the static
    /// fallback rate. Currencies with neither are left out of the table.
    async fn fetch_rates(&self, cache: &mut MarketDataCache, holdings: &[Holding]) -> RateTable {
        let mut rates = RateTable::new(self.config.reporting_currency.clone());
        let currencies: BTreeSet<String> = holdings
            .iter()
            .map(|h| h.currency.trim().to_uppercase())
            .filter(|c| !c.eq_ignore_ascii_case(&self.config.reporting_currency))
            .collect();

        for currency in &currencies {
            let currency = currency.as_str();
            let rate = match self.get_fx_rate(cache, currency).await {
                Ok(rate) => Some(rate),
                Err(e) => match self.config.fallback_rates.get(currency) {
                    Some(fallback) => {
                        warn!("FX lookup for {currency} failed ({e}); using fallback rate {fallback}");
                        Some(*fallback)
                    }
                    None => {
                        warn!("FX lookup for {currency} failed ({e}) and no fallback rate is configured");
                        None
                    }
                },
            };
            if let Some(rate) = rate {
                if let Err(e) = rates.set_rate(currency, rate) {
                    warn!("Discarding FX rate for {currency}: {e}");
                }
            }
        }
        rates
    }

    /// Try each provider serving `kind` in order until one succeeds.
    async fn with_fallback<'a, T, F, Fut>(
        &'a self,
        kind: DataKind,
        label: &str,
        mut call: F,
    ) -> Result<T, CoreError>
    where
        F: FnMut(&'a dyn MarketDataProvider) -> Fut,
        Fut: Future<Output = Result<T, CoreError>>,
    {
        let providers = self.registry.get_providers_for(kind);
        if providers.is_empty() {
            return Err(CoreError::NoProvider(kind));
        }

        let mut last_error = None;
        for provider in providers {
            match call(provider).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    debug!("{} failed for {kind} {label}: {e}", provider.name());
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or(CoreError::NoProvider(kind)))
    }
}

/// Uppercased symbols, first occurrence wins.
fn unique_symbols<'a>(symbols: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    symbols
        .map(normalize_symbol)
        .filter(|s| !s.is_empty() && seen.insert(s.clone()))
        .collect()
}
