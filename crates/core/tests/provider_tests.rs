// ═══════════════════════════════════════════════════════════════════
// Provider Tests: Registry, provider adapters, MarketDataService
// ═══════════════════════════════════════════════════════════════════

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use portfolio_engine_core::errors::CoreError;
use portfolio_engine_core::models::cache::{DataKind, MarketDataCache};
use portfolio_engine_core::models::chart::HistoryPeriod;
use portfolio_engine_core::models::holding::Holding;
use portfolio_engine_core::models::market::{Quote, ScoreMap, SymbolProfile};
use portfolio_engine_core::models::series::PricePoint;
use portfolio_engine_core::models::settings::EngineConfig;
use portfolio_engine_core::providers::frankfurter::FrankfurterProvider;
use portfolio_engine_core::providers::registry::ProviderRegistry;
use portfolio_engine_core::providers::scores::StaticScoreProvider;
use portfolio_engine_core::providers::traits::{MarketDataProvider, ScoreProvider};
use portfolio_engine_core::providers::yahoo_finance::YahooFinanceProvider;
use portfolio_engine_core::services::market_data_service::MarketDataService;

// ═══════════════════════════════════════════════════════════════════
// Test Helpers: Mock Providers
// ═══════════════════════════════════════════════════════════════════

fn make_date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// In-memory provider serving whatever it was loaded with. Counts calls.
#[derive(Default)]
struct MockMarket {
    name: String,
    capabilities: Vec<DataKind>,
    quotes: HashMap<String, f64>,
    previous_closes: HashMap<String, f64>,
    fx: HashMap<String, f64>,
    profiles: HashMap<String, SymbolProfile>,
    histories: HashMap<String, Vec<PricePoint>>,
    fx_histories: HashMap<String, Vec<PricePoint>>,
    calls: Arc<AtomicUsize>,
}

impl MockMarket {
    fn new(name: &str, capabilities: Vec<DataKind>) -> Self {
        Self {
            name: name.to_string(),
            capabilities,
            ..Self::default()
        }
    }

    fn with_quote(mut self, symbol: &str, price: f64) -> Self {
        self.quotes.insert(symbol.to_string(), price);
        self
    }

    fn with_previous_close(mut self, symbol: &str, price: f64) -> Self {
        self.previous_closes.insert(symbol.to_string(), price);
        self
    }

    fn with_fx(mut self, currency: &str, rate: f64) -> Self {
        self.fx.insert(currency.to_string(), rate);
        self
    }

    fn with_profile(mut self, symbol: &str, sector: Option<&str>, long_name: Option<&str>) -> Self {
        self.profiles.insert(
            symbol.to_string(),
            SymbolProfile {
                sector: sector.map(String::from),
                long_name: long_name.map(String::from),
            },
        );
        self
    }

    fn with_history(mut self, symbol: &str, points: &[(NaiveDate, f64)]) -> Self {
        self.histories.insert(
            symbol.to_string(),
            points.iter().map(|(d, p)| PricePoint::new(*d, *p)).collect(),
        );
        self
    }

    fn with_fx_history(mut self, currency: &str, points: &[(NaiveDate, f64)]) -> Self {
        self.fx_histories.insert(
            currency.to_string(),
            points.iter().map(|(d, p)| PricePoint::new(*d, *p)).collect(),
        );
        self
    }

    fn counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }

    fn not_found(symbol: &str, what: &str) -> CoreError {
        CoreError::DataNotAvailable {
            symbol: symbol.to_string(),
            what: what.to_string(),
        }
    }
}

fn in_range(points: &[PricePoint], from: NaiveDate, to: NaiveDate) -> Vec<PricePoint> {
    points
        .iter()
        .filter(|p| p.date >= from && p.date <= to)
        .copied()
        .collect()
}

#[async_trait]
impl MarketDataProvider for MockMarket {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> Vec<DataKind> {
        self.capabilities.clone()
    }

    async fn get_current_price(&self, symbol: &str) -> Result<f64, CoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.quotes
            .get(symbol)
            .copied()
            .ok_or_else(|| Self::not_found(symbol, "Quote"))
    }

    async fn get_quote(&self, symbol: &str) -> Result<Quote, CoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let price = self
            .quotes
            .get(symbol)
            .copied()
            .ok_or_else(|| Self::not_found(symbol, "Quote"))?;
        Ok(match self.previous_closes.get(symbol) {
            Some(previous) => Quote::new(price).with_previous_close(*previous),
            None => Quote::new(price),
        })
    }

    async fn get_fx_rate(&self, from: &str, _to: &str) -> Result<f64, CoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.fx
            .get(from)
            .copied()
            .ok_or_else(|| Self::not_found(from, "FX rate"))
    }

    async fn get_price_history(
        &self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<PricePoint>, CoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.histories
            .get(symbol)
            .map(|points| in_range(points, from, to))
            .ok_or_else(|| Self::not_found(symbol, "History"))
    }

    async fn get_fx_history(
        &self,
        from_currency: &str,
        _to_currency: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<PricePoint>, CoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.fx_histories
            .get(from_currency)
            .map(|points| in_range(points, from, to))
            .ok_or_else(|| Self::not_found(from_currency, "FX history"))
    }

    async fn get_profile(&self, symbol: &str) -> Result<SymbolProfile, CoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.profiles
            .get(symbol)
            .cloned()
            .ok_or_else(|| Self::not_found(symbol, "Profile"))
    }
}

/// A mock that always fails (for testing fallback behavior).
struct FailingProvider {
    name: String,
    capabilities: Vec<DataKind>,
}

impl FailingProvider {
    fn new(name: &str, capabilities: Vec<DataKind>) -> Self {
        Self {
            name: name.to_string(),
            capabilities,
        }
    }

    fn fail(&self, what: &str) -> CoreError {
        CoreError::Api {
            provider: self.name.clone(),
            message: format!("Simulated failure for {what}"),
        }
    }
}

#[async_trait]
impl MarketDataProvider for FailingProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> Vec<DataKind> {
        self.capabilities.clone()
    }

    async fn get_current_price(&self, symbol: &str) -> Result<f64, CoreError> {
        Err(self.fail(symbol))
    }

    async fn get_fx_rate(&self, from: &str, to: &str) -> Result<f64, CoreError> {
        Err(self.fail(&format!("{from}/{to}")))
    }
}

/// Scores that never load.
struct BrokenScores;

#[async_trait]
impl ScoreProvider for BrokenScores {
    fn name(&self) -> &str {
        "Broken"
    }

    async fn get_score(&self, symbol: &str) -> Result<Option<f64>, CoreError> {
        Err(CoreError::Network(format!("timeout fetching {symbol}")))
    }
}

fn service_with(providers: Vec<Box<dyn MarketDataProvider>>) -> MarketDataService {
    let mut registry = ProviderRegistry::new();
    for provider in providers {
        registry.register(provider);
    }
    MarketDataService::new(registry, EngineConfig::default())
}

// ═══════════════════════════════════════════════════════════════════
// ProviderRegistry
// ═══════════════════════════════════════════════════════════════════

mod registry {
    use super::*;

    #[test]
    fn empty_registry() {
        let registry = ProviderRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.get_provider_for(DataKind::Quote).is_none());
        assert!(registry.get_providers_for(DataKind::Quote).is_empty());
    }

    #[test]
    fn registration_order_is_priority() {
        let mut registry = ProviderRegistry::new();
        registry.register(Box::new(MockMarket::new("First", vec![DataKind::Quote])));
        registry.register(Box::new(MockMarket::new(
            "Second",
            vec![DataKind::Quote, DataKind::FxRate],
        )));

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get_provider_for(DataKind::Quote).unwrap().name(), "First");
        assert_eq!(registry.get_provider_for(DataKind::FxRate).unwrap().name(), "Second");

        let names: Vec<&str> = registry
            .get_providers_for(DataKind::Quote)
            .iter()
            .map(|p| p.name())
            .collect();
        assert_eq!(names, vec!["First", "Second"]);
        assert!(registry.get_provider_for(DataKind::Profile).is_none());
    }

    #[test]
    fn defaults_cover_fx() {
        let registry = ProviderRegistry::new_with_defaults();
        let names: Vec<&str> = registry
            .get_providers_for(DataKind::FxHistory)
            .iter()
            .map(|p| p.name())
            .collect();
        assert!(names.contains(&"Frankfurter"));
        // Frankfurter is the FX fallback, never the first choice
        assert_eq!(names.last(), Some(&"Frankfurter"));
    }
}

// ═══════════════════════════════════════════════════════════════════
// Provider adapters
// ═══════════════════════════════════════════════════════════════════

mod adapters {
    use super::*;

    #[tokio::test]
    async fn unimplemented_methods_are_unsupported() {
        let mock = MockMarket::new("QuotesOnly", vec![DataKind::Quote]);
        let failing = FailingProvider::new("Failing", vec![DataKind::Quote]);

        match failing.get_profile("AAPL").await {
            Err(CoreError::Unsupported { provider, capability }) => {
                assert_eq!(provider, "Failing");
                assert_eq!(capability, DataKind::Profile);
            }
            other => panic!("expected Unsupported, got {other:?}"),
        }
        // The mock implements everything, only its capabilities gate routing
        assert!(mock.get_profile("AAPL").await.is_err());
    }

    #[tokio::test]
    async fn frankfurter_same_currency_needs_no_request() {
        let provider = FrankfurterProvider::new();
        assert_eq!(provider.get_fx_rate("sgd", "SGD").await.unwrap(), 1.0);

        let points = provider
            .get_fx_history("SGD", "SGD", make_date(2025, 1, 1), make_date(2025, 1, 3))
            .await
            .unwrap();
        assert_eq!(points.len(), 3);
        assert!(points.iter().all(|p| p.price == 1.0));
        assert_eq!(points[2].date, make_date(2025, 1, 3));
    }

    #[test]
    fn frankfurter_capabilities() {
        let provider = FrankfurterProvider::default();
        assert_eq!(provider.name(), "Frankfurter");
        assert_eq!(
            provider.capabilities(),
            vec![DataKind::FxRate, DataKind::FxHistory]
        );
    }

    #[test]
    fn frankfurter_base_url_drops_trailing_slash() {
        let provider = FrankfurterProvider::with_base_url("http://localhost:8080/v1/");
        assert_eq!(provider.base_url(), "http://localhost:8080/v1");
        assert_eq!(FrankfurterProvider::new().base_url(), "https://api.frankfurter.dev/v1");
    }

    #[tokio::test]
    async fn default_quote_has_no_previous_close() {
        let failing = FailingProvider::new("Failing", vec![DataKind::Quote]);
        assert!(failing.get_quote("AAPL").await.is_err());

        struct CloseOnly;

        #[async_trait]
        impl MarketDataProvider for CloseOnly {
            fn name(&self) -> &str {
                "CloseOnly"
            }
            fn capabilities(&self) -> Vec<DataKind> {
                vec![DataKind::Quote]
            }
            async fn get_current_price(&self, _symbol: &str) -> Result<f64, CoreError> {
                Ok(12.5)
            }
        }

        let quote = CloseOnly.get_quote("X").await.unwrap();
        assert_eq!(quote, Quote::new(12.5));
        assert_eq!(quote.day_change_pct(), None);
    }

    #[test]
    fn yahoo_fx_ticker() {
        assert_eq!(YahooFinanceProvider::fx_ticker("hkd", "sgd"), "HKDSGD=X");
        assert_eq!(YahooFinanceProvider::fx_ticker("USD", "SGD"), "USDSGD=X");
    }

    #[tokio::test]
    async fn static_scores_lookup_is_case_insensitive() {
        let scores: ScoreMap = [("d05.si".to_string(), 82.5)].into_iter().collect();
        let provider = StaticScoreProvider::new(scores);
        assert_eq!(provider.get_score("D05.SI").await.unwrap(), Some(82.5));
        assert_eq!(provider.get_score("AAPL").await.unwrap(), None);
    }
}

// ═══════════════════════════════════════════════════════════════════
// Yahoo quoteSummary parsing
// ═══════════════════════════════════════════════════════════════════

mod quote_summary {
    use super::*;

    const DBS_BODY: &str = r#"{
        "quoteSummary": {
            "result": [{
                "price": {
                    "maxAge": 1,
                    "regularMarketPrice": {"raw": 37.2, "fmt": "37.20"},
                    "currency": "SGD",
                    "quoteType": "EQUITY",
                    "symbol": "D05.SI",
                    "shortName": "DBS",
                    "longName": "DBS Group Holdings Ltd"
                },
                "summaryProfile": {
                    "address1": "12 Marina Boulevard",
                    "city": "Singapore",
                    "country": "Singapore",
                    "industry": "Banks - Regional",
                    "sector": "Financial Services",
                    "fullTimeEmployees": 41000,
                    "maxAge": 86400
                }
            }],
            "error": null
        }
    }"#;

    #[test]
    fn reads_sector_and_long_name() {
        let profile = YahooFinanceProvider::parse_quote_summary("D05.SI", DBS_BODY).unwrap();
        assert_eq!(profile.sector.as_deref(), Some("Financial Services"));
        assert_eq!(profile.long_name.as_deref(), Some("DBS Group Holdings Ltd"));
    }

    #[test]
    fn short_name_stands_in_and_blank_sector_is_absent() {
        let body = r#"{"quoteSummary": {"result": [{
            "price": {"shortName": "Tencent", "longName": "  "},
            "summaryProfile": {"sector": ""}
        }], "error": null}}"#;
        let profile = YahooFinanceProvider::parse_quote_summary("0700.HK", body).unwrap();
        assert_eq!(profile.sector, None);
        assert_eq!(profile.long_name.as_deref(), Some("Tencent"));
    }

    #[test]
    fn index_without_profile_module() {
        let body = r#"{"quoteSummary": {"result": [{
            "price": {"longName": "S&P 500"}
        }], "error": null}}"#;
        let profile = YahooFinanceProvider::parse_quote_summary("^GSPC", body).unwrap();
        assert_eq!(
            profile,
            SymbolProfile {
                sector: None,
                long_name: Some("S&P 500".into()),
            }
        );
    }

    #[test]
    fn error_body_is_api_error() {
        let body = r#"{"quoteSummary": {"result": null, "error": {
            "code": "Not Found",
            "description": "Quote not found for symbol: ZZZZ"
        }}}"#;
        match YahooFinanceProvider::parse_quote_summary("ZZZZ", body) {
            Err(CoreError::Api { provider, message }) => {
                assert_eq!(provider, "Yahoo Finance");
                assert!(message.contains("Not Found"));
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[test]
    fn empty_result_is_not_available() {
        let body = r#"{"quoteSummary": {"result": [], "error": null}}"#;
        assert!(matches!(
            YahooFinanceProvider::parse_quote_summary("ZZZZ", body),
            Err(CoreError::DataNotAvailable { .. })
        ));
    }

    #[test]
    fn malformed_body_is_deserialization_error() {
        assert!(matches!(
            YahooFinanceProvider::parse_quote_summary("D05.SI", "<html>Too Many Requests</html>"),
            Err(CoreError::Deserialization(_))
        ));
    }
}

// ═══════════════════════════════════════════════════════════════════
// MarketDataService: single lookups
// ═══════════════════════════════════════════════════════════════════

mod lookups {
    use super::*;

    #[tokio::test]
    async fn falls_back_to_next_provider() {
        let svc = service_with(vec![
            Box::new(FailingProvider::new("Down", vec![DataKind::Quote])),
            Box::new(MockMarket::new("Up", vec![DataKind::Quote]).with_quote("AAPL", 185.0)),
        ]);
        let mut cache = MarketDataCache::default();
        assert_eq!(svc.get_current_price(&mut cache, "AAPL").await.unwrap(), 185.0);
    }

    #[tokio::test]
    async fn reports_last_error_when_all_fail() {
        let svc = service_with(vec![
            Box::new(FailingProvider::new("A", vec![DataKind::Quote])),
            Box::new(FailingProvider::new("B", vec![DataKind::Quote])),
        ]);
        let mut cache = MarketDataCache::default();
        match svc.get_current_price(&mut cache, "AAPL").await {
            Err(CoreError::Api { provider, .. }) => assert_eq!(provider, "B"),
            other => panic!("expected Api error, got {other:?}"),
        }
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn no_provider_for_kind() {
        let svc = service_with(vec![Box::new(MockMarket::new("Fx", vec![DataKind::FxRate]))]);
        let mut cache = MarketDataCache::default();
        assert!(matches!(
            svc.get_current_price(&mut cache, "AAPL").await,
            Err(CoreError::NoProvider(DataKind::Quote))
        ));
    }

    #[tokio::test]
    async fn invalid_prices_are_rejected() {
        let svc = service_with(vec![
            Box::new(MockMarket::new("Bad", vec![DataKind::Quote]).with_quote("AAPL", f64::NAN)),
            Box::new(MockMarket::new("Negative", vec![DataKind::Quote]).with_quote("AAPL", -1.0)),
            Box::new(MockMarket::new("Good", vec![DataKind::Quote]).with_quote("AAPL", 190.0)),
        ]);
        let mut cache = MarketDataCache::default();
        assert_eq!(svc.get_current_price(&mut cache, "AAPL").await.unwrap(), 190.0);
    }

    #[tokio::test]
    async fn repeated_lookup_served_from_cache() {
        let mock = MockMarket::new("Mock", vec![DataKind::Quote]).with_quote("AAPL", 185.0);
        let calls = mock.counter();
        let svc = service_with(vec![Box::new(mock)]);
        let mut cache = MarketDataCache::default();

        svc.get_current_price(&mut cache, "AAPL").await.unwrap();
        svc.get_current_price(&mut cache, "aapl").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.count_of(DataKind::Quote), 1);

        cache.clear();
        svc.get_current_price(&mut cache, "AAPL").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn quote_carries_previous_close() {
        let mock = MockMarket::new("Mock", vec![DataKind::Quote])
            .with_quote("AAPL", 210.0)
            .with_previous_close("AAPL", 200.0);
        let calls = mock.counter();
        let svc = service_with(vec![Box::new(mock)]);
        let mut cache = MarketDataCache::default();

        let quote = svc.get_quote(&mut cache, "AAPL").await.unwrap();
        assert_eq!(quote.previous_close, Some(200.0));
        assert_eq!(quote.day_change(), Some(10.0));
        assert!((quote.day_change_pct().unwrap() - 5.0).abs() < 1e-9);

        // Price and quote lookups share one cache entry
        assert_eq!(svc.get_current_price(&mut cache, "AAPL").await.unwrap(), 210.0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unusable_previous_close_is_dropped() {
        let svc = service_with(vec![Box::new(
            MockMarket::new("Mock", vec![DataKind::Quote])
                .with_quote("AAPL", 210.0)
                .with_previous_close("AAPL", 0.0),
        )]);
        let mut cache = MarketDataCache::default();

        let quote = svc.get_quote(&mut cache, "AAPL").await.unwrap();
        assert_eq!(quote.price, 210.0);
        assert_eq!(quote.previous_close, None);
    }

    #[tokio::test]
    async fn fx_rate_for_reporting_currency_is_one() {
        let mock = MockMarket::new("Mock", vec![DataKind::FxRate]);
        let calls = mock.counter();
        let svc = service_with(vec![Box::new(mock)]);
        let mut cache = MarketDataCache::default();

        assert_eq!(svc.get_fx_rate(&mut cache, "SGD").await.unwrap(), 1.0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn fx_rate_must_be_positive() {
        let svc = service_with(vec![Box::new(
            MockMarket::new("Mock", vec![DataKind::FxRate]).with_fx("USD", 0.0),
        )]);
        let mut cache = MarketDataCache::default();
        assert!(matches!(
            svc.get_fx_rate(&mut cache, "USD").await,
            Err(CoreError::Api { .. })
        ));
    }

    #[tokio::test]
    async fn unscored_symbol_is_cached_as_missing() {
        let svc = service_with(vec![]).with_score_provider(Box::new(StaticScoreProvider::new(
            [("AAPL".to_string(), 70.0)].into_iter().collect(),
        )));
        let mut cache = MarketDataCache::default();

        assert_eq!(svc.get_score(&mut cache, "AAPL").await.unwrap(), Some(70.0));
        assert_eq!(svc.get_score(&mut cache, "NOPE").await.unwrap(), None);
        assert_eq!(cache.count_of(DataKind::Score), 2);
        assert_eq!(svc.get_score(&mut cache, "NOPE").await.unwrap(), None);
    }

    #[tokio::test]
    async fn score_without_provider() {
        let svc = service_with(vec![]);
        let mut cache = MarketDataCache::default();
        assert!(!svc.has_provider_for(DataKind::Score));
        assert!(matches!(
            svc.get_score(&mut cache, "AAPL").await,
            Err(CoreError::NoProvider(DataKind::Score))
        ));
    }

    #[test]
    fn provider_names_by_kind() {
        let svc = service_with(vec![
            Box::new(MockMarket::new("A", vec![DataKind::Quote])),
            Box::new(MockMarket::new("B", vec![DataKind::Quote, DataKind::History])),
        ])
        .with_score_provider(Box::new(StaticScoreProvider::new(ScoreMap::new())));

        assert_eq!(svc.get_provider_names(DataKind::Quote), vec!["A", "B"]);
        assert_eq!(svc.get_provider_names(DataKind::History), vec!["B"]);
        assert_eq!(svc.get_provider_names(DataKind::Score), vec!["Static scores"]);
        assert!(svc.has_provider_for(DataKind::History));
        assert!(!svc.has_provider_for(DataKind::FxRate));
    }
}

// ═══════════════════════════════════════════════════════════════════
// MarketDataService: batch fetch
// ═══════════════════════════════════════════════════════════════════

mod batch_fetch {
    use super::*;

    fn holdings() -> Vec<Holding> {
        vec![
            Holding::new("D05.SI", "DBS", 100.0, 30.0, "SGD"),
            Holding::new("AAPL", "Apple", 10.0, 150.0, "USD"),
            Holding::new("0700.HK", "Tencent", 100.0, 300.0, "HKD"),
            Holding::new("SAP", "SAP", 5.0, 100.0, "EUR"),
        ]
    }

    fn candidates() -> Vec<String> {
        ["D05.SI", "AAPL", "0700.HK", "SAP", "MSFT"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[tokio::test]
    async fn snapshot_uses_fallback_rates_when_fx_fails() {
        let quotes = MockMarket::new("Quotes", vec![DataKind::Quote, DataKind::Profile])
            .with_quote("D05.SI", 35.0)
            .with_quote("AAPL", 190.0)
            .with_quote("0700.HK", 380.0)
            .with_profile("D05.SI", Some("Financials"), Some("DBS Group Holdings"))
            .with_profile("AAPL", None, Some("Apple Inc."));
        let svc = service_with(vec![
            Box::new(FailingProvider::new("FxDown", vec![DataKind::FxRate])),
            Box::new(quotes),
        ])
        .with_score_provider(Box::new(StaticScoreProvider::new(
            [("D05.SI".to_string(), 80.0), ("MSFT".to_string(), 70.0)]
                .into_iter()
                .collect(),
        )));

        let mut cache = MarketDataCache::default();
        let snapshot = svc.fetch_snapshot(&mut cache, &holdings(), &candidates()).await;

        // SAP has no quote
        assert_eq!(snapshot.prices.len(), 3);
        assert!(!snapshot.prices.contains_key("SAP"));

        assert_eq!(snapshot.rates.reporting_currency(), "SGD");
        assert_eq!(snapshot.rates.rate("USD"), Some(1.35));
        assert_eq!(snapshot.rates.rate("HKD"), Some(0.173));
        assert_eq!(snapshot.rates.rate("EUR"), None);

        assert_eq!(snapshot.sectors.len(), 1);
        assert_eq!(snapshot.sectors["D05.SI"], "Financials");
        assert_eq!(snapshot.company_names["AAPL"], "Apple Inc.");

        assert_eq!(snapshot.scores.len(), 2);
        assert_eq!(snapshot.scores["MSFT"], 70.0);
    }

    #[tokio::test]
    async fn snapshot_records_previous_closes() {
        let svc = service_with(vec![Box::new(
            MockMarket::new("Quotes", vec![DataKind::Quote])
                .with_quote("D05.SI", 37.0)
                .with_previous_close("D05.SI", 36.0)
                .with_quote("AAPL", 190.0),
        )]);
        let mut cache = MarketDataCache::default();
        let snapshot = svc.fetch_snapshot(&mut cache, &holdings(), &[]).await;

        assert_eq!(snapshot.prices["D05.SI"], 37.0);
        assert_eq!(snapshot.previous_closes["D05.SI"], 36.0);
        assert!(!snapshot.previous_closes.contains_key("AAPL"));
    }

    #[tokio::test]
    async fn snapshot_prefers_live_rates() {
        let svc = service_with(vec![Box::new(
            MockMarket::new("Live", vec![DataKind::Quote, DataKind::FxRate])
                .with_quote("AAPL", 190.0)
                .with_fx("USD", 1.34),
        )]);
        let mut cache = MarketDataCache::default();
        let snapshot = svc.fetch_snapshot(&mut cache, &holdings(), &[]).await;

        assert_eq!(snapshot.rates.rate("USD"), Some(1.34));
        // No live HKD quote from this provider
        assert_eq!(snapshot.rates.rate("HKD"), Some(0.173));
        assert!(snapshot.scores.is_empty());
    }

    #[tokio::test]
    async fn snapshot_survives_broken_score_provider() {
        let svc = service_with(vec![Box::new(
            MockMarket::new("Quotes", vec![DataKind::Quote]).with_quote("AAPL", 190.0),
        )])
        .with_score_provider(Box::new(BrokenScores));
        let mut cache = MarketDataCache::default();
        let snapshot = svc.fetch_snapshot(&mut cache, &holdings(), &candidates()).await;

        assert_eq!(snapshot.prices["AAPL"], 190.0);
        assert!(snapshot.scores.is_empty());
    }

    #[tokio::test]
    async fn second_snapshot_hits_cache() {
        let mock = MockMarket::new("Quotes", vec![DataKind::Quote, DataKind::FxRate])
            .with_quote("AAPL", 190.0)
            .with_fx("USD", 1.34);
        let calls = mock.counter();
        let svc = service_with(vec![Box::new(mock)]);
        let holdings = vec![Holding::new("AAPL", "Apple", 1.0, 1.0, "USD")];
        let mut cache = MarketDataCache::default();

        svc.fetch_snapshot(&mut cache, &holdings, &[]).await;
        let first = calls.load(Ordering::SeqCst);
        svc.fetch_snapshot(&mut cache, &holdings, &[]).await;
        assert_eq!(calls.load(Ordering::SeqCst), first);
    }

    #[tokio::test]
    async fn histories_cover_holdings_extras_fx_and_benchmark() {
        let day = |d| make_date(2025, 3, d);
        let mock = MockMarket::new(
            "Hist",
            vec![DataKind::History, DataKind::FxHistory],
        )
        .with_history("D05.SI", &[(day(10), 35.0), (day(11), 35.5)])
        .with_history("AAPL", &[(day(10), 190.0), (day(11), 191.0)])
        .with_history("^GSPC", &[(day(10), 5600.0), (day(11), 5650.0)])
        // Outside the one-month window
        .with_history("MSFT", &[(make_date(2024, 12, 1), 400.0)])
        .with_fx_history("USD", &[(day(10), 1.34)]);

        let svc = service_with(vec![Box::new(mock)]);
        let holdings = vec![
            Holding::new("D05.SI", "DBS", 100.0, 30.0, "SGD"),
            Holding::new("AAPL", "Apple", 10.0, 150.0, "USD"),
        ];
        let extras = vec!["0700.HK".to_string(), "MSFT".to_string()];
        let mut cache = MarketDataCache::default();

        let snapshot = svc
            .fetch_histories(&mut cache, &holdings, &extras, HistoryPeriod::OneMonth, day(31))
            .await;

        let mut symbols: Vec<&str> = snapshot.prices.keys().map(String::as_str).collect();
        symbols.sort();
        assert_eq!(symbols, vec!["AAPL", "D05.SI"]);

        assert_eq!(snapshot.fx.len(), 1);
        assert_eq!(snapshot.fx["USD"].values(), vec![1.34]);
        assert_eq!(snapshot.benchmark.as_ref().map(|b| b.len()), Some(2));
        // Failed lookups (0700.HK, HKD) are not cached; empty results are
        assert_eq!(cache.count_of(DataKind::FxHistory), 1);
        assert_eq!(cache.count_of(DataKind::History), 4);
    }
}
