use crate::models::cache::DataKind;

use super::frankfurter::FrankfurterProvider;
#[cfg(not(target_arch = "wasm32"))]
use super::yahoo_finance::YahooFinanceProvider;
use super::traits::MarketDataProvider;

/// Registry of all available market data providers.
///
/// Routes requests by `DataKind`. Registration order is priority order:
/// the service tries the first capable provider and falls back to the next.
pub struct ProviderRegistry {
    providers: Vec<Box<dyn MarketDataProvider>>,
}

impl ProviderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
        }
    }

    /// Create a registry with the default providers pre-configured.
    pub fn new_with_defaults() -> Self {
        let mut registry = Self::new();

        // Yahoo Finance: quotes, history, FX pairs, names. Not available on WASM.
        #[cfg(not(target_arch = "wasm32"))]
        {
            match YahooFinanceProvider::new() {
                Ok(yahoo) => registry.register(Box::new(yahoo)),
                Err(e) => log::warn!("Yahoo Finance provider unavailable: {e}"),
            }
        }

        // Frankfurter: ECB FX rates, fallback for FX
        registry.register(Box::new(FrankfurterProvider::new()));

        registry
    }

    /// Register a new provider at the lowest priority.
    pub fn register(&mut self, provider: Box<dyn MarketDataProvider>) {
        self.providers.push(provider);
    }

    /// Find the first provider that supports the given kind.
    pub fn get_provider_for(&self, kind: DataKind) -> Option<&dyn MarketDataProvider> {
        self.providers
            .iter()
            .find(|p| p.capabilities().contains(&kind))
            .map(|p| p.as_ref())
    }

    /// All providers supporting the given kind, in priority order.
    pub fn get_providers_for(&self, kind: DataKind) -> Vec<&dyn MarketDataProvider> {
        self.providers
            .iter()
            .filter(|p| p.capabilities().contains(&kind))
            .map(|p| p.as_ref())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
