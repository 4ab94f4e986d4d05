use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::errors::CoreError;

/// Canonical form of a ticker symbol: trimmed and uppercased.
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

/// One equity position in the portfolio.
///
/// Symbols and currency codes are uppercased on construction and on
/// deserialization so that map lookups (`PriceSnapshot`, `RateTable`,
/// sector/score maps) are consistent regardless of how the record was
/// entered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "HoldingRecord")]
pub struct Holding {
    /// Ticker symbol (e.g., "D05.SI", "0700.HK", "AAPL")
    pub symbol: String,

    /// Display name of the issuer
    pub company: String,

    /// Number of shares held (always positive)
    pub shares: f64,

    /// Price paid per share, in the holding's trading currency
    pub purchase_price: f64,

    /// Trading currency code (e.g., "SGD", "HKD", "USD")
    pub currency: String,
}

impl Holding {
    pub fn new(
        symbol: impl Into<String>,
        company: impl Into<String>,
        shares: f64,
        purchase_price: f64,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            symbol: normalize_symbol(&symbol.into()),
            company: company.into(),
            shares,
            purchase_price,
            currency: currency.into().trim().to_uppercase(),
        }
    }

    /// Symbol in canonical form, even for a holding built as a literal.
    pub fn symbol_key(&self) -> String {
        normalize_symbol(&self.symbol)
    }

    /// This holding's entry in a symbol-keyed map, trying the symbol as
    /// stored and then its canonical form.
    pub fn find_in<'a, V>(&self, map: &'a HashMap<String, V>) -> Option<&'a V> {
        map.get(&self.symbol)
            .or_else(|| map.get(&self.symbol_key()))
    }

    /// Check that the record is usable by the engine.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.symbol.is_empty() {
            return Err(CoreError::Validation("holding symbol must not be empty".into()));
        }
        if self.currency.is_empty() {
            return Err(CoreError::Validation(format!(
                "holding {} has no currency",
                self.symbol
            )));
        }
        if !self.shares.is_finite() || self.shares <= 0.0 {
            return Err(CoreError::Validation(format!(
                "holding {} must have a positive share count, got {}",
                self.symbol, self.shares
            )));
        }
        if !self.purchase_price.is_finite() || self.purchase_price < 0.0 {
            return Err(CoreError::Validation(format!(
                "holding {} has an invalid purchase price {}",
                self.symbol, self.purchase_price
            )));
        }
        Ok(())
    }
}

/// Wire shape of a holding, normalized into `Holding` on the way in.
#[derive(Deserialize)]
struct HoldingRecord {
    symbol: String,
    company: String,
    shares: f64,
    purchase_price: f64,
    currency: String,
}

impl From<HoldingRecord> for Holding {
    fn from(record: HoldingRecord) -> Self {
        Holding::new(
            record.symbol,
            record.company,
            record.shares,
            record.purchase_price,
            record.currency,
        )
    }
}

/// The persisted record the storage layer hands us: holdings plus a
/// watchlist of symbols the user is considering.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortfolioRecord {
    #[serde(default)]
    pub holdings: Vec<Holding>,

    #[serde(default)]
    pub watchlist: Vec<String>,
}

impl PortfolioRecord {
    pub fn new(holdings: Vec<Holding>, watchlist: Vec<String>) -> Self {
        Self {
            holdings,
            watchlist: watchlist
                .into_iter()
                .map(|s| normalize_symbol(&s))
                .collect(),
        }
    }

    /// Parse a record from JSON, normalizing symbols and validating holdings.
    pub fn from_json_str(json: &str) -> Result<Self, CoreError> {
        let raw: PortfolioRecord = serde_json::from_str(json)?;
        for holding in &raw.holdings {
            holding.validate()?;
        }
        Ok(Self::new(raw.holdings, raw.watchlist))
    }

    /// Candidate pool for target weights: held symbols first, then the
    /// watchlist. Duplicates keep their first position.
    #[must_use]
    pub fn candidates(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.holdings
            .iter()
            .map(|h| h.symbol.clone())
            .chain(self.watchlist.iter().cloned())
            .filter(|s| !s.is_empty() && seen.insert(s.clone()))
            .collect()
    }
}
