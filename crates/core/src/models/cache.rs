use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::market::{Quote, SymbolProfile};
use super::series::TimeSeries;
use super::settings::CacheTtl;

/// Kind of market datum. Used to route requests to providers and to pick a
/// cache lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataKind {
    /// Latest close in the symbol's trading currency
    Quote,
    /// Latest FX rate between two currencies
    FxRate,
    /// Sector and long name
    Profile,
    /// Daily close history
    History,
    /// Daily FX rate history
    FxHistory,
    /// External quality score
    Score,
}

impl std::fmt::Display for DataKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataKind::Quote => write!(f, "Quote"),
            DataKind::FxRate => write!(f, "FX rate"),
            DataKind::Profile => write!(f, "Profile"),
            DataKind::History => write!(f, "History"),
            DataKind::FxHistory => write!(f, "FX history"),
            DataKind::Score => write!(f, "Score"),
        }
    }
}

/// A cached datum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CachedValue {
    Number(f64),
    Quote(Quote),
    /// A lookup that succeeded but found nothing (e.g. an unscored symbol).
    Missing,
    Profile(SymbolProfile),
    Series(TimeSeries),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CacheEntry {
    value: CachedValue,
    fetched_at: DateTime<Utc>,
}

/// Cache key: (kind, lookup key) e.g., (Quote, "AAPL") or (FxRate, "HKD/SGD")
pub type CacheKey = (DataKind, String);

/// Injectable cache for market data lookups, owned by the caller.
///
/// Each entry expires after the lifetime configured for its `DataKind`.
/// The pure engine never sees this type; only `MarketDataService` reads
/// and fills it during a batch fetch.
#[derive(Debug, Clone, Default)]
pub struct MarketDataCache {
    entries: HashMap<CacheKey, CacheEntry>,
    ttl: CacheTtl,
}

impl MarketDataCache {
    pub fn new(ttl: CacheTtl) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> &CacheTtl {
        &self.ttl
    }

    /// Fresh value for `(kind, key)` as of `now`, or `None` if absent/expired.
    pub fn get(&self, kind: DataKind, key: &str, now: DateTime<Utc>) -> Option<&CachedValue> {
        let entry = self.entries.get(&(kind, key.to_uppercase()))?;
        if now - entry.fetched_at < self.ttl.for_kind(kind) {
            Some(&entry.value)
        } else {
            None
        }
    }

    pub fn insert(&mut self, kind: DataKind, key: &str, value: CachedValue, now: DateTime<Utc>) {
        self.entries.insert(
            (kind, key.to_uppercase()),
            CacheEntry {
                value,
                fetched_at: now,
            },
        );
    }

    /// Drop every expired entry. Returns the number removed.
    pub fn prune_expired(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        let ttl = &self.ttl;
        self.entries
            .retain(|(kind, _), entry| now - entry.fetched_at < ttl.for_kind(*kind));
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries of one kind, fresh or not.
    pub fn count_of(&self, kind: DataKind) -> usize {
        self.entries.keys().filter(|(k, _)| *k == kind).count()
    }
}
