use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use log::debug;
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use std::sync::RwLock;
use std::time::Duration;
use time::OffsetDateTime;

use crate::errors::CoreError;
use crate::models::cache::DataKind;
use crate::models::market::{Quote, SymbolProfile};
use crate::models::series::PricePoint;
use super::traits::MarketDataProvider;

const PROVIDER: &str = "Yahoo Finance";
const COOKIE_URL: &str = "https://fc.yahoo.com";
const CRUMB_URL: &str = "https://query1.finance.yahoo.com/v1/test/getcrumb";
const QUOTE_SUMMARY_URL: &str = "https://query1.finance.yahoo.com/v10/finance/quoteSummary";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
    (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

/// Yahoo Finance provider for equity quotes, histories, FX pairs and
/// profiles.
///
/// - **Free**: No API key required.
/// - **Coverage**: Global equities (SGX `.SI`, HKEX `.HK`, US), indices (`^GSPC`).
/// - **FX**: Yahoo quotes currency pairs as tickers, e.g. `HKDSGD=X`.
/// - **Profile**: sector and long name from `quoteSummary`, which needs a
///   session cookie plus crumb. Ticker search fills in a missing long name.
///
/// Prices are returned in the symbol's trading currency.
///
/// **Note**: Not WASM-compatible (uses native reqwest/tokio).
pub struct YahooFinanceProvider {
    connector: yahoo_finance_api::YahooConnector,
    client: Client,
    session: RwLock<Option<Session>>,
}

/// Cookie and the crumb issued for it.
#[derive(Debug, Clone)]
struct Session {
    cookie: String,
    crumb: String,
}

// ── quoteSummary response types ─────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteSummaryResponse {
    quote_summary: QuoteSummaryBody,
}

#[derive(Deserialize)]
struct QuoteSummaryBody {
    #[serde(default)]
    result: Option<Vec<QuoteSummaryResult>>,
    #[serde(default)]
    error: Option<QuoteSummaryError>,
}

#[derive(Deserialize)]
struct QuoteSummaryError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteSummaryResult {
    #[serde(default)]
    price: Option<PriceModule>,
    #[serde(default)]
    summary_profile: Option<SummaryProfileModule>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PriceModule {
    #[serde(default)]
    long_name: Option<String>,
    #[serde(default)]
    short_name: Option<String>,
}

#[derive(Deserialize)]
struct SummaryProfileModule {
    #[serde(default)]
    sector: Option<String>,
}

fn api_error(message: impl Into<String>) -> CoreError {
    CoreError::Api {
        provider: PROVIDER.into(),
        message: message.into(),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl YahooFinanceProvider {
    pub fn new() -> Result<Self, CoreError> {
        let connector = yahoo_finance_api::YahooConnector::new()
            .map_err(|e| api_error(format!("Failed to create connector: {e}")))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| api_error(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            connector,
            client,
            session: RwLock::new(None),
        })
    }

    /// Yahoo ticker for an FX pair, e.g. ("HKD", "SGD") → "HKDSGD=X".
    pub fn fx_ticker(from: &str, to: &str) -> String {
        format!("{}{}=X", from.to_uppercase(), to.to_uppercase())
    }

    /// Read a `quoteSummary` body (modules `price` and `summaryProfile`)
    /// into a profile. Blank strings count as absent; the short name stands
    /// in for a missing long name.
    pub fn parse_quote_summary(symbol: &str, body: &str) -> Result<SymbolProfile, CoreError> {
        let response: QuoteSummaryResponse = serde_json::from_str(body)?;
        let summary = response.quote_summary;

        let Some(result) = summary.result.and_then(|r| r.into_iter().next()) else {
            return Err(match summary.error {
                Some(err) => api_error(format!(
                    "quoteSummary for {symbol} failed: {} {}",
                    err.code.unwrap_or_default(),
                    err.description.unwrap_or_default()
                )),
                None => CoreError::DataNotAvailable {
                    symbol: symbol.to_string(),
                    what: "Profile".into(),
                },
            });
        };

        let (long_name, short_name) = match result.price {
            Some(price) => (non_empty(price.long_name), non_empty(price.short_name)),
            None => (None, None),
        };
        Ok(SymbolProfile {
            sector: non_empty(result.summary_profile.and_then(|p| p.sector)),
            long_name: long_name.or(short_name),
        })
    }

    /// Convert a `chrono::NaiveDate` to `time::OffsetDateTime` (midnight UTC).
    fn to_offset_datetime(date: NaiveDate) -> Result<OffsetDateTime, CoreError> {
        let month = time::Month::try_from(date.month() as u8)
            .map_err(|e| api_error(format!("Invalid month in {date}: {e}")))?;

        let odt = time::Date::from_calendar_date(date.year(), month, date.day() as u8)
            .map_err(|e| api_error(format!("Invalid date {date}: {e}")))?
            .with_hms(0, 0, 0)
            .map_err(|e| api_error(format!("Invalid time for {date}: {e}")))?
            .assume_utc();
        Ok(odt)
    }

    /// Convert a unix timestamp (seconds) to `chrono::NaiveDate`.
    fn timestamp_to_naive_date(ts: i64) -> Option<NaiveDate> {
        chrono::DateTime::from_timestamp(ts, 0).map(|dt| dt.date_naive())
    }

    /// Last daily close and the one before it.
    async fn latest_quote(&self, ticker: &str) -> Result<Quote, CoreError> {
        let resp = self
            .connector
            .get_latest_quotes(ticker, "1d")
            .await
            .map_err(|e| api_error(format!("Failed to fetch latest quote for {ticker}: {e}")))?;

        let closes: Vec<f64> = resp
            .quotes()
            .map_err(|e| api_error(format!("No quote data for {ticker}: {e}")))?
            .iter()
            .map(|q| q.close)
            .filter(|c| c.is_finite())
            .collect();

        match closes.as_slice() {
            [] => Err(api_error(format!("No quote data for {ticker}"))),
            [last] => Ok(Quote::new(*last)),
            [.., previous, last] => Ok(Quote::new(*last).with_previous_close(*previous)),
        }
    }

    async fn daily_closes(
        &self,
        ticker: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<PricePoint>, CoreError> {
        let start = Self::to_offset_datetime(from)?;
        let end = Self::to_offset_datetime(to + chrono::Duration::days(1))?; // inclusive end

        let resp = self
            .connector
            .get_quote_history(ticker, start, end)
            .await
            .map_err(|e| api_error(format!("Failed to fetch history range for {ticker}: {e}")))?;

        let quotes = resp
            .quotes()
            .map_err(|e| api_error(format!("Failed to parse quotes for {ticker}: {e}")))?;

        let mut points: Vec<PricePoint> = quotes
            .iter()
            .filter_map(|q| {
                let date = Self::timestamp_to_naive_date(q.timestamp)?;
                (date >= from && date <= to && q.close.is_finite())
                    .then_some(PricePoint::new(date, q.close))
            })
            .collect();
        points.sort_by_key(|p| p.date);

        Ok(points)
    }

    fn cached_session(&self) -> Result<Option<Session>, CoreError> {
        self.session
            .read()
            .map(|guard| guard.clone())
            .map_err(|_| api_error("Session lock poisoned"))
    }

    fn store_session(&self, session: Option<Session>) -> Result<(), CoreError> {
        let mut guard = self
            .session
            .write()
            .map_err(|_| api_error("Session lock poisoned"))?;
        *guard = session;
        Ok(())
    }

    /// Cookie from the consent host, then a crumb bound to that cookie.
    async fn session(&self) -> Result<Session, CoreError> {
        if let Some(session) = self.cached_session()? {
            return Ok(session);
        }

        let response = self.client.get(COOKIE_URL).send().await?;
        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(';').next())
            .map(str::to_string)
            .ok_or_else(|| api_error("No session cookie in response"))?;

        let crumb = self
            .client
            .get(CRUMB_URL)
            .header(header::USER_AGENT, USER_AGENT)
            .header(header::COOKIE, &cookie)
            .send()
            .await?
            .text()
            .await?;
        let crumb = crumb.trim().to_string();
        if crumb.is_empty() || crumb.contains('<') {
            return Err(api_error("No crumb issued for session"));
        }

        let session = Session { cookie, crumb };
        self.store_session(Some(session.clone()))?;
        Ok(session)
    }

    async fn quote_summary(&self, symbol: &str) -> Result<SymbolProfile, CoreError> {
        let session = self.session().await?;
        let url = format!(
            "{QUOTE_SUMMARY_URL}/{symbol}?modules=price,summaryProfile&crumb={}",
            session.crumb
        );

        let response = self
            .client
            .get(&url)
            .header(header::USER_AGENT, USER_AGENT)
            .header(header::COOKIE, &session.cookie)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            // Crumbs expire; the next lookup opens a new session
            self.store_session(None)?;
            return Err(api_error(format!("quoteSummary for {symbol} rejected ({status})")));
        }

        let body = response.text().await?;
        Self::parse_quote_summary(symbol, &body)
    }

    async fn search_long_name(&self, symbol: &str) -> Result<String, CoreError> {
        let result = self
            .connector
            .search_ticker(symbol)
            .await
            .map_err(|e| api_error(format!("Ticker search failed for {symbol}: {e}")))?;

        result
            .quotes
            .iter()
            .find(|q| q.symbol.eq_ignore_ascii_case(symbol))
            .map(|q| q.long_name.trim().to_string())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| CoreError::DataNotAvailable {
                symbol: symbol.to_string(),
                what: "Profile".into(),
            })
    }
}

#[async_trait]
impl MarketDataProvider for YahooFinanceProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn capabilities(&self) -> Vec<DataKind> {
        vec![
            DataKind::Quote,
            DataKind::FxRate,
            DataKind::History,
            DataKind::FxHistory,
            DataKind::Profile,
        ]
    }

    async fn get_current_price(&self, symbol: &str) -> Result<f64, CoreError> {
        Ok(self.latest_quote(symbol).await?.price)
    }

    async fn get_quote(&self, symbol: &str) -> Result<Quote, CoreError> {
        self.latest_quote(symbol).await
    }

    async fn get_fx_rate(&self, from: &str, to: &str) -> Result<f64, CoreError> {
        if from.eq_ignore_ascii_case(to) {
            return Ok(1.0);
        }
        Ok(self.latest_quote(&Self::fx_ticker(from, to)).await?.price)
    }

    async fn get_price_history(
        &self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<PricePoint>, CoreError> {
        self.daily_closes(symbol, from, to).await
    }

    async fn get_fx_history(
        &self,
        from_currency: &str,
        to_currency: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<PricePoint>, CoreError> {
        self.daily_closes(&Self::fx_ticker(from_currency, to_currency), from, to)
            .await
    }

    /// Sector and name from `quoteSummary`; ticker search supplies the name
    /// when that endpoint fails or has none.
    async fn get_profile(&self, symbol: &str) -> Result<SymbolProfile, CoreError> {
        let summary = match self.quote_summary(symbol).await {
            Ok(profile) => profile,
            Err(e) => {
                debug!("quoteSummary unavailable for {symbol}: {e}");
                SymbolProfile::default()
            }
        };
        if summary.long_name.is_some() {
            return Ok(summary);
        }

        match self.search_long_name(symbol).await {
            Ok(long_name) => Ok(SymbolProfile {
                long_name: Some(long_name),
                ..summary
            }),
            Err(e) if summary.sector.is_some() => {
                debug!("No long name for {symbol}: {e}");
                Ok(summary)
            }
            Err(e) => Err(e),
        }
    }
}
