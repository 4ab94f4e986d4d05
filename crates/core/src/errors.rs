use thiserror::Error;

use crate::models::cache::DataKind;

/// Unified error type for the fallible edges of portfolio-engine-core.
///
/// The valuation, allocation, solver and history computations are total
/// functions and never return this type. It is produced by configuration
/// loading, holding validation and the market-data boundary.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Configuration / Input ───────────────────────────────────────
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    // ── File I/O (native only) ──────────────────────────────────────
    #[error("File I/O error: {0}")]
    FileIO(String),

    // ── API / Network ───────────────────────────────────────────────
    #[error("API error ({provider}): {message}")]
    Api {
        provider: String,
        message: String,
    },

    #[error("Network error: {0}")]
    Network(String),

    #[error("No provider available for {0}")]
    NoProvider(DataKind),

    #[error("{provider} does not support {capability}")]
    Unsupported {
        provider: String,
        capability: DataKind,
    },

    // ── Market data ─────────────────────────────────────────────────
    #[error("{what} not available for {symbol}")]
    DataNotAvailable {
        symbol: String,
        what: String,
    },
}

// ── Conversion helpers (From impls) ─────────────────────────────────

impl From<std::io::Error> for CoreError {
    fn from(e: std::io::Error) -> Self {
        CoreError::FileIO(e.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Deserialization(e.to_string())
    }
}

impl From<reqwest::Error> for CoreError {
    fn from(e: reqwest::Error) -> Self {
        // reqwest errors embed the full URL; drop the query string.
        let msg = e.to_string();
        let sanitized = if let Some(idx) = msg.find('?') {
            format!("{}?<query redacted>", &msg[..idx])
        } else {
            msg
        };
        CoreError::Network(sanitized)
    }
}
