//! Kline source trait and structured error types.
//!
//! The trait abstracts over where daily archives come from so the
//! orchestrator can be driven by a mock in tests.

use crate::config::SyncWindow;
use chrono::NaiveDate;
use std::collections::HashSet;
use thiserror::Error;

/// Structured errors for source operations.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("network error for {url}: {message}")]
    Network { url: String, message: String },

    #[error("request timed out for {url}")]
    Timeout { url: String },

    #[error("HTTP {status} for {url}")]
    Status { status: u16, url: String },

    #[error("catalog listing could not be parsed: {0}")]
    CatalogParse(String),

    #[error("bad archive for {symbol} on {date}: {reason}")]
    BadArchive {
        symbol: String,
        date: NaiveDate,
        reason: String,
    },

    #[error("archive for {symbol} on {date} contains no data rows")]
    EmptyArchive { symbol: String, date: NaiveDate },
}

/// A provider of daily kline archives.
///
/// Implementations own their connection state; all methods are
/// sequential and blocking.
pub trait KlineSource {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    /// Discover the set of symbols with published archives.
    fn symbols(&self) -> Result<HashSet<String>, SourceError>;

    /// Whether both boundary days of `window` are archived for `symbol`.
    ///
    /// `Ok(false)` means the data is cleanly absent; transport failures
    /// surface as errors rather than being folded into "unavailable".
    fn has_full_window(&self, symbol: &str, window: SyncWindow) -> Result<bool, SourceError>;

    /// Fetch the raw CSV rows for one symbol-day, header stripped.
    fn fetch_day(&self, symbol: &str, date: NaiveDate) -> Result<Vec<String>, SourceError>;
}
