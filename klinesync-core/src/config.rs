//! Sync configuration and trailing-window arithmetic.
//!
//! All endpoint and product constants live in one value type that is
//! passed by reference into the source and orchestrator — no global
//! state, no mutable session mixed into configuration.

use chrono::{Duration, NaiveDate};
use std::time::Duration as StdDuration;

/// Configuration for one sync run.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Bucket-listing host (S3 endpoint serving the catalog).
    pub s3_host: String,
    /// Archive host serving the daily zip files and checksum sidecars.
    pub data_host: String,
    /// Key prefix of the product being synced, with trailing slash.
    pub product_prefix: String,
    /// Kline interval segment used in archive paths and file names.
    pub interval: String,
    /// Only symbols quoted in this currency are synced.
    pub quote_suffix: String,
    /// Length of the trailing window, in days before its end.
    pub window_days: i64,
    /// Per-request timeout, applied client-wide.
    pub request_timeout: StdDuration,
    /// Extra attempts after a failed request.
    pub max_retries: u32,
    /// Backoff before the first retry; doubles per attempt.
    pub retry_base_delay: StdDuration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            s3_host: "s3-ap-northeast-1.amazonaws.com".into(),
            data_host: "data.binance.vision".into(),
            product_prefix: "data/futures/um/daily/klines/".into(),
            interval: "1m".into(),
            quote_suffix: "USDT".into(),
            window_days: 90,
            request_timeout: StdDuration::from_secs(10),
            max_retries: 3,
            retry_base_delay: StdDuration::from_millis(500),
        }
    }
}

impl SyncConfig {
    /// Bucket-listing URL for symbol discovery.
    pub fn catalog_url(&self) -> String {
        format!(
            "https://{}/data.binance.vision?delimiter=/&prefix={}",
            self.s3_host, self.product_prefix
        )
    }

    /// The window synced relative to `today`: ends yesterday, spans
    /// `window_days` further back (both bounds inclusive).
    pub fn window(&self, today: NaiveDate) -> SyncWindow {
        let to = today - Duration::days(1);
        SyncWindow {
            from: to - Duration::days(self.window_days),
            to,
        }
    }
}

/// Inclusive date range targeted by a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncWindow {
    pub from: NaiveDate,
    pub to: NaiveDate,
}
