//! Binance Vision kline source.
//!
//! Three request families against the public archive:
//! - the bucket listing (symbol discovery),
//! - `.CHECKSUM` sidecar probes (availability, status only),
//! - daily zip archives (`<symbol>/1m/<symbol>-1m-<YYYY-MM-DD>.zip`).
//!
//! One blocking client is built per source and reused for every
//! request; transport failures get a bounded retry with doubling
//! backoff before they surface.

use crate::config::{SyncConfig, SyncWindow};
use crate::source::{KlineSource, SourceError};
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::HashSet;
use std::io::{Cursor, Read};
use zip::ZipArchive;

/// Bucket listing document. The request-echo `Prefix` and every
/// `CommonPrefixes/Prefix` are candidate symbol paths.
#[derive(Debug, Deserialize)]
struct ListBucketResult {
    #[serde(rename = "Prefix", default)]
    prefix: Option<String>,
    #[serde(rename = "CommonPrefixes", default)]
    common_prefixes: Vec<CommonPrefix>,
}

#[derive(Debug, Deserialize)]
struct CommonPrefix {
    #[serde(rename = "Prefix")]
    prefix: String,
}

/// Binance Vision archive source.
pub struct VisionSource {
    client: reqwest::blocking::Client,
    config: SyncConfig,
}

impl VisionSource {
    pub fn new(config: SyncConfig) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .expect("failed to build HTTP client");

        Self { client, config }
    }

    fn archive_url(&self, symbol: &str, date: NaiveDate) -> String {
        format!(
            "https://{}/{}{}/{}/{}-{}-{}.zip",
            self.config.data_host,
            self.config.product_prefix,
            symbol,
            self.config.interval,
            symbol,
            self.config.interval,
            date.format("%Y-%m-%d")
        )
    }

    fn checksum_url(&self, symbol: &str, date: NaiveDate) -> String {
        format!("{}.CHECKSUM", self.archive_url(symbol, date))
    }

    /// One GET with bounded retry on transport failure. Response status
    /// is not inspected here; deciding what a non-success status means
    /// is the caller's concern.
    fn get_with_retry(&self, url: &str) -> Result<reqwest::blocking::Response, SourceError> {
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay = self.config.retry_base_delay * 2u32.pow(attempt - 1);
                std::thread::sleep(delay);
            }

            match self.client.get(url).send() {
                Ok(resp) => return Ok(resp),
                Err(e) if e.is_timeout() => {
                    last_error = Some(SourceError::Timeout {
                        url: url.to_string(),
                    });
                }
                Err(e) => {
                    last_error = Some(SourceError::Network {
                        url: url.to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }

        Err(last_error.unwrap_or_else(|| SourceError::Network {
            url: url.to_string(),
            message: "retries exhausted".into(),
        }))
    }

    /// Existence probe: only the HTTP status matters.
    fn probe(&self, url: &str) -> Result<bool, SourceError> {
        let resp = self.get_with_retry(url)?;
        Ok(resp.status().is_success())
    }
}

impl KlineSource for VisionSource {
    fn name(&self) -> &str {
        "binance_vision"
    }

    fn symbols(&self) -> Result<HashSet<String>, SourceError> {
        let url = self.config.catalog_url();
        let resp = self.get_with_retry(&url)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                status: status.as_u16(),
                url,
            });
        }

        let body = resp.text().map_err(|e| SourceError::Network {
            url: url.clone(),
            message: e.to_string(),
        })?;

        parse_catalog(&body, &self.config.quote_suffix)
    }

    fn has_full_window(&self, symbol: &str, window: SyncWindow) -> Result<bool, SourceError> {
        if !self.probe(&self.checksum_url(symbol, window.from))? {
            return Ok(false);
        }
        self.probe(&self.checksum_url(symbol, window.to))
    }

    fn fetch_day(&self, symbol: &str, date: NaiveDate) -> Result<Vec<String>, SourceError> {
        let url = self.archive_url(symbol, date);
        let resp = self.get_with_retry(&url)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                status: status.as_u16(),
                url,
            });
        }

        let bytes = resp.bytes().map_err(|e| SourceError::Network {
            url: url.clone(),
            message: e.to_string(),
        })?;

        extract_rows(symbol, date, &bytes)
    }
}

/// Parse a `ListBucketResult` document into the set of symbols whose
/// path matches the configured product and quote suffix.
fn parse_catalog(xml: &str, quote_suffix: &str) -> Result<HashSet<String>, SourceError> {
    let doc: ListBucketResult =
        quick_xml::de::from_str(xml).map_err(|e| SourceError::CatalogParse(e.to_string()))?;

    Ok(doc
        .common_prefixes
        .iter()
        .map(|p| p.prefix.as_str())
        .chain(doc.prefix.as_deref())
        .filter_map(|p| symbol_from_prefix(p, quote_suffix))
        .collect())
}

/// Extract the symbol segment from a listing prefix.
///
/// Matching paths look like `data/futures/um/daily/klines/BTCUSDT/`:
/// seven `/`-separated segments (the trailing slash yields an empty
/// seventh), the product segment at index 4, the symbol at index 5.
fn symbol_from_prefix(prefix: &str, quote_suffix: &str) -> Option<String> {
    let parts: Vec<&str> = prefix.split('/').collect();
    if parts.len() == 7 && parts[4] == "klines" && parts[5].ends_with(quote_suffix) {
        Some(parts[5].to_string())
    } else {
        None
    }
}

/// Unpack a daily archive into its data rows.
///
/// The archive must contain exactly one UTF-8 file. Leading lines that
/// do not start with an ASCII digit are dropped (embedded header); an
/// archive with no data row left is an error, not an empty day.
fn extract_rows(symbol: &str, date: NaiveDate, bytes: &[u8]) -> Result<Vec<String>, SourceError> {
    let bad = |reason: String| SourceError::BadArchive {
        symbol: symbol.to_string(),
        date,
        reason,
    };

    let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(|e| bad(e.to_string()))?;

    if archive.len() != 1 {
        return Err(bad(format!("expected 1 entry, found {}", archive.len())));
    }

    let mut entry = archive.by_index(0).map_err(|e| bad(e.to_string()))?;
    let mut text = String::new();
    entry
        .read_to_string(&mut text)
        .map_err(|e| bad(e.to_string()))?;

    let rows: Vec<String> = text
        .lines()
        .skip_while(|line| !line.starts_with(|c: char| c.is_ascii_digit()))
        .map(str::to_string)
        .collect();

    if rows.is_empty() {
        return Err(SourceError::EmptyArchive {
            symbol: symbol.to_string(),
            date,
        });
    }

    Ok(rows)
}
