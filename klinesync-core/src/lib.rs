//! klinesync core — incremental Binance Vision kline downloading.
//!
//! This crate contains everything but the binary:
//! - Configuration and trailing-window arithmetic
//! - Symbol discovery from the bucket listing
//! - Per-symbol availability probing and daily archive fetching
//! - Append-only per-symbol CSV store with tail-read resume
//! - The sequential sync orchestrator

pub mod config;
pub mod dates;
pub mod source;
pub mod store;
pub mod sync;
pub mod vision;

pub use config::{SyncConfig, SyncWindow};
pub use dates::date_range;
pub use source::{KlineSource, SourceError};
pub use store::{CsvStore, StoreError, SymbolFile, KLINE_HEADER};
pub use sync::{sync_all, StdoutProgress, SyncError, SyncProgress, SyncSummary};
pub use vision::VisionSource;
