//! Sync orchestrator — discovery, pruning, and the per-symbol
//! fetch-and-append loop, with progress reporting.

use crate::config::SyncWindow;
use crate::dates::date_range;
use crate::source::{KlineSource, SourceError};
use crate::store::{CsvStore, StoreError};
use chrono::{Duration, NaiveDate};
use thiserror::Error;

/// A per-symbol failure: either the source or the store gave up.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Progress callbacks for a sync run.
pub trait SyncProgress {
    /// Called once the catalog has been listed.
    fn on_discovered(&self, count: usize);

    /// Called after availability pruning.
    fn on_pruned(&self, kept: usize, dropped: usize);

    /// Called when a symbol has missing days to fetch. Symbols that
    /// are already current are skipped silently.
    fn on_symbol_start(&self, symbol: &str, index: usize, total: usize, days: usize);

    /// Called after each day's rows have been appended.
    fn on_day(&self, symbol: &str, date: NaiveDate, rows: usize);

    /// Called when a started symbol finishes or fails.
    fn on_symbol_complete(&self, symbol: &str, result: Result<(), &SyncError>);

    /// Called once at the end of the run.
    fn on_finish(&self, synced: usize, skipped: usize, failed: usize);
}

/// Progress reporter that prints to stdout.
pub struct StdoutProgress;

impl SyncProgress for StdoutProgress {
    fn on_discovered(&self, count: usize) {
        println!("discovered {count} symbols, pruning...");
    }

    fn on_pruned(&self, kept: usize, dropped: usize) {
        println!("downloading data for {kept} symbols ({dropped} without full history)");
    }

    fn on_symbol_start(&self, symbol: &str, index: usize, total: usize, days: usize) {
        println!("[{}/{}] getting {days} days of data for {symbol}...", index + 1, total);
    }

    fn on_day(&self, symbol: &str, date: NaiveDate, rows: usize) {
        println!("  {symbol} {date}: {rows} rows");
    }

    fn on_symbol_complete(&self, symbol: &str, result: Result<(), &SyncError>) {
        match result {
            Ok(()) => println!("  OK: {symbol}"),
            Err(e) => println!("  FAIL: {symbol}: {e}"),
        }
    }

    fn on_finish(&self, synced: usize, skipped: usize, failed: usize) {
        println!("\nSync complete: {synced} synced, {skipped} already current, {failed} failed");
    }
}

/// Summary of one sync run.
#[derive(Debug)]
pub struct SyncSummary {
    pub total: usize,
    pub synced: usize,
    pub skipped: usize,
    pub failed: usize,
    pub errors: Vec<(String, SyncError)>,
}

impl SyncSummary {
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

/// Run a full sync: discover symbols, drop the ones without the whole
/// window archived, then bring every survivor's file up to date.
///
/// Per-symbol failures are collected into the summary and do not stop
/// the run; a failed symbol's file keeps only fully appended days and
/// resumes cleanly next run. Catalog or probe failures are fatal —
/// without a trustworthy symbol set there is nothing sensible to sync.
pub fn sync_all(
    source: &dyn KlineSource,
    store: &CsvStore,
    window: SyncWindow,
    progress: &dyn SyncProgress,
) -> Result<SyncSummary, SourceError> {
    let discovered = source.symbols()?;
    progress.on_discovered(discovered.len());

    // Membership is a set; processing order is sorted and fixed.
    let mut candidates: Vec<String> = discovered.into_iter().collect();
    candidates.sort();

    let mut symbols = Vec::new();
    for symbol in &candidates {
        if source.has_full_window(symbol, window)? {
            symbols.push(symbol.clone());
        }
    }
    progress.on_pruned(symbols.len(), candidates.len() - symbols.len());

    let total = symbols.len();
    let mut synced = 0;
    let mut skipped = 0;
    let mut failed = 0;
    let mut errors: Vec<(String, SyncError)> = Vec::new();

    for (index, symbol) in symbols.iter().enumerate() {
        let result = sync_symbol(source, store, symbol, index, total, window, progress);

        match result {
            Ok(SymbolOutcome::AlreadyCurrent) => skipped += 1,
            Ok(SymbolOutcome::Synced) => {
                progress.on_symbol_complete(symbol, Ok(()));
                synced += 1;
            }
            Err(e) => {
                progress.on_symbol_complete(symbol, Err(&e));
                failed += 1;
                errors.push((symbol.clone(), e));
            }
        }
    }

    progress.on_finish(synced, skipped, failed);

    Ok(SyncSummary {
        total,
        synced,
        skipped,
        failed,
        errors,
    })
}

enum SymbolOutcome {
    Synced,
    AlreadyCurrent,
}

/// Bring one symbol's file up to date.
///
/// Days are fetched in increasing order and appended immediately, so
/// an error mid-symbol leaves the file ending at the last complete
/// day — exactly the state the resume computation expects.
fn sync_symbol(
    source: &dyn KlineSource,
    store: &CsvStore,
    symbol: &str,
    index: usize,
    total: usize,
    window: SyncWindow,
    progress: &dyn SyncProgress,
) -> Result<SymbolOutcome, SyncError> {
    let start = match store.last_date(symbol)? {
        Some(last) => last + Duration::days(1),
        None => window.from,
    };

    let dates = date_range(start, window.to);
    if dates.is_empty() {
        return Ok(SymbolOutcome::AlreadyCurrent);
    }

    progress.on_symbol_start(symbol, index, total, dates.len());

    let mut file = store.open(symbol);
    for date in dates {
        let rows = source.fetch_day(symbol, date)?;
        file.append_day(&rows)?;
        progress.on_day(symbol, date, rows.len());
    }

    Ok(SymbolOutcome::Synced)
}
