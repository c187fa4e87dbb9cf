//! Integration tests for the sync loop using a mocked kline source.
//!
//! No network: the mock scripts discovery, availability, and per-day
//! fetch results, and the store writes into a tempfile directory.

use chrono::NaiveDate;
use klinesync_core::{
    sync_all, CsvStore, KlineSource, SourceError, SyncError, SyncProgress, SyncWindow,
    KLINE_HEADER,
};
use std::collections::HashSet;
use std::fs;

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

/// One synthetic kline row for `date` at minute `minute`.
fn kline_row(date: NaiveDate, minute: i64) -> String {
    let open = date.and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp_millis() + minute * 60_000;
    format!(
        "{open},1.0,2.0,0.5,1.5,100.0,{},150.0,10,40.0,60.0,0",
        open + 59_999
    )
}

struct MockSource {
    symbols: HashSet<String>,
    /// Symbols whose availability probe cleanly reports "not archived".
    unavailable: HashSet<String>,
    /// Symbols whose availability probe fails at the transport level.
    probe_errors: HashSet<String>,
    /// Symbol-days whose archive fetch fails.
    failing_days: HashSet<(String, NaiveDate)>,
    rows_per_day: i64,
}

impl MockSource {
    fn with_symbols(symbols: &[&str]) -> Self {
        Self {
            symbols: symbols.iter().map(|s| s.to_string()).collect(),
            unavailable: HashSet::new(),
            probe_errors: HashSet::new(),
            failing_days: HashSet::new(),
            rows_per_day: 2,
        }
    }
}

impl KlineSource for MockSource {
    fn name(&self) -> &str {
        "mock"
    }

    fn symbols(&self) -> Result<HashSet<String>, SourceError> {
        Ok(self.symbols.clone())
    }

    fn has_full_window(&self, symbol: &str, _window: SyncWindow) -> Result<bool, SourceError> {
        if self.probe_errors.contains(symbol) {
            return Err(SourceError::Network {
                url: format!("https://example.test/{symbol}.zip.CHECKSUM"),
                message: "connection reset".into(),
            });
        }
        Ok(!self.unavailable.contains(symbol))
    }

    fn fetch_day(&self, symbol: &str, date: NaiveDate) -> Result<Vec<String>, SourceError> {
        if self.failing_days.contains(&(symbol.to_string(), date)) {
            return Err(SourceError::Status {
                status: 404,
                url: format!("https://example.test/{symbol}-{date}.zip"),
            });
        }
        Ok((0..self.rows_per_day)
            .map(|minute| kline_row(date, minute))
            .collect())
    }
}

/// No-op progress for tests.
struct SilentProgress;

impl SyncProgress for SilentProgress {
    fn on_discovered(&self, _count: usize) {}
    fn on_pruned(&self, _kept: usize, _dropped: usize) {}
    fn on_symbol_start(&self, _symbol: &str, _index: usize, _total: usize, _days: usize) {}
    fn on_day(&self, _symbol: &str, _date: NaiveDate, _rows: usize) {}
    fn on_symbol_complete(&self, _symbol: &str, _result: Result<(), &SyncError>) {}
    fn on_finish(&self, _synced: usize, _skipped: usize, _failed: usize) {}
}

fn window(from: NaiveDate, to: NaiveDate) -> SyncWindow {
    SyncWindow { from, to }
}

#[test]
fn fresh_sync_writes_header_and_all_days_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let store = CsvStore::new(dir.path());
    let source = MockSource::with_symbols(&["AAAUSDT"]);
    let w = window(d(2024, 3, 1), d(2024, 3, 3));

    let summary = sync_all(&source, &store, w, &SilentProgress).unwrap();
    assert_eq!(summary.total, 1);
    assert_eq!(summary.synced, 1);
    assert!(summary.all_succeeded());

    let path = store.path_for("AAAUSDT");
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(&path)
        .unwrap();

    assert_eq!(reader.headers().unwrap().len(), 12);
    assert_eq!(reader.headers().unwrap()[0], *"open_time");

    let open_times: Vec<i64> = reader
        .records()
        .map(|r| r.unwrap()[0].parse().unwrap())
        .collect();
    // 3 days x 2 rows, strictly increasing.
    assert_eq!(open_times.len(), 6);
    assert!(open_times.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn second_run_appends_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let store = CsvStore::new(dir.path());
    let source = MockSource::with_symbols(&["AAAUSDT"]);
    let w = window(d(2024, 3, 1), d(2024, 3, 3));

    sync_all(&source, &store, w, &SilentProgress).unwrap();
    let before = fs::read(store.path_for("AAAUSDT")).unwrap();

    let summary = sync_all(&source, &store, w, &SilentProgress).unwrap();
    assert_eq!(summary.synced, 0);
    assert_eq!(summary.skipped, 1);

    let after = fs::read(store.path_for("AAAUSDT")).unwrap();
    assert_eq!(before, after);
}

#[test]
fn widened_window_appends_new_days_after_old_ones() {
    let dir = tempfile::tempdir().unwrap();
    let store = CsvStore::new(dir.path());
    let source = MockSource::with_symbols(&["AAAUSDT"]);

    sync_all(&source, &store, window(d(2024, 3, 1), d(2024, 3, 1)), &SilentProgress).unwrap();
    sync_all(&source, &store, window(d(2024, 3, 1), d(2024, 3, 2)), &SilentProgress).unwrap();

    let content = fs::read_to_string(store.path_for("AAAUSDT")).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 1 + 4);
    assert_eq!(lines[0], KLINE_HEADER);

    let day1 = d(2024, 3, 1).and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp_millis();
    let day2 = d(2024, 3, 2).and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp_millis();
    assert!(lines[1].starts_with(&day1.to_string()));
    assert!(lines[3].starts_with(&day2.to_string()));
    // The second run must not have re-fetched the first day.
    let day1_rows = lines[1..]
        .iter()
        .filter(|l| l.starts_with(&day1.to_string()))
        .count();
    assert_eq!(day1_rows, 1);
}

#[test]
fn unavailable_symbol_is_dropped_entirely() {
    let dir = tempfile::tempdir().unwrap();
    let store = CsvStore::new(dir.path());
    let mut source = MockSource::with_symbols(&["AAAUSDT", "BBBUSDT"]);
    source.unavailable.insert("BBBUSDT".into());

    let summary = sync_all(
        &source,
        &store,
        window(d(2024, 3, 1), d(2024, 3, 2)),
        &SilentProgress,
    )
    .unwrap();

    assert_eq!(summary.total, 1);
    assert_eq!(summary.synced, 1);
    assert!(store.path_for("AAAUSDT").exists());
    assert!(!store.path_for("BBBUSDT").exists());
}

#[test]
fn probe_transport_error_aborts_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let store = CsvStore::new(dir.path());
    let mut source = MockSource::with_symbols(&["AAAUSDT", "BBBUSDT"]);
    source.probe_errors.insert("AAAUSDT".into());

    let result = sync_all(
        &source,
        &store,
        window(d(2024, 3, 1), d(2024, 3, 2)),
        &SilentProgress,
    );

    assert!(matches!(result, Err(SourceError::Network { .. })));
}

#[test]
fn failed_day_leaves_symbol_resumable() {
    let dir = tempfile::tempdir().unwrap();
    let store = CsvStore::new(dir.path());
    let w = window(d(2024, 3, 1), d(2024, 3, 3));

    let mut source = MockSource::with_symbols(&["AAAUSDT", "BBBUSDT"]);
    source
        .failing_days
        .insert(("AAAUSDT".into(), d(2024, 3, 2)));

    let summary = sync_all(&source, &store, w, &SilentProgress).unwrap();
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.synced, 1); // the other symbol still completed
    assert_eq!(summary.errors.len(), 1);
    assert_eq!(summary.errors[0].0, "AAAUSDT");

    // Only the fully fetched day was appended.
    let content = fs::read_to_string(store.path_for("AAAUSDT")).unwrap();
    assert_eq!(content.lines().count(), 1 + 2);

    // A later run with the fault gone completes the file in order.
    let source = MockSource::with_symbols(&["AAAUSDT", "BBBUSDT"]);
    let summary = sync_all(&source, &store, w, &SilentProgress).unwrap();
    assert!(summary.all_succeeded());

    let content = fs::read_to_string(store.path_for("AAAUSDT")).unwrap();
    let open_times: Vec<i64> = content
        .lines()
        .skip(1)
        .map(|l| l.split(',').next().unwrap().parse().unwrap())
        .collect();
    assert_eq!(open_times.len(), 6);
    assert!(open_times.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn failing_first_day_creates_no_file() {
    let dir = tempfile::tempdir().unwrap();
    let store = CsvStore::new(dir.path());
    let w = window(d(2024, 3, 1), d(2024, 3, 2));

    let mut source = MockSource::with_symbols(&["AAAUSDT"]);
    source
        .failing_days
        .insert(("AAAUSDT".into(), d(2024, 3, 1)));

    let summary = sync_all(&source, &store, w, &SilentProgress).unwrap();
    assert_eq!(summary.failed, 1);
    assert!(!store.path_for("AAAUSDT").exists());
}

#[test]
fn malformed_state_file_fails_the_symbol_without_touching_it() {
    let dir = tempfile::tempdir().unwrap();
    let store = CsvStore::new(dir.path());
    let source = MockSource::with_symbols(&["AAAUSDT"]);

    let garbage = "this is not a kline file\n";
    fs::write(store.path_for("AAAUSDT"), garbage).unwrap();

    let summary = sync_all(
        &source,
        &store,
        window(d(2024, 3, 1), d(2024, 3, 2)),
        &SilentProgress,
    )
    .unwrap();

    assert_eq!(summary.failed, 1);
    assert!(matches!(
        summary.errors[0].1,
        SyncError::Store(klinesync_core::StoreError::MalformedLastLine { .. })
    ));
    assert_eq!(fs::read_to_string(store.path_for("AAAUSDT")).unwrap(), garbage);
}
