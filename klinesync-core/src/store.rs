//! Append-only per-symbol CSV store.
//!
//! Layout: `{out_dir}/{SYMBOL}.csv` — one header line, then one row
//! per traded minute, appended day by day in increasing date order.
//!
//! The resume point is never stored separately: it is recovered by
//! reading only the file's final line (backward block scan from EOF)
//! and converting its leading epoch-millisecond field to a UTC date.

use chrono::{DateTime, NaiveDate};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Column schema of the daily kline archives, reproduced verbatim as
/// the header of every output file.
pub const KLINE_HEADER: &str = "open_time,open,high,low,close,volume,close_time,\
                                quote_volume,count,taker_buy_volume,taker_buy_quote_volume,ignore";

/// Block size for the backward tail scan.
const TAIL_BLOCK: u64 = 8192;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file exists but holds no line at all. Distinct from a
    /// missing file: an empty file means an earlier run went wrong.
    #[error("output file {path} exists but is empty")]
    EmptyFile { path: PathBuf },

    /// The final line does not start with an epoch-millisecond field.
    #[error("output file {path} has an unparsable last line: {line:?}")]
    MalformedLastLine { path: PathBuf, line: String },
}

/// The per-symbol CSV store rooted at one output directory.
pub struct CsvStore {
    out_dir: PathBuf,
}

impl CsvStore {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
        }
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Output path for a symbol: `{out_dir}/{SYMBOL}.csv`
    pub fn path_for(&self, symbol: &str) -> PathBuf {
        self.out_dir.join(format!("{symbol}.csv"))
    }

    /// The UTC date of the most recently stored row, or `None` when no
    /// file exists yet. An existing file without a parsable data row
    /// is an error — resuming from scratch would re-download silently.
    pub fn last_date(&self, symbol: &str) -> Result<Option<NaiveDate>, StoreError> {
        let path = self.path_for(symbol);
        if !path.exists() {
            return Ok(None);
        }

        let line = read_last_line(&path)?;
        let first = line.split(',').next().unwrap_or("");
        let millis: i64 = first.parse().map_err(|_| StoreError::MalformedLastLine {
            path: path.clone(),
            line: line.clone(),
        })?;

        let date = DateTime::from_timestamp_millis(millis)
            .ok_or(StoreError::MalformedLastLine { path, line })?
            .date_naive();

        Ok(Some(date))
    }

    /// Open an append handle for a symbol. No filesystem side effect
    /// happens until the first append, so a symbol whose first fetch
    /// fails leaves no file behind.
    pub fn open(&self, symbol: &str) -> SymbolFile {
        SymbolFile {
            path: self.path_for(symbol),
            writer: None,
        }
    }
}

/// Scoped append handle for one symbol's file.
///
/// Created lazily: the file (and the output directory) come into
/// existence on the first appended day, header first when the file is
/// fresh. Every append flushes, so a crash between days loses nothing
/// already fetched.
pub struct SymbolFile {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl SymbolFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one day's rows, in order, and flush.
    pub fn append_day(&mut self, rows: &[String]) -> Result<(), StoreError> {
        let path = &self.path;
        let io = |source: std::io::Error| StoreError::Io {
            path: path.clone(),
            source,
        };

        if self.writer.is_none() {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(io)?;
            }
            let fresh = !path.exists();
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(io)?;
            let mut writer = BufWriter::new(file);
            if fresh {
                writeln!(writer, "{KLINE_HEADER}").map_err(io)?;
            }
            self.writer = Some(writer);
        }

        let writer = self.writer.as_mut().expect("writer opened above");
        for row in rows {
            writeln!(writer, "{row}").map_err(io)?;
        }
        writer.flush().map_err(io)
    }
}

/// Read the final non-empty line of a file without loading the whole
/// file: scan backward from EOF in fixed-size blocks until a line
/// terminator for a preceding line is found.
fn read_last_line(path: &Path) -> Result<String, StoreError> {
    let io = |source: std::io::Error| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut file = File::open(path).map_err(io)?;
    let len = file.metadata().map_err(io)?.len();
    if len == 0 {
        return Err(StoreError::EmptyFile {
            path: path.to_path_buf(),
        });
    }

    let mut pos = len;
    let mut tail: Vec<u8> = Vec::new();

    loop {
        let start = pos.saturating_sub(TAIL_BLOCK);
        let mut block = vec![0u8; (pos - start) as usize];
        file.seek(SeekFrom::Start(start)).map_err(io)?;
        file.read_exact(&mut block).map_err(io)?;
        block.extend_from_slice(&tail);
        tail = block;
        pos = start;

        // Ignore trailing newline bytes; they only terminate the line
        // we are looking for.
        let end = tail
            .iter()
            .rposition(|&b| b != b'\n' && b != b'\r')
            .map(|i| i + 1)
            .unwrap_or(0);

        if end == 0 {
            if pos == 0 {
                return Err(StoreError::EmptyFile {
                    path: path.to_path_buf(),
                });
            }
            continue;
        }

        if let Some(nl) = tail[..end].iter().rposition(|&b| b == b'\n') {
            return Ok(String::from_utf8_lossy(&tail[nl + 1..end]).into_owned());
        }
        if pos == 0 {
            return Ok(String::from_utf8_lossy(&tail[..end]).into_owned());
        }
    }
}
