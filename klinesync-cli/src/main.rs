//! klinesync CLI — incrementally sync Binance USDT-M futures 1m
//! klines into per-symbol CSV files.

use anyhow::Result;
use clap::Parser;
use klinesync_core::{sync_all, CsvStore, StdoutProgress, SyncConfig, VisionSource};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "klinesync",
    about = "Incrementally download Binance USDT-M futures 1m klines into per-symbol CSV files"
)]
struct Cli {
    /// Output directory for per-symbol CSV files.
    #[arg(default_value = "data")]
    out_dir: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = SyncConfig::default();
    let window = config.window(chrono::Utc::now().date_naive());

    let source = VisionSource::new(config);
    let store = CsvStore::new(cli.out_dir);
    let progress = StdoutProgress;

    let summary = sync_all(&source, &store, window, &progress)?;

    if !summary.all_succeeded() {
        for (symbol, err) in &summary.errors {
            eprintln!("Error for {symbol}: {err}");
        }
        std::process::exit(1);
    }

    Ok(())
}
