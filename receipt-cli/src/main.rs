use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use receipt_ledger::{
    FolderWatcher, Ledger, LedgerSummary, Processor, WatchReport, process_dir, read_ledger,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

mod config;
mod logging;
mod state;

use config::Config;

#[derive(Parser, Debug)]
#[command(
    name = "receipts",
    version,
    long_version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("RECEIPTS_BUILD_SHA"), ")"),
    about = "Receipt OCR to an append-only CSV ledger"
)]
struct Cli {
    /// Config file (default: $RECEIPTS_HOME/config.toml, else ~/.receipts/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging, including OCR text previews
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process one receipt image and append it to the ledger
    Process {
        /// Receipt image (jpg, jpeg, png, tif, tiff)
        #[arg(short = 'i', long = "in")]
        input: PathBuf,

        /// Ledger CSV (default from config: output/receipt_data.csv)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Watch a folder and process each new image as it lands
    Watch {
        #[arg(short, long)]
        dir: PathBuf,

        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Concurrent files (1-4)
        #[arg(long)]
        workers: Option<usize>,
    },

    /// Process every image already in a folder, in name order
    Batch {
        #[arg(short, long)]
        dir: PathBuf,

        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Print the ledger
    List {
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Write the default config file if absent
    InitConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _ = dotenvy::dotenv();
    logging::init(cli.verbose, cli.log_json);

    let explicit = cli.config.as_deref();
    let load = || config::load_config(explicit).map(Config::with_env);

    match cli.command {
        Command::InitConfig => config::init_config(explicit),

        Command::Process { input, out } => {
            let cfg = load()?;
            let out = out.unwrap_or_else(|| cfg.ledger.output.clone());
            let processor = build_processor(&cfg, &out)?;
            match processor.process(&input).await {
                Ok(_) => {
                    println!("Done. CSV saved to: {}", out.display());
                    Ok(())
                }
                Err(e) => {
                    error!(image = %input.display(), kind = e.kind(), "processing failed");
                    Err(e.into())
                }
            }
        }

        Command::Watch { dir, out, workers } => {
            let cfg = load()?;
            let out = out.unwrap_or_else(|| cfg.ledger.output.clone());
            let processor = Arc::new(build_processor(&cfg, &out)?);
            let watcher = FolderWatcher::new(&dir, processor, cfg.watch_config(workers))?;

            println!("Watching {} (Ctrl-C to stop)", watcher.dir().display());
            let report = watcher.run(ctrl_c()).await?;
            print_watch_report(&report, &out);
            Ok(())
        }

        Command::Batch { dir, out } => {
            let cfg = load()?;
            let out = out.unwrap_or_else(|| cfg.ledger.output.clone());
            let processor = build_processor(&cfg, &out)?;
            let report = process_dir(&processor, &dir).await?;

            println!(
                "Processed {} receipts ({} failed)",
                report.processed.len(),
                report.failed.len()
            );
            for (path, e) in &report.failed {
                println!("  {}  {}", path.display(), e);
            }
            if !report.is_success() {
                bail!("{} receipt(s) failed", report.failed.len());
            }
            println!("CSV saved to: {}", out.display());
            Ok(())
        }

        Command::List { out } => {
            let cfg = load()?;
            let out = out.unwrap_or_else(|| cfg.ledger.output.clone());
            list(&out)
        }
    }
}

fn build_processor(cfg: &Config, out: &Path) -> Result<Processor> {
    let backend = cfg.backend()?;
    info!(backend = backend.name(), ledger = %out.display(), "ready");
    Ok(Processor::new(backend, Ledger::open(out), cfg.processor_config()))
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("cannot listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    info!("shutting down, waiting for in-flight receipts");
}

fn print_watch_report(report: &WatchReport, out: &Path) {
    println!(
        "\nStopped. Processed {}, failed {}, ignored {}",
        report.processed, report.failed, report.ignored
    );
    println!("CSV saved to: {}", out.display());
}

fn list(out: &Path) -> Result<()> {
    let rows = read_ledger(out).with_context(|| format!("read ledger {}", out.display()))?;
    if rows.is_empty() {
        println!("No receipts in {}", out.display());
        return Ok(());
    }

    println!(
        "{:<10}  {:<5}  {:<5}  {:>10}  {:<24}  {}",
        "date", "start", "end", "total", "file", "processed_at"
    );
    for r in &rows {
        println!(
            "{:<10}  {:<5}  {:<5}  {:>10}  {:<24}  {}",
            r.date, r.start_time, r.end_time, r.total, r.source_file, r.processed_at
        );
    }

    let summary = LedgerSummary::from_rows(&rows);
    println!(
        "\nReceipts: {} (with total: {}, sum: {:.2})",
        summary.rows, summary.with_total, summary.total_amount
    );
    Ok(())
}
