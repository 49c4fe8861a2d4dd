//! Append-only CSV ledger.
//!
//! Header: `date,start_time,end_time,total,source_file,processed_at`, written
//! once when the file is empty. Appends to one path are serialized twice: a
//! process-wide mutex per path, and an exclusive OS lock on the open file so
//! another process (a manual run next to the watcher) cannot interleave rows.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex, PoisonError};

use anyhow::{Context, Result};
use receipt_core::record::LedgerRow;
use receipt_core::{LEDGER_HEADER, ReceiptError, ReceiptRecord};
use tracing::debug;

static PATH_LOCKS: LazyLock<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Handle to one ledger file. Cheap to clone; clones share the path lock.
#[derive(Debug, Clone)]
pub struct Ledger {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl Ledger {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let key = std::path::absolute(&path).unwrap_or_else(|_| path.clone());
        let lock = PATH_LOCKS
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key)
            .or_default()
            .clone();
        Self { path, lock }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record, creating the file (and its directories) and header
    /// as needed. The row is flushed and synced before returning.
    pub fn append(&self, record: &ReceiptRecord) -> Result<LedgerRow, ReceiptError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let fail = |e: &dyn std::fmt::Display| ReceiptError::output_write(&self.path, e);

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| fail(&e))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| fail(&e))?;
        file.lock().map_err(|e| fail(&e))?;

        let row = record.to_row();
        let wrote_header = write_locked(&file, &row).map_err(|e| fail(&e))?;
        file.sync_all().map_err(|e| fail(&e))?;
        file.unlock().map_err(|e| fail(&e))?;

        debug!(
            path = %self.path.display(),
            source_file = %row.source_file,
            wrote_header,
            "ledger row appended"
        );
        Ok(row)
    }
}

fn write_locked(file: &File, row: &LedgerRow) -> Result<bool> {
    let is_new = file.metadata()?.len() == 0;

    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);
    if is_new {
        wtr.write_record(LEDGER_HEADER)?;
    }
    wtr.serialize(row)?;
    wtr.flush()?;
    Ok(is_new)
}

/// Read every row of a ledger. A missing file is an empty ledger.
pub fn read_ledger(path: impl AsRef<Path>) -> Result<Vec<LedgerRow>> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Vec::new());
    }

    let mut rdr = csv::Reader::from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;

    let headers = rdr.headers()?.clone();
    if headers.iter().ne(LEDGER_HEADER) {
        anyhow::bail!(
            "{} does not look like a receipt ledger (header: {})",
            path.display(),
            headers.iter().collect::<Vec<_>>().join(",")
        );
    }

    let mut rows = Vec::new();
    for result in rdr.deserialize() {
        let row: LedgerRow = result.with_context(|| format!("parsing {}", path.display()))?;
        rows.push(row);
    }
    Ok(rows)
}

/// Totals over a set of ledger rows
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LedgerSummary {
    pub rows: usize,
    pub with_total: usize,
    pub total_amount: f64,
}

impl LedgerSummary {
    pub fn from_rows(rows: &[LedgerRow]) -> Self {
        let amounts: Vec<f64> = rows.iter().filter_map(|r| r.total.parse().ok()).collect();
        Self {
            rows: rows.len(),
            with_total: amounts.len(),
            total_amount: amounts.iter().sum(),
        }
    }
}
