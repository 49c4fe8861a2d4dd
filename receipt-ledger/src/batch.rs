//! One pass over every supported image already in a directory.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use receipt_core::{ReceiptError, ReceiptRecord};
use tracing::{error, info};

use crate::processor::Processor;

#[derive(Debug, Default)]
pub struct BatchReport {
    pub processed: Vec<ReceiptRecord>,
    pub failed: Vec<(PathBuf, ReceiptError)>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Process the images directly inside `dir` (not subdirectories), in file
/// name order, one at a time. Per-file failures are collected, not returned.
pub async fn process_dir(processor: &Processor, dir: &Path) -> Result<BatchReport> {
    let mut images = Vec::new();
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("reading directory {}", dir.display()))?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if entry.file_type().await?.is_file() && processor.accepts(&path) {
            images.push(path);
        }
    }
    images.sort();

    info!(dir = %dir.display(), images = images.len(), "batch scan");

    let mut report = BatchReport::default();
    for path in images {
        match processor.process(&path).await {
            Ok(record) => report.processed.push(record),
            Err(e) => {
                error!(image = %path.display(), kind = e.kind(), error = %e, "receipt failed");
                report.failed.push((path, e));
            }
        }
    }
    Ok(report)
}
