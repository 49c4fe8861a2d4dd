//! Single-image pipeline: validate -> OCR -> extract -> append.
//!
//! This is the unit shared by the one-shot command, the batch scan and the
//! folder watcher. It is also the error boundary: every failure comes back as
//! a `ReceiptError`, and no ledger row is written unless every step succeeded.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use receipt_core::{ReceiptError, ReceiptRecord, extract_fields};
use receipt_ingest::OcrBackend;
use tracing::{debug, info};

use crate::ledger::Ledger;

/// Extensions accepted by default (compared case-insensitively)
pub const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "tif", "tiff"];

const PREVIEW_CHARS: usize = 500;

#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Upper bound on one OCR call
    pub ocr_timeout: Duration,
    pub extensions: Vec<String>,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            ocr_timeout: Duration::from_secs(30),
            extensions: SUPPORTED_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }
}

pub struct Processor {
    backend: Arc<dyn OcrBackend>,
    ledger: Ledger,
    config: ProcessorConfig,
}

impl Processor {
    pub fn new(backend: Arc<dyn OcrBackend>, ledger: Ledger, config: ProcessorConfig) -> Self {
        Self {
            backend,
            ledger,
            config,
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// True if the path has one of the configured image extensions.
    pub fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.config.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
    }

    /// Process one image and append its record to the ledger.
    pub async fn process(&self, image: &Path) -> Result<ReceiptRecord, ReceiptError> {
        let bytes = self.read_image(image).await?;

        info!(
            image = %image.display(),
            backend = self.backend.name(),
            "processing receipt"
        );
        let started = Instant::now();

        let doc = match tokio::time::timeout(self.config.ocr_timeout, self.backend.analyze(&bytes))
            .await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(ReceiptError::ocr(format!(
                    "OCR call timed out after {:?}",
                    self.config.ocr_timeout
                )));
            }
        };

        let text = doc.text();
        debug!(
            chars = text.len(),
            preview = %text.chars().take(PREVIEW_CHARS).collect::<String>(),
            "OCR text"
        );

        let fields = extract_fields(&doc);
        debug!(?fields, found = fields.found_count(), "parsed fields");

        let record = ReceiptRecord::new(fields, source_name(image), Utc::now());

        let ledger = self.ledger.clone();
        let to_append = record.clone();
        tokio::task::spawn_blocking(move || ledger.append(&to_append))
            .await
            .map_err(|e| ReceiptError::output_write(self.ledger.path(), e))??;

        info!(
            image = %image.display(),
            ledger = %self.ledger.path().display(),
            found = record.fields.found_count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "receipt recorded"
        );
        Ok(record)
    }

    /// Validate the input and return its bytes.
    async fn read_image(&self, path: &Path) -> Result<Vec<u8>, ReceiptError> {
        let invalid = |reason: String| ReceiptError::invalid_input(path, reason);

        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|e| invalid(format!("cannot access file: {e}")))?;
        if !meta.is_file() {
            return Err(invalid("not a regular file".to_string()));
        }
        if !self.accepts(path) {
            return Err(invalid(format!(
                "unsupported file type (expected one of: {})",
                self.config.extensions.join(", ")
            )));
        }

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| invalid(format!("cannot read file: {e}")))?;
        if bytes.is_empty() {
            return Err(invalid("file is empty".to_string()));
        }
        if sniff_image(&bytes).is_none() {
            return Err(invalid("content is not a JPEG, PNG or TIFF image".to_string()));
        }
        Ok(bytes)
    }
}

/// Image format from the leading magic bytes.
pub fn sniff_image(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("jpeg")
    } else if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        Some("png")
    } else if bytes.starts_with(b"II*\0") || bytes.starts_with(b"MM\0*") {
        Some("tiff")
    } else {
        None
    }
}

fn source_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
