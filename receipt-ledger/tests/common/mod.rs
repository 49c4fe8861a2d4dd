#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use receipt_core::{OcrDocument, ReceiptError};
use receipt_ingest::{OcrBackend, ReplayBackend};
use receipt_ledger::{Ledger, Processor, ProcessorConfig};

pub const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";
pub const JPEG: &[u8] = b"\xFF\xD8\xFF\xE0\0\x10JFIF";

pub fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .join("fixtures")
        .join("analyze_expense_coffee.json")
}

pub fn write_image(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

/// Fixed OCR text for every image, counting calls.
pub struct TextBackend {
    pub text: String,
    pub calls: AtomicUsize,
}

impl TextBackend {
    pub fn new(text: &str) -> Arc<Self> {
        Arc::new(Self {
            text: text.to_string(),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OcrBackend for TextBackend {
    fn name(&self) -> &str {
        "text"
    }

    async fn analyze(&self, _image: &[u8]) -> Result<OcrDocument, ReceiptError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(OcrDocument::from_text(&self.text))
    }
}

/// Never answers in time.
pub struct StalledBackend;

#[async_trait]
impl OcrBackend for StalledBackend {
    fn name(&self) -> &str {
        "stalled"
    }

    async fn analyze(&self, _image: &[u8]) -> Result<OcrDocument, ReceiptError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(OcrDocument::default())
    }
}

/// Times out for files whose bytes contain `STALL`, answers otherwise.
pub struct SelectiveBackend {
    pub text: String,
}

#[async_trait]
impl OcrBackend for SelectiveBackend {
    fn name(&self) -> &str {
        "selective"
    }

    async fn analyze(&self, image: &[u8]) -> Result<OcrDocument, ReceiptError> {
        if image.windows(5).any(|w| w == b"STALL") {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        Ok(OcrDocument::from_text(&self.text))
    }
}

/// Panics on every call, counting calls first.
pub struct PanickingBackend {
    pub calls: AtomicUsize,
}

#[async_trait]
impl OcrBackend for PanickingBackend {
    fn name(&self) -> &str {
        "panicking"
    }

    async fn analyze(&self, _image: &[u8]) -> Result<OcrDocument, ReceiptError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        panic!("backend bug");
    }
}

pub fn processor(backend: Arc<dyn OcrBackend>, ledger_path: &Path) -> Processor {
    Processor::new(
        backend,
        Ledger::open(ledger_path),
        ProcessorConfig {
            ocr_timeout: Duration::from_millis(200),
            ..Default::default()
        },
    )
}

pub fn replay_processor(ledger_path: &Path) -> Processor {
    processor(Arc::new(ReplayBackend::new(fixture_path())), ledger_path)
}
