//! Offline backend that answers every image with a saved OCR result.
//!
//! `.json` files are read as `AnalyzeExpense` responses; anything else is
//! taken as plain recognized text, one line per line.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use receipt_core::{OcrDocument, ReceiptError};
use tracing::debug;

use crate::backend::OcrBackend;
use crate::response::parse_analyze_expense;

#[derive(Debug, Clone)]
pub struct ReplayBackend {
    path: PathBuf,
}

impl ReplayBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl OcrBackend for ReplayBackend {
    fn name(&self) -> &str {
        "replay"
    }

    async fn analyze(&self, image: &[u8]) -> Result<OcrDocument, ReceiptError> {
        debug!(bytes = image.len(), path = %self.path.display(), "replaying saved OCR result");

        let body = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            ReceiptError::ocr(format!("read replay file {}: {e}", self.path.display()))
        })?;

        let is_json = self
            .path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));

        if is_json {
            parse_analyze_expense(&body)
        } else {
            Ok(OcrDocument::from_text(&body))
        }
    }
}
