use std::path::PathBuf;
use thiserror::Error;

/// Failure taxonomy for processing a single receipt image.
///
/// A partially extracted record is not an error: missing fields are left empty.
#[derive(Debug, Error)]
pub enum ReceiptError {
    /// The input image is missing, unreadable, or not a supported image.
    #[error("invalid input {}: {reason}", path.display())]
    InvalidInput { path: PathBuf, reason: String },

    /// The OCR backend failed, timed out, or returned something unparseable.
    #[error("OCR service error: {0}")]
    OcrService(String),

    /// The ledger could not be created or appended to.
    #[error("cannot write ledger {}: {reason}", path.display())]
    OutputWrite { path: PathBuf, reason: String },
}

impl ReceiptError {
    pub fn invalid_input(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn ocr(reason: impl Into<String>) -> Self {
        Self::OcrService(reason.into())
    }

    pub fn output_write(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        Self::OutputWrite {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Short machine-friendly label, used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            ReceiptError::InvalidInput { .. } => "invalid_input",
            ReceiptError::OcrService(_) => "ocr_service",
            ReceiptError::OutputWrite { .. } => "output_write",
        }
    }
}
