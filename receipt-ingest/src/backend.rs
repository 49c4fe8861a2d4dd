use async_trait::async_trait;
use receipt_core::{OcrDocument, ReceiptError};

/// A remote or local OCR capability: image bytes in, recognized text out.
///
/// Implementations hold no per-call state. Failures are reported as
/// `ReceiptError::OcrService`; retrying is up to the caller.
#[async_trait]
pub trait OcrBackend: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    async fn analyze(&self, image: &[u8]) -> Result<OcrDocument, ReceiptError>;
}
