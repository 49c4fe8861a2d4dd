//! receipt-ingest: OCR backends that turn receipt images into `OcrDocument`s.

pub mod backend;
pub mod replay;
pub mod response;
pub mod sigv4;
pub mod textract;

pub use backend::OcrBackend;
pub use replay::ReplayBackend;
pub use response::{AnalyzeExpenseResponse, parse_analyze_expense};
pub use sigv4::Credentials;
pub use textract::TextractBackend;
