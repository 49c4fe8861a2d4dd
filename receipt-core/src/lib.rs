//! receipt-core: receipt records, OCR documents, and the field extraction rules

pub mod error;
pub mod normalize;
pub mod ocr;
pub mod record;
pub mod rules;

pub use error::ReceiptError;
pub use ocr::{LabeledField, OcrDocument};
pub use record::{LEDGER_HEADER, LedgerRow, ReceiptFields, ReceiptRecord};
pub use rules::{Field, FieldRule, Pick, Value, extract_fields};
