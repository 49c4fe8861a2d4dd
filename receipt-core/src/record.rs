//! Receipt record types and their single CSV representation.

use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Ledger column order. Written once at the top of a new ledger.
pub const LEDGER_HEADER: [&str; 6] = [
    "date",
    "start_time",
    "end_time",
    "total",
    "source_file",
    "processed_at",
];

/// Output formats of the normalized fields
pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M";

/// The four values pulled out of OCR text. Each is independently optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReceiptFields {
    pub date: Option<NaiveDate>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    /// Amount in the receipt's currency, two decimals when rendered
    pub total: Option<f64>,
}

impl ReceiptFields {
    /// Number of fields that were found
    pub fn found_count(&self) -> usize {
        [
            self.date.is_some(),
            self.start_time.is_some(),
            self.end_time.is_some(),
            self.total.is_some(),
        ]
        .iter()
        .filter(|f| **f)
        .count()
    }
}

/// One processed receipt image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptRecord {
    pub fields: ReceiptFields,
    /// File name of the originating image
    pub source_file: String,
    pub processed_at: DateTime<Utc>,
}

/// A ledger line as text, in `LEDGER_HEADER` order. Missing values are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRow {
    pub date: String,
    pub start_time: String,
    pub end_time: String,
    pub total: String,
    pub source_file: String,
    pub processed_at: String,
}

impl ReceiptRecord {
    pub fn new(
        fields: ReceiptFields,
        source_file: impl Into<String>,
        processed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            fields,
            source_file: source_file.into(),
            processed_at,
        }
    }

    pub fn to_row(&self) -> LedgerRow {
        let f = &self.fields;
        LedgerRow {
            date: f.date.map(|d| d.format(DATE_FORMAT).to_string()).unwrap_or_default(),
            start_time: f
                .start_time
                .map(|t| t.format(TIME_FORMAT).to_string())
                .unwrap_or_default(),
            end_time: f
                .end_time
                .map(|t| t.format(TIME_FORMAT).to_string())
                .unwrap_or_default(),
            total: f.total.map(format_amount).unwrap_or_default(),
            source_file: self.source_file.clone(),
            processed_at: format_timestamp(self.processed_at),
        }
    }
}

/// Render an amount with exactly two decimals.
pub fn format_amount(amount: f64) -> String {
    format!("{amount:.2}")
}

/// RFC 3339 in UTC with second precision, e.g. `2024-03-14T09:30:00Z`.
pub fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}
