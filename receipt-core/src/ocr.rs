//! Intermediate OCR result handed from a backend to the extractor.

use serde::{Deserialize, Serialize};

/// A typed value the OCR backend recognized on its own (e.g. `TOTAL`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledField {
    pub label: String,
    pub value: String,
    /// Backend confidence, 0-100.
    pub confidence: f32,
}

/// Recognized text of one receipt, consumed once to build a record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OcrDocument {
    /// Text lines in document order
    pub lines: Vec<String>,
    pub fields: Vec<LabeledField>,
}

impl OcrDocument {
    /// Build a document from raw text, one entry per non-blank line.
    pub fn from_text(text: &str) -> Self {
        Self {
            lines: text
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect(),
            fields: Vec::new(),
        }
    }

    pub fn with_field(mut self, label: &str, value: &str, confidence: f32) -> Self {
        self.fields.push(LabeledField {
            label: label.to_string(),
            value: value.to_string(),
            confidence,
        });
        self
    }

    /// All lines joined with newlines, for pattern matching.
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    /// Labeled fields with the given label, highest confidence first.
    pub fn fields_labeled(&self, label: &str) -> Vec<&LabeledField> {
        let mut out: Vec<&LabeledField> = self
            .fields
            .iter()
            .filter(|f| f.label.eq_ignore_ascii_case(label))
            .collect();
        // stable: equal confidence keeps document order
        out.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        out
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty() && self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_text_skips_blank_lines() {
        let doc = OcrDocument::from_text("\n  COFFEE SHOP  \n\nTotal: $4.50\n");
        assert_eq!(doc.lines, vec!["COFFEE SHOP", "Total: $4.50"]);
        assert_eq!(doc.text(), "COFFEE SHOP\nTotal: $4.50");
    }

    #[test]
    fn test_fields_labeled_orders_by_confidence() {
        let doc = OcrDocument::default()
            .with_field("TOTAL", "$3.00", 60.0)
            .with_field("VENDOR_NAME", "ACME", 99.0)
            .with_field("total", "$15.47", 99.9);
        let totals = doc.fields_labeled("TOTAL");
        assert_eq!(totals.len(), 2);
        assert_eq!(totals[0].value, "$15.47");
        assert_eq!(totals[1].value, "$3.00");
    }
}
