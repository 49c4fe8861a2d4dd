//! AWS Textract `AnalyzeExpense` response shape and its conversion to an `OcrDocument`.
//!
//! Only the parts the extractor reads are modeled; everything else is ignored.

use receipt_core::{LabeledField, OcrDocument, ReceiptError};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AnalyzeExpenseResponse {
    #[serde(default)]
    pub expense_documents: Vec<ExpenseDocument>,
    /// Older responses carried blocks at the top level
    #[serde(default)]
    pub blocks: Vec<Block>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExpenseDocument {
    #[serde(default)]
    pub summary_fields: Vec<ExpenseField>,
    #[serde(default)]
    pub line_item_groups: Vec<LineItemGroup>,
    #[serde(default)]
    pub blocks: Vec<Block>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExpenseField {
    #[serde(rename = "Type")]
    pub field_type: Option<Detection>,
    pub value_detection: Option<Detection>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Detection {
    pub text: Option<String>,
    pub confidence: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LineItemGroup {
    #[serde(default)]
    pub line_items: Vec<LineItem>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LineItem {
    #[serde(default)]
    pub line_item_expense_fields: Vec<ExpenseField>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Block {
    pub block_type: Option<String>,
    pub text: Option<String>,
}

impl ExpenseField {
    fn value_text(&self) -> Option<&str> {
        self.value_detection
            .as_ref()?
            .text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

impl AnalyzeExpenseResponse {
    /// Flatten into document-ordered lines plus typed summary fields.
    ///
    /// Line order: summary values, line-item values, then `LINE` blocks whose
    /// text was not already collected.
    pub fn into_document(self) -> OcrDocument {
        fn push_line(lines: &mut Vec<String>, text: &str, dedup: bool) {
            if dedup && lines.iter().any(|l| l == text) {
                return;
            }
            lines.push(text.to_string());
        }

        let mut doc = OcrDocument::default();

        let top_blocks = self.blocks;
        let mut blocks = Vec::new();

        for expense in self.expense_documents {
            for field in &expense.summary_fields {
                let Some(value) = field.value_text() else {
                    continue;
                };
                push_line(&mut doc.lines, value, false);

                if let Some(label) = field.field_type.as_ref().and_then(|t| t.text.as_deref()) {
                    let confidence = field
                        .value_detection
                        .as_ref()
                        .and_then(|v| v.confidence)
                        .or_else(|| field.field_type.as_ref().and_then(|t| t.confidence))
                        .unwrap_or(0.0);
                    doc.fields.push(LabeledField {
                        label: label.to_string(),
                        value: value.to_string(),
                        confidence,
                    });
                }
            }

            for group in &expense.line_item_groups {
                for item in &group.line_items {
                    for field in &item.line_item_expense_fields {
                        if let Some(value) = field.value_text() {
                            push_line(&mut doc.lines, value, false);
                        }
                    }
                }
            }

            blocks.extend(expense.blocks);
        }

        blocks.extend(top_blocks);
        for block in blocks {
            if block.block_type.as_deref() != Some("LINE") {
                continue;
            }
            if let Some(text) = block.text.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
                push_line(&mut doc.lines, text, true);
            }
        }

        doc
    }
}

/// Parse a raw `AnalyzeExpense` JSON body.
pub fn parse_analyze_expense(body: &str) -> Result<OcrDocument, ReceiptError> {
    let resp: AnalyzeExpenseResponse = serde_json::from_str(body)
        .map_err(|e| ReceiptError::ocr(format!("malformed AnalyzeExpense response: {e}")))?;
    Ok(resp.into_document())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn fixture_path() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .parent()
            .unwrap()
            .join("fixtures")
            .join("analyze_expense_coffee.json")
    }

    #[test]
    fn test_parse_fixture_response() {
        let body = std::fs::read_to_string(fixture_path()).unwrap();
        let doc = parse_analyze_expense(&body).unwrap();

        // summary values lead, in response order
        assert_eq!(doc.lines[0], "COFFEE SHOP DOWNTOWN");
        assert_eq!(doc.lines[1], "$15.47");
        assert_eq!(doc.lines[2], "2024-09-24");
        assert!(doc.lines.iter().any(|l| l == "Large Coffee"));
        assert!(doc.lines.iter().any(|l| l.contains("10:15 AM")));

        let totals = doc.fields_labeled("TOTAL");
        assert_eq!(totals.len(), 1);
        assert_eq!(totals[0].value, "$15.47");
        assert!(totals[0].confidence > 99.0);
    }

    #[test]
    fn test_line_blocks_are_deduplicated_against_collected_text() {
        let body = r#"{
            "ExpenseDocuments": [{
                "SummaryFields": [
                    {"Type": {"Text": "TOTAL", "Confidence": 98.0},
                     "ValueDetection": {"Text": "$9.99", "Confidence": 97.5}}
                ],
                "Blocks": [
                    {"BlockType": "LINE", "Text": "$9.99"},
                    {"BlockType": "WORD", "Text": "ignored"},
                    {"BlockType": "LINE", "Text": "Thank you"}
                ]
            }]
        }"#;
        let doc = parse_analyze_expense(body).unwrap();
        assert_eq!(doc.lines, vec!["$9.99", "Thank you"]);
        assert_eq!(doc.fields[0].confidence, 97.5);
    }

    #[test]
    fn test_empty_response_is_an_empty_document() {
        let doc = parse_analyze_expense("{}").unwrap();
        assert!(doc.is_empty());
    }

    #[test]
    fn test_malformed_json_is_an_ocr_error() {
        let err = parse_analyze_expense("<html>gateway</html>").unwrap_err();
        assert!(matches!(err, ReceiptError::OcrService(_)));
    }
}
