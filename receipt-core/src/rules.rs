//! Ordered pattern -> normalizer rules that turn OCR text into receipt fields.
//!
//! Each field is searched independently. Typed fields reported by the OCR
//! backend are tried first (highest confidence wins); then the text rules
//! for that field run in table order. A rule yields the first match in
//! document order that normalizes, except `Pick::Largest` fallbacks.
//! Nothing here fails: a field with no usable match stays empty.

use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveTime};
use regex::{Captures, Regex};

use crate::normalize;
use crate::ocr::OcrDocument;
use crate::record::ReceiptFields;

/// Which receipt value a rule produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Date,
    /// Start time, optionally with an end time
    Times,
    Total,
}

/// How a rule chooses among several matches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pick {
    /// First match in document order that normalizes
    First,
    /// First two normalized matches become start and end
    Pair,
    /// Largest normalized amount
    Largest,
}

/// A normalized value produced by a rule
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Date(NaiveDate),
    Times(NaiveTime, Option<NaiveTime>),
    Total(f64),
}

pub struct FieldRule {
    pub name: &'static str,
    pub field: Field,
    pub pick: Pick,
    pub pattern: Regex,
    normalize: fn(&Captures) -> Option<Value>,
}

impl std::fmt::Debug for FieldRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldRule")
            .field("name", &self.name)
            .field("field", &self.field)
            .field("pick", &self.pick)
            .field("pattern", &self.pattern.as_str())
            .finish()
    }
}

impl FieldRule {
    fn new(
        name: &'static str,
        field: Field,
        pick: Pick,
        pattern: &str,
        normalize: fn(&Captures) -> Option<Value>,
    ) -> Self {
        Self {
            name,
            field,
            pick,
            pattern: Regex::new(pattern).unwrap(),
            normalize,
        }
    }

    /// Run this rule alone over `text`.
    pub fn apply(&self, text: &str) -> Option<Value> {
        let mut values = self
            .pattern
            .captures_iter(text)
            .filter_map(|caps| (self.normalize)(&caps));

        match self.pick {
            Pick::First => values.next(),
            Pick::Pair => {
                let first = values.next()?;
                let second = values.next();
                match (first, second) {
                    (Value::Times(start, _), Some(Value::Times(end, _))) => {
                        Some(Value::Times(start, Some(end)))
                    }
                    (first, _) => Some(first),
                }
            }
            Pick::Largest => values.reduce(|best, v| match (best, v) {
                (Value::Total(a), Value::Total(b)) if b > a => v,
                _ => best,
            }),
        }
    }
}

const MONTH: &str = r"(?P<month>jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?)\b";
/// `tail` captures a digit run that continues past the amount; such matches are rejected.
const AMOUNT: &str = r"(?P<amt>\d{1,3}(?:,\d{3})+(?:\.\d{1,2})?|\d{1,3}(?:\.\d{3})+(?:,\d{1,2})?|\d+(?:[.,]\d{1,2})?)(?P<tail>[.,]?\d)?";
const CURRENCY_CODE: &str = r"(?:AED|USD|EUR|GBP)";

/// A clock token with group names suffixed by `n`, so two can share a pattern.
fn clock(n: &str) -> String {
    format!(
        r"\b(?P<h{n}>\d{{1,2}}):(?P<m{n}>\d{{2}})(?::(?P<s{n}>\d{{2}}))?(?:\s*(?P<mer{n}>[ap]\.?\s?m\b\.?))?"
    )
}

static RULES: LazyLock<Vec<FieldRule>> = LazyLock::new(|| {
    vec![
        // --- Date ---
        FieldRule::new(
            "date_iso",
            Field::Date,
            Pick::First,
            r"\b(?P<y>\d{4})[/-](?P<m>\d{1,2})[/-](?P<d>\d{1,2})\b",
            |c| {
                normalize::date_from_parts(num(c, "y")?, num(c, "m")?, num(c, "d")?)
                    .map(Value::Date)
            },
        ),
        FieldRule::new(
            "date_numeric",
            Field::Date,
            Pick::First,
            r"\b(?P<a>\d{1,2})[/.-](?P<b>\d{1,2})[/.-](?P<y>\d{4})\b",
            numeric_date,
        ),
        FieldRule::new(
            "date_day_month_name",
            Field::Date,
            Pick::First,
            &format!(r"(?i)\b(?P<d>\d{{1,2}})(?:st|nd|rd|th)?[\s-]+{MONTH}\.?,?[\s-]+(?P<y>\d{{4}})\b"),
            named_month_date,
        ),
        FieldRule::new(
            "date_month_name_day",
            Field::Date,
            Pick::First,
            &format!(r"(?i)\b{MONTH}\.?\s+(?P<d>\d{{1,2}})(?:st|nd|rd|th)?,?\s+(?P<y>\d{{4}})\b"),
            named_month_date,
        ),
        FieldRule::new(
            "date_short_year",
            Field::Date,
            Pick::First,
            r"\b(?P<a>\d{1,2})[/.-](?P<b>\d{1,2})[/.-](?P<y>\d{2})\b",
            numeric_date,
        ),
        // --- Times ---
        FieldRule::new(
            "time_range",
            Field::Times,
            Pick::First,
            &format!(r"(?i){}\s*(?:-|\x{{2013}}|to|until)\s*{}", clock("1"), clock("2")),
            |c| {
                let start = clock_value(c, "1")?;
                let end = clock_value(c, "2")?;
                Some(Value::Times(start, Some(end)))
            },
        ),
        FieldRule::new(
            "time_tokens",
            Field::Times,
            Pick::Pair,
            &format!(r"(?i){}", clock("1")),
            |c| clock_value(c, "1").map(|t| Value::Times(t, None)),
        ),
        // --- Total ---
        FieldRule::new(
            "total_grand",
            Field::Total,
            Pick::First,
            &format!(r"(?i)\bgrand\s+total\b\s*[:\-]?\s*(?:{CURRENCY_CODE}\s*)?[$€£]?\s*{AMOUNT}"),
            total_value,
        ),
        FieldRule::new(
            "total_labeled",
            Field::Total,
            Pick::First,
            &format!(
                r"(?i)\b(?:total|amount\s+due|balance\s+due|amount\s+paid)\b\s*[:\-]?\s*(?:{CURRENCY_CODE}\s*)?[$€£]?\s*{AMOUNT}"
            ),
            total_value,
        ),
        FieldRule::new(
            "total_code_before",
            Field::Total,
            Pick::First,
            &format!(r"(?i)\b{CURRENCY_CODE}\s*[$€£]?\s*{AMOUNT}"),
            total_value,
        ),
        FieldRule::new(
            "total_code_after",
            Field::Total,
            Pick::First,
            &format!(r"(?i){AMOUNT}\s*{CURRENCY_CODE}\b"),
            total_value,
        ),
        FieldRule::new(
            "total_largest_amount",
            Field::Total,
            Pick::Largest,
            r"(?P<amt>\d{1,3}(?:,\d{3})+\.\d{2}|\d{1,3}(?:\.\d{3})+,\d{2}|\d+\.\d{2})(?P<tail>[.,]?\d)?",
            total_value,
        ),
    ]
});

static BARE_AMOUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"[$€£]?\s*{AMOUNT}")).unwrap());

/// OCR field labels trusted for each target, in order of preference
const DATE_LABELS: &[&str] = &["INVOICE_RECEIPT_DATE"];
const TOTAL_LABELS: &[&str] = &["TOTAL", "AMOUNT_PAID"];

/// The full rule table, in evaluation order.
pub fn rules() -> &'static [FieldRule] {
    &RULES
}

/// Look up a rule by name.
pub fn rule(name: &str) -> Option<&'static FieldRule> {
    RULES.iter().find(|r| r.name == name)
}

/// Extract the four receipt fields from an OCR document.
pub fn extract_fields(doc: &OcrDocument) -> ReceiptFields {
    let text = doc.text();

    let date = labeled(doc, DATE_LABELS, |v| match first_rule_value(Field::Date, v) {
        Some(Value::Date(d)) => Some(d),
        _ => None,
    })
    .or_else(|| match first_rule_value(Field::Date, &text) {
        Some(Value::Date(d)) => Some(d),
        _ => None,
    });

    let (start_time, end_time) = match first_rule_value(Field::Times, &text) {
        Some(Value::Times(start, end)) => (Some(start), end),
        _ => (None, None),
    };

    let total = labeled(doc, TOTAL_LABELS, parse_amount_token).or_else(|| {
        match first_rule_value(Field::Total, &text) {
            Some(Value::Total(t)) => Some(t),
            _ => None,
        }
    });

    ReceiptFields {
        date,
        start_time,
        end_time,
        total,
    }
}

/// First amount-shaped token in `s`, normalized.
pub fn parse_amount_token(s: &str) -> Option<f64> {
    BARE_AMOUNT
        .captures_iter(s)
        .find_map(|c| whole_amount(&c))
}

fn first_rule_value(field: Field, text: &str) -> Option<Value> {
    RULES
        .iter()
        .filter(|r| r.field == field)
        .find_map(|r| r.apply(text))
}

fn labeled<T>(doc: &OcrDocument, labels: &[&str], parse: impl Fn(&str) -> Option<T>) -> Option<T> {
    labels
        .iter()
        .flat_map(|label| doc.fields_labeled(label))
        .find_map(|f| parse(&f.value))
}

fn num<T: std::str::FromStr>(c: &Captures, name: &str) -> Option<T> {
    c.name(name)?.as_str().parse().ok()
}

fn numeric_date(c: &Captures) -> Option<Value> {
    let year = normalize::expand_year(num(c, "y")?);
    normalize::date_from_numeric(num(c, "a")?, num(c, "b")?, year).map(Value::Date)
}

fn named_month_date(c: &Captures) -> Option<Value> {
    let month = normalize::month_from_name(c.name("month")?.as_str())?;
    normalize::date_from_parts(num(c, "y")?, month, num(c, "d")?).map(Value::Date)
}

fn clock_value(c: &Captures, n: &str) -> Option<NaiveTime> {
    normalize::time_of_day(
        num(c, &format!("h{n}"))?,
        num(c, &format!("m{n}"))?,
        c.name(&format!("s{n}")).and_then(|s| s.as_str().parse().ok()),
        c.name(&format!("mer{n}")).map(|m| m.as_str()),
    )
}

fn total_value(c: &Captures) -> Option<Value> {
    whole_amount(c).map(Value::Total)
}

/// The matched amount, unless the digits run on past it (`12.345`, or the
/// `24.09` of `24.09.2024`).
fn whole_amount(c: &Captures) -> Option<f64> {
    if c.name("tail").is_some() {
        return None;
    }
    normalize::amount(c.name("amt")?.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{ReceiptRecord, format_amount};
    use chrono::Utc;

    fn fields(text: &str) -> ReceiptFields {
        extract_fields(&OcrDocument::from_text(text))
    }

    fn date(y: i32, m: u32, d: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(y, m, d)
    }

    fn time(h: u32, m: u32) -> Option<NaiveTime> {
        NaiveTime::from_hms_opt(h, m, 0)
    }

    #[test]
    fn test_every_rule_compiles_and_names_are_unique() {
        let mut names: Vec<_> = rules().iter().map(|r| r.name).collect();
        let n = names.len();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), n);
    }

    #[test]
    fn test_total_with_dollar_sign() {
        let f = fields("COFFEE SHOP\nSubtotal: $11.00\nTax: $1.34\nTotal: $12.34");
        assert_eq!(f.total.map(format_amount).as_deref(), Some("12.34"));
    }

    #[test]
    fn test_us_date_is_normalized() {
        let f = fields("Visit on 03/14/2024 thank you");
        assert_eq!(f.date, date(2024, 3, 14));
    }

    #[test]
    fn test_no_time_tokens_leaves_times_empty() {
        let f = fields("STORE 12\n03/14/2024\nTOTAL 5.00");
        assert_eq!(f.start_time, None);
        assert_eq!(f.end_time, None);
        assert_eq!(f.date, date(2024, 3, 14));
        assert_eq!(f.total, Some(5.0));
    }

    #[test]
    fn test_date_rules_individually() {
        let cases = [
            ("date_iso", "Date: 2024/09/24", date(2024, 9, 24)),
            ("date_numeric", "24.09.2024", date(2024, 9, 24)),
            ("date_numeric", "31-01-2024", date(2024, 1, 31)),
            ("date_day_month_name", "14 March 2024", date(2024, 3, 14)),
            ("date_day_month_name", "14-Mar-2024", date(2024, 3, 14)),
            ("date_month_name_day", "Sept 3rd, 2023", date(2023, 9, 3)),
            ("date_short_year", "03/14/24", date(2024, 3, 14)),
        ];
        for (name, text, expected) in cases {
            let got = rule(name).unwrap().apply(text);
            assert_eq!(got, expected.map(Value::Date), "{name} on {text:?}");
        }
    }

    #[test]
    fn test_impossible_date_is_skipped_for_next_match() {
        let f = fields("Ref 02/30/2024\nDate 02/28/2024");
        assert_eq!(f.date, date(2024, 2, 28));
    }

    #[test]
    fn test_time_range_wins_over_loose_tokens() {
        let f = fields("Printed 08:01\nParking 10:30 AM - 11:15 AM");
        assert_eq!(f.start_time, time(10, 30));
        assert_eq!(f.end_time, time(11, 15));
    }

    #[test]
    fn test_time_range_with_to() {
        let f = fields("Session 9:00pm to 11:45 pm");
        assert_eq!(f.start_time, time(21, 0));
        assert_eq!(f.end_time, time(23, 45));
    }

    #[test]
    fn test_first_two_times_are_start_and_end() {
        let f = fields("IN 14:00\nOUT 15:30:12\nPRINTED 15:31");
        assert_eq!(f.start_time, time(14, 0));
        assert_eq!(f.end_time, time(15, 30));
    }

    #[test]
    fn test_single_time_is_start_only() {
        let f = fields("Time: 7:05 p.m.");
        assert_eq!(f.start_time, time(19, 5));
        assert_eq!(f.end_time, None);
    }

    #[test]
    fn test_meridiem_does_not_swallow_words() {
        let f = fields("10:30 Amount 4.00");
        assert_eq!(f.start_time, time(10, 30));
    }

    #[test]
    fn test_invalid_clock_values_are_ignored() {
        let f = fields("Code 99:99\nEntry 25:10");
        assert_eq!(f.start_time, None);
    }

    #[test]
    fn test_grand_total_beats_total() {
        let f = fields("Total 10.00\nGRAND TOTAL: 11.50");
        assert_eq!(f.total, Some(11.5));
    }

    #[test]
    fn test_currency_code_totals() {
        assert_eq!(fields("Paid AED 1,250.75 by card").total, Some(1250.75));
        assert_eq!(fields("Paid 89.75 AED").total, Some(89.75));
    }

    #[test]
    fn test_total_tax_line_is_not_the_total() {
        let f = fields("Total Tax: $2.00\nTotal: $22.00");
        assert_eq!(f.total, Some(22.0));
    }

    #[test]
    fn test_dot_grouped_total_is_read_whole() {
        assert_eq!(fields("Total: 1.234,56 EUR").total, Some(1234.56));
        assert_eq!(fields("TOTAL 12.345").total, Some(12345.0));
    }

    #[test]
    fn test_amount_running_into_more_digits_is_rejected() {
        assert_eq!(rule("total_labeled").unwrap().apply("Total 12.345.6"), None);
        assert_eq!(parse_amount_token("12.34.5"), None);
        assert_eq!(parse_amount_token("$12.34."), Some(12.34));
    }

    #[test]
    fn test_dotted_date_is_not_a_total() {
        let f = fields("Date 24.09.2024\nCoffee 4.50");
        assert_eq!(f.date, date(2024, 9, 24));
        assert_eq!(f.total, Some(4.5));
    }

    #[test]
    fn test_largest_amount_fallback() {
        let f = fields("Latte 4.50\nMuffin 3.25\nCard 7.75");
        assert_eq!(f.total, Some(7.75));
    }

    #[test]
    fn test_labeled_fields_take_precedence() {
        let doc = OcrDocument::from_text("Total: $3.00\n01/01/2020")
            .with_field("TOTAL", "$15.47", 99.9)
            .with_field("INVOICE_RECEIPT_DATE", "2024-09-24", 95.1);
        let f = extract_fields(&doc);
        assert_eq!(f.total, Some(15.47));
        assert_eq!(f.date, date(2024, 9, 24));
    }

    #[test]
    fn test_unparseable_labeled_field_falls_back_to_text() {
        let doc = OcrDocument::from_text("Total: $3.00").with_field("TOTAL", "see below", 99.0);
        assert_eq!(extract_fields(&doc).total, Some(3.0));
    }

    #[test]
    fn test_empty_document_yields_empty_record() {
        let f = extract_fields(&OcrDocument::default());
        assert_eq!(f, ReceiptFields::default());
        let row = ReceiptRecord::new(f, "x.png", Utc::now()).to_row();
        assert!(row.total.is_empty());
    }
}
