//! Normalizers from matched receipt tokens to typed values.
//!
//! Output formats are fixed by `record`: dates `YYYY-MM-DD`, times 24-hour
//! `HH:MM`, amounts with two decimals.

use chrono::{NaiveDate, NaiveTime};

/// Month number from an English month name or its three-letter abbreviation.
pub fn month_from_name(s: &str) -> Option<u32> {
    const MONTHS: [&str; 12] = [
        "january",
        "february",
        "march",
        "april",
        "may",
        "june",
        "july",
        "august",
        "september",
        "october",
        "november",
        "december",
    ];
    let s = s.trim().trim_end_matches('.').to_lowercase();
    if s.len() < 3 {
        return None;
    }
    MONTHS
        .iter()
        .position(|full| *full == s || full[..3] == s || (s == "sept" && *full == "september"))
        .map(|i| i as u32 + 1)
}

/// A calendar date from numeric parts, or `None` if the date does not exist.
pub fn date_from_parts(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day)
}

/// `a/b/year` where the order of day and month is unknown.
///
/// Read month-first (`MM/DD`), unless the first number cannot be a month.
pub fn date_from_numeric(a: u32, b: u32, year: i32) -> Option<NaiveDate> {
    if a > 12 {
        date_from_parts(year, b, a)
    } else {
        date_from_parts(year, a, b)
    }
}

/// Two-digit years are taken as 20YY.
pub fn expand_year(y: i32) -> i32 {
    if y < 100 { 2000 + y } else { y }
}

/// Time of day from a matched clock token.
///
/// With a meridiem (`AM`, `p.m.`, ...) the hour must be 1-12; without one it
/// is read as 24-hour. Seconds are validated and then dropped.
pub fn time_of_day(
    hour: u32,
    minute: u32,
    second: Option<u32>,
    meridiem: Option<&str>,
) -> Option<NaiveTime> {
    if minute > 59 || second.is_some_and(|s| s > 59) {
        return None;
    }

    let hour = match meridiem.map(meridiem_is_pm) {
        Some(is_pm) => {
            if !(1..=12).contains(&hour) {
                return None;
            }
            match (hour, is_pm) {
                (12, false) => 0,
                (12, true) => 12,
                (h, true) => h + 12,
                (h, false) => h,
            }
        }
        None => hour,
    };

    NaiveTime::from_hms_opt(hour, minute, 0)
}

fn meridiem_is_pm(m: &str) -> bool {
    m.trim_start().to_ascii_lowercase().starts_with('p')
}

/// Currency amount from a token such as `$1,234.50`, `AED 12`, or `12,34`.
///
/// Symbols, codes and thousands separators are dropped. A comma is a decimal
/// separator only when it is the last separator and is followed by exactly
/// two digits with no dot present, or when it follows the last dot. Dots
/// alone in strict groups of three (`12.345`) are thousands separators.
pub fn amount(raw: &str) -> Option<f64> {
    let s: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
        .collect();
    let s = s.trim_matches(|c| c == ',' || c == '.');
    if !s.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let normalized = match (s.rfind('.'), s.rfind(',')) {
        (Some(dot), Some(comma)) if comma > dot => s.replace('.', "").replace(',', "."),
        (Some(_), None) if is_grouped(s, '.') => s.replace('.', ""),
        (Some(_), _) => s.replace(',', ""),
        (None, Some(comma)) if s.matches(',').count() == 1 && s.len() - comma - 1 == 2 => {
            s.replace(',', ".")
        }
        (None, Some(_)) => s.replace(',', ""),
        (None, None) => s.to_string(),
    };

    let value: f64 = normalized.parse().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    Some((value * 100.0).round() / 100.0)
}

/// `1.234.567`: a 1-3 digit head, then only 3-digit groups.
fn is_grouped(s: &str, sep: char) -> bool {
    let mut parts = s.split(sep);
    let head_ok = parts.next().is_some_and(|h| (1..=3).contains(&h.len()));
    let mut groups = 0;
    for group in parts {
        if group.len() != 3 {
            return false;
        }
        groups += 1;
    }
    head_ok && groups > 0
}
