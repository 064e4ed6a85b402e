use std::collections::BTreeSet;

use chrono::NaiveDate;

use crate::domain::{DerivedRule, FieldValue, Fields};

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%d.%m.%Y",
    "%d %B %Y",
    "%d %b %Y",
    "%A %d %B %Y",
    "%a %d %b %Y",
    "%B %d, %Y",
];

fn column<'a>(fields: &'a Fields, rows: &str, field: &'a str) -> impl Iterator<Item = &'a str> {
    let rows = match fields.get(rows) {
        Some(FieldValue::Rows(rows)) => rows.as_slice(),
        _ => &[],
    };
    rows.iter()
        .filter_map(move |row| row.get(field).and_then(FieldValue::as_text))
}

/// Compute derived fields from the extracted rows and insert them.
pub fn derive_fields(fields: &mut Fields, rules: &[DerivedRule]) {
    for rule in rules {
        let value = match rule {
            DerivedRule::Count { rows, .. } => match fields.get(rows) {
                Some(FieldValue::Rows(rows)) => FieldValue::Count(rows.len() as u64),
                _ => FieldValue::Count(0),
            },
            DerivedRule::DistinctYears { rows, field, .. } => {
                FieldValue::Texts(distinct_years(column(fields, rows, field)))
            }
            DerivedRule::LatestDate { rows, field, .. } => {
                match latest_date(column(fields, rows, field)) {
                    Some(date) => FieldValue::Text(date.format("%Y-%m-%d").to_string()),
                    None => FieldValue::Null,
                }
            }
        };
        fields.insert(rule.name().to_string(), value);
    }
}

/// Sorted, de-duplicated four-digit years (1900-2099) mentioned in `values`.
pub fn distinct_years<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut years = BTreeSet::new();
    for value in values {
        let bytes = value.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            if !bytes[i].is_ascii_digit() {
                i += 1;
                continue;
            }
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            let digits = &value[start..i];
            if digits.len() == 4 && (digits.starts_with("19") || digits.starts_with("20")) {
                years.insert(digits.to_string());
            }
        }
    }
    years.into_iter().collect()
}

/// Drop ordinal suffixes: "1st May 2021" -> "1 May 2021".
fn strip_ordinals(raw: &str) -> String {
    raw.split_whitespace()
        .map(|word| {
            let digits = word.trim_end_matches(|c: char| c.is_ascii_alphabetic());
            let suffix = &word[digits.len()..];
            let is_ordinal = !digits.is_empty()
                && digits.chars().all(|c| c.is_ascii_digit())
                && matches!(suffix, "st" | "nd" | "rd" | "th");
            if is_ordinal {
                digits
            } else {
                word
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let cleaned = strip_ordinals(raw.trim());
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(&cleaned, fmt).ok())
}

/// Most recent parseable date in `values`.
pub fn latest_date<'a>(values: impl Iterator<Item = &'a str>) -> Option<NaiveDate> {
    values.filter_map(parse_date).max()
}
