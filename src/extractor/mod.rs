//! Selector-driven record extraction.
//!
//! Rules come from a [`DetailSpec`](crate::domain::DetailSpec) and are
//! compiled once per run. Everything here is synchronous: `scraper::Html`
//! is not `Send`, so a parsed document never lives across an `.await`.

mod derive;
mod listing;

pub use derive::{derive_fields, distinct_years, latest_date};
pub use listing::{cdx_request_url, parse_cdx, ListingEntry, ListingExtractor};

use scraper::{ElementRef, Html, Selector};

use crate::app::{Result, StandfastError};
use crate::domain::{DerivedRule, DetailSpec, FieldRule, FieldValue, Fields};

pub(crate) fn compile_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| {
        StandfastError::Config(format!("Invalid selector '{}': {}", selector, e))
    })
}

/// Collapse runs of whitespace and trim, so reformatted markup yields the
/// same text.
pub fn normalize_text(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn element_text(element: &ElementRef) -> String {
    normalize_text(&element.text().collect::<String>())
}

/// One [`FieldRule`] with its selectors parsed.
pub struct CompiledField {
    name: String,
    selector: Selector,
    attr: Option<String>,
    default: Option<String>,
    many: bool,
    rows: Vec<CompiledField>,
}

impl CompiledField {
    pub(crate) fn compile(rule: &FieldRule) -> Result<Self> {
        Ok(Self {
            name: rule.name.clone(),
            selector: compile_selector(&rule.selector)?,
            attr: rule.attr.clone(),
            default: rule.default.clone(),
            many: rule.many,
            rows: rule
                .rows
                .iter()
                .map(CompiledField::compile)
                .collect::<Result<Vec<_>>>()?,
        })
    }

    fn read(&self, element: &ElementRef) -> Option<String> {
        let value = match &self.attr {
            Some(attr) => element.value().attr(attr).map(normalize_text)?,
            None => element_text(element),
        };
        (!value.is_empty()).then_some(value)
    }

    /// `None` means nothing matched; defaults are applied by the caller.
    fn matched<'a, I>(&self, mut matches: I) -> Option<FieldValue>
    where
        I: Iterator<Item = ElementRef<'a>>,
    {
        if !self.rows.is_empty() {
            let rows: Vec<Fields> = matches.filter_map(|row| self.extract_row(&row)).collect();
            return Some(FieldValue::Rows(rows));
        }

        if self.many {
            let values: Vec<String> = matches.filter_map(|el| self.read(&el)).collect();
            return (!values.is_empty()).then_some(FieldValue::Texts(values));
        }

        matches.find_map(|el| self.read(&el)).map(FieldValue::Text)
    }

    /// Read this field from within `scope`.
    pub(crate) fn extract_in(&self, scope: &ElementRef) -> (String, FieldValue) {
        let value = self.matched(scope.select(&self.selector));
        (self.name.clone(), self.or_default(value))
    }

    fn or_default(&self, value: Option<FieldValue>) -> FieldValue {
        value.unwrap_or_else(|| match &self.default {
            Some(default) => FieldValue::Text(default.clone()),
            None => FieldValue::Null,
        })
    }

    /// A row with no matching nested field at all is dropped.
    fn extract_row(&self, row: &ElementRef) -> Option<Fields> {
        let mut any_matched = false;
        let mut fields = Fields::new();
        for nested in &self.rows {
            let value = nested.matched(row.select(&nested.selector));
            any_matched |= value.is_some();
            fields.insert(nested.name.clone(), nested.or_default(value));
        }
        any_matched.then_some(fields)
    }
}

pub struct Extractor {
    anchor: Option<(String, Selector)>,
    fields: Vec<CompiledField>,
    derived: Vec<DerivedRule>,
}

impl Extractor {
    pub fn new(spec: &DetailSpec) -> Result<Self> {
        let anchor = match &spec.anchor {
            Some(raw) => Some((raw.clone(), compile_selector(raw)?)),
            None => None,
        };

        Ok(Self {
            anchor,
            fields: spec
                .fields
                .iter()
                .map(CompiledField::compile)
                .collect::<Result<Vec<_>>>()?,
            derived: spec.derived.clone(),
        })
    }

    /// Extract every configured field plus derived fields.
    ///
    /// Fails with `Extraction` only when the anchor is missing; absent
    /// fields become their default or null.
    pub fn extract(&self, html: &str) -> Result<Fields> {
        let document = Html::parse_document(html);

        if let Some((raw, anchor)) = &self.anchor {
            if document.select(anchor).next().is_none() {
                return Err(StandfastError::Extraction(format!(
                    "anchor '{}' not found",
                    raw
                )));
            }
        }

        let mut fields = Fields::new();
        for field in &self.fields {
            let value = field.matched(document.select(&field.selector));
            fields.insert(field.name.clone(), field.or_default(value));
        }

        derive_fields(&mut fields, &self.derived);

        Ok(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROFILE: &str = r#"
<html><body>
  <div class="m-judge-profile">
    <h1 class="name">  Jane
        Doe </h1>
    <ul class="breeds"><li>Retriever (Golden)</li><li>Retriever (Flat Coated)</li></ul>
    <table>
      <tr><th>Date</th><th>Club</th></tr>
      <tr class="appt"><td class="date">12/05/2019</td><td class="club">Leeds CS</td></tr>
      <tr class="appt"><td class="date">03/09/2022</td><td class="club">Crufts</td></tr>
      <tr class="appt"><td class="date">21/01/2019</td><td class="club"></td></tr>
    </table>
    <a class="site" href="/judge/jane">profile</a>
  </div>
</body></html>
"#;

    fn spec() -> DetailSpec {
        DetailSpec {
            mode: Default::default(),
            anchor: Some(".m-judge-profile".into()),
            fields: vec![
                FieldRule::text("judge_name", "h1.name"),
                FieldRule::text("location", ".region").with_default("unknown"),
                FieldRule::text("link", "a.site").with_attr("href"),
                FieldRule {
                    many: true,
                    ..FieldRule::text("breeds", "ul.breeds li")
                },
                FieldRule::rows(
                    "appointments",
                    "tr",
                    vec![
                        FieldRule::text("date", "td.date"),
                        FieldRule::text("club", "td.club").with_default("N/A"),
                    ],
                ),
            ],
            derived: vec![
                DerivedRule::Count {
                    name: "appointment_count".into(),
                    rows: "appointments".into(),
                },
                DerivedRule::DistinctYears {
                    name: "years_active".into(),
                    rows: "appointments".into(),
                    field: "date".into(),
                },
                DerivedRule::LatestDate {
                    name: "last_appointment".into(),
                    rows: "appointments".into(),
                    field: "date".into(),
                },
            ],
        }
    }

    #[test]
    fn test_extract_profile() {
        let extractor = Extractor::new(&spec()).unwrap();
        let fields = extractor.extract(PROFILE).unwrap();

        assert_eq!(fields["judge_name"], FieldValue::Text("Jane Doe".into()));
        assert_eq!(fields["location"], FieldValue::Text("unknown".into()));
        assert_eq!(fields["link"], FieldValue::Text("/judge/jane".into()));
        assert_eq!(
            fields["breeds"],
            FieldValue::Texts(vec![
                "Retriever (Golden)".into(),
                "Retriever (Flat Coated)".into()
            ])
        );

        let FieldValue::Rows(rows) = &fields["appointments"] else {
            panic!("appointments should be rows");
        };
        // header row has no td and is dropped
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0]["club"], FieldValue::Text("Leeds CS".into()));
        assert_eq!(rows[2]["club"], FieldValue::Text("N/A".into()));

        assert_eq!(fields["appointment_count"], FieldValue::Count(3));
        assert_eq!(
            fields["years_active"],
            FieldValue::Texts(vec!["2019".into(), "2022".into()])
        );
        assert_eq!(
            fields["last_appointment"],
            FieldValue::Text("2022-09-03".into())
        );
    }

    #[test]
    fn test_missing_anchor_is_extraction_error() {
        let extractor = Extractor::new(&spec()).unwrap();
        let err = extractor
            .extract("<html><body><p>Service unavailable</p></body></html>")
            .unwrap_err();
        assert_eq!(err.kind(), "ExtractionError");
    }

    #[test]
    fn test_missing_fields_degrade_to_null() {
        let extractor = Extractor::new(&DetailSpec {
            anchor: None,
            ..spec()
        })
        .unwrap();
        let fields = extractor.extract("<html><body></body></html>").unwrap();
        assert_eq!(fields["judge_name"], FieldValue::Null);
        assert_eq!(fields["breeds"], FieldValue::Null);
        assert_eq!(fields["appointments"], FieldValue::Rows(vec![]));
        assert_eq!(fields["appointment_count"], FieldValue::Count(0));
        assert_eq!(fields["last_appointment"], FieldValue::Null);
    }

    #[test]
    fn test_whitespace_does_not_change_fields() {
        let extractor = Extractor::new(&spec()).unwrap();
        let reflowed = PROFILE.replace("<td class=\"club\">Crufts</td>", "<td class=\"club\">\n   Crufts\n</td>");
        assert_eq!(
            extractor.extract(PROFILE).unwrap(),
            extractor.extract(&reflowed).unwrap()
        );
    }

    #[test]
    fn test_invalid_selector_rejected() {
        let bad = DetailSpec {
            fields: vec![FieldRule::text("x", "td:::nope")],
            ..spec()
        };
        assert!(Extractor::new(&bad).is_err());
    }

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("  a \n\t b  "), "a b");
        assert_eq!(normalize_text(""), "");
    }
}
