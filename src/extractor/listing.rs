use std::collections::HashSet;

use scraper::{Html, Selector};
use url::Url;

use crate::app::{Result, StandfastError};
use crate::domain::{FetchMode, Fields, ListingSpec};
use crate::extractor::{compile_selector, CompiledField};

/// A child URL plus whatever the listing itself said about it.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingEntry {
    pub url: String,
    pub fields: Fields,
}

impl ListingEntry {
    pub fn bare(url: String) -> Self {
        Self {
            url,
            fields: Fields::new(),
        }
    }
}

/// Turns a listing page into the child URLs to scrape.
pub enum ListingExtractor {
    Html {
        url: String,
        mode: FetchMode,
        anchor_raw: String,
        anchor: Selector,
        link: Selector,
        base: Url,
        fields: Vec<CompiledField>,
    },
    WaybackCdx {
        request_url: String,
        limit: Option<usize>,
    },
}

impl ListingExtractor {
    pub fn new(spec: &ListingSpec) -> Result<Self> {
        match spec {
            ListingSpec::Html {
                url,
                mode,
                anchor,
                link,
                base_url,
                fields,
            } => Ok(Self::Html {
                url: url.clone(),
                mode: mode.clone(),
                anchor_raw: anchor.clone(),
                anchor: compile_selector(anchor)?,
                link: compile_selector(link)?,
                base: Url::parse(base_url.as_deref().unwrap_or(url))?,
                fields: fields
                    .iter()
                    .map(CompiledField::compile)
                    .collect::<Result<Vec<_>>>()?,
            }),
            ListingSpec::WaybackCdx {
                query,
                endpoint,
                limit,
            } => Ok(Self::WaybackCdx {
                request_url: cdx_request_url(endpoint, query)?,
                limit: *limit,
            }),
        }
    }

    /// URL and fetch mode for the listing page itself.
    pub fn request(&self) -> (&str, FetchMode) {
        match self {
            Self::Html { url, mode, .. } => (url, mode.clone()),
            Self::WaybackCdx { request_url, .. } => (request_url, FetchMode::Http),
        }
    }

    /// Child entries in page order, de-duplicated by URL (first wins). A
    /// missing anchor is an `Extraction` error; callers treat it as an
    /// empty listing.
    pub fn extract(&self, body: &str) -> Result<Vec<ListingEntry>> {
        match self {
            Self::Html {
                anchor_raw,
                anchor,
                link,
                base,
                fields,
                ..
            } => {
                let document = Html::parse_document(body);
                let mut containers = document.select(anchor).peekable();
                if containers.peek().is_none() {
                    return Err(StandfastError::Extraction(format!(
                        "listing anchor '{}' not found",
                        anchor_raw
                    )));
                }

                let mut seen = HashSet::new();
                let mut entries = Vec::new();
                for container in containers {
                    // the container may itself be the link
                    let href = container
                        .value()
                        .attr("href")
                        .or_else(|| {
                            container
                                .select(link)
                                .find_map(|a| a.value().attr("href"))
                        });
                    let Some(href) = href.map(str::trim).filter(|h| !h.is_empty()) else {
                        continue;
                    };
                    let Ok(absolute) = base.join(href) else {
                        continue;
                    };
                    let absolute = absolute.to_string();
                    if !seen.insert(absolute.clone()) {
                        continue;
                    }
                    entries.push(ListingEntry {
                        url: absolute,
                        fields: fields.iter().map(|f| f.extract_in(&container)).collect(),
                    });
                }
                Ok(entries)
            }
            Self::WaybackCdx { limit, .. } => Ok(parse_cdx(body, *limit)?
                .into_iter()
                .map(ListingEntry::bare)
                .collect()),
        }
    }
}

pub fn cdx_request_url(endpoint: &str, query: &str) -> Result<String> {
    let url = Url::parse_with_params(
        endpoint,
        &[("url", query), ("output", "json"), ("collapse", "urlkey")],
    )?;
    Ok(url.to_string())
}

/// Parse a CDX JSON response (header row, then one row per capture) into
/// Wayback snapshot URLs.
pub fn parse_cdx(body: &str, limit: Option<usize>) -> Result<Vec<String>> {
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }

    let rows: Vec<Vec<String>> = serde_json::from_str(body)?;
    let Some((header, entries)) = rows.split_first() else {
        return Ok(Vec::new());
    };

    let column = |name: &str| {
        header.iter().position(|h| h == name).ok_or_else(|| {
            StandfastError::Extraction(format!("CDX response has no '{}' column", name))
        })
    };
    let original = column("original")?;
    let timestamp = column("timestamp")?;

    let mut seen = HashSet::new();
    let urls = entries
        .iter()
        .filter_map(|row| Some((row.get(timestamp)?, row.get(original)?)))
        .map(|(ts, orig)| format!("https://web.archive.org/web/{}/{}", ts, orig))
        .filter(|url| seen.insert(url.clone()))
        .take(limit.unwrap_or(usize::MAX))
        .collect();

    Ok(urls)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FieldRule, FieldValue};

    fn html_listing() -> ListingSpec {
        ListingSpec::Html {
            url: "https://example.com/search/?Breed=Golden".into(),
            mode: FetchMode::Http,
            anchor: ".search-judge__item".into(),
            link: "a".into(),
            base_url: None,
            fields: vec![],
        }
    }

    fn urls(entries: Vec<ListingEntry>) -> Vec<String> {
        entries.into_iter().map(|e| e.url).collect()
    }

    #[test]
    fn test_extract_links_resolves_and_dedupes() {
        let body = r#"
            <div class="search-judge__item"><a href="/judge/?JudgeId=1">A</a></div>
            <div class="search-judge__item"><a href="https://example.com/judge/?JudgeId=2">B</a></div>
            <div class="search-judge__item"><a href="/judge/?JudgeId=1">A again</a></div>
            <div class="search-judge__item"><span>no link</span></div>
        "#;
        let listing = ListingExtractor::new(&html_listing()).unwrap();
        let urls = urls(listing.extract(body).unwrap());
        assert_eq!(
            urls,
            vec![
                "https://example.com/judge/?JudgeId=1",
                "https://example.com/judge/?JudgeId=2"
            ]
        );
    }

    #[test]
    fn test_missing_listing_anchor() {
        let listing = ListingExtractor::new(&html_listing()).unwrap();
        let err = listing.extract("<html><body>maintenance</body></html>").unwrap_err();
        assert_eq!(err.kind(), "ExtractionError");
    }

    #[test]
    fn test_container_is_link() {
        let spec = ListingSpec::Html {
            url: "https://example.com/list".into(),
            mode: FetchMode::Http,
            anchor: "a.card".into(),
            link: "a".into(),
            base_url: Some("https://cdn.example.com/".into()),
            fields: vec![],
        };
        let listing = ListingExtractor::new(&spec).unwrap();
        let entries = listing
            .extract(r#"<a class="card" href="items/7">seven</a>"#)
            .unwrap();
        assert_eq!(urls(entries), vec!["https://cdn.example.com/items/7"]);
    }

    #[test]
    fn test_listing_fields_travel_with_each_entry() {
        let spec = ListingSpec::Html {
            fields: vec![
                FieldRule::text("name", ".search-judge__title"),
                FieldRule::text("location", ".search-judge__subtitle").with_default("unknown"),
            ],
            url: "https://example.com/search/?Breed=Golden".into(),
            mode: FetchMode::Http,
            anchor: ".search-judge__item".into(),
            link: "a".into(),
            base_url: None,
        };
        let body = r#"
            <div class="search-judge__item">
              <a href="/judge/?JudgeId=1"><span class="search-judge__title">Ann  Smith</span></a>
              <p class="search-judge__subtitle"> Yorkshire </p>
            </div>
            <div class="search-judge__item">
              <a href="/judge/?JudgeId=2"><span class="search-judge__title">Bob Jones</span></a>
            </div>
        "#;
        let listing = ListingExtractor::new(&spec).unwrap();
        let entries = listing.extract(body).unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].fields["name"], FieldValue::Text("Ann Smith".into()));
        assert_eq!(entries[0].fields["location"], FieldValue::Text("Yorkshire".into()));
        assert_eq!(entries[1].fields["location"], FieldValue::Text("unknown".into()));
    }

    #[test]
    fn test_cdx_entries_carry_no_fields() {
        let listing = ListingExtractor::new(&ListingSpec::WaybackCdx {
            query: "example.org/*".into(),
            endpoint: "https://web.archive.org/cdx/search/cdx".into(),
            limit: None,
        })
        .unwrap();
        let body = r#"[["timestamp","original"],["20080101000000","http://example.org/"]]"#;
        let entries = listing.extract(body).unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].fields.is_empty());
    }

    #[test]
    fn test_parse_cdx() {
        let body = r#"[
            ["urlkey","timestamp","original","mimetype","statuscode","digest","length"],
            ["uk,co,standfastdata)/","20080101000000","http://standfastdata.co.uk/","text/html","200","X","1"],
            ["uk,co,standfastdata)/show?id=3","20090203040506","http://standfastdata.co.uk/show?id=3","text/html","200","Y","2"]
        ]"#;
        let urls = parse_cdx(body, None).unwrap();
        assert_eq!(
            urls,
            vec![
                "https://web.archive.org/web/20080101000000/http://standfastdata.co.uk/",
                "https://web.archive.org/web/20090203040506/http://standfastdata.co.uk/show?id=3"
            ]
        );

        assert_eq!(parse_cdx(body, Some(1)).unwrap().len(), 1);
        assert!(parse_cdx("[]", None).unwrap().is_empty());
        assert!(parse_cdx("", None).unwrap().is_empty());
    }

    #[test]
    fn test_parse_cdx_missing_column() {
        let err = parse_cdx(r#"[["urlkey"],["x"]]"#, None).unwrap_err();
        assert_eq!(err.kind(), "ExtractionError");
    }

    #[test]
    fn test_cdx_request_url() {
        let url = cdx_request_url("https://web.archive.org/cdx/search/cdx", "standfastdata.co.uk/*")
            .unwrap();
        assert_eq!(
            url,
            "https://web.archive.org/cdx/search/cdx?url=standfastdata.co.uk%2F*&output=json&collapse=urlkey"
        );
    }
}
