//! Declarative description of a scrape target.
//!
//! A target names where the listing lives, how child URLs are found on it,
//! which fields to pull from each child page and how to key records across
//! runs. Swapping sites means writing a new `TargetSpec`, not new code.

use serde::{Deserialize, Serialize};

use crate::domain::IdentityRule;

pub const DEFAULT_CDX_ENDPOINT: &str = "https://web.archive.org/cdx/search/cdx";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FetchMode {
    /// Plain HTTP GET.
    #[default]
    Http,
    /// Headless browser navigation.
    Rendered {
        /// Selector that must appear before the page is read.
        #[serde(default)]
        wait_for: Option<String>,
        /// Overlay buttons clicked if present (cookie banners, T&C modals).
        #[serde(default)]
        dismiss: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ListingSpec {
    /// An HTML page with one container element per child.
    Html {
        url: String,
        #[serde(default)]
        mode: FetchMode,
        /// Container selector; its absence makes the listing empty.
        anchor: String,
        /// Link selector inside each container.
        #[serde(default = "default_link_selector")]
        link: String,
        /// Base for relative links, defaults to the listing URL.
        #[serde(default)]
        base_url: Option<String>,
        /// Read from each container and merged into the child's record.
        #[serde(default)]
        fields: Vec<FieldRule>,
    },
    /// Wayback Machine CDX query; children are archived snapshots.
    WaybackCdx {
        query: String,
        #[serde(default = "default_cdx_endpoint")]
        endpoint: String,
        #[serde(default)]
        limit: Option<usize>,
    },
}

fn default_link_selector() -> String {
    "a".to_string()
}

fn default_cdx_endpoint() -> String {
    DEFAULT_CDX_ENDPOINT.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRule {
    pub name: String,
    pub selector: String,
    /// Read this attribute instead of the element text.
    #[serde(default)]
    pub attr: Option<String>,
    /// Placeholder when nothing matches.
    #[serde(default)]
    pub default: Option<String>,
    /// Collect every match as a list of strings.
    #[serde(default)]
    pub many: bool,
    /// Nested rules applied to each matched row element.
    #[serde(default)]
    pub rows: Vec<FieldRule>,
}

impl FieldRule {
    pub fn text(name: &str, selector: &str) -> Self {
        Self {
            name: name.to_string(),
            selector: selector.to_string(),
            attr: None,
            default: None,
            many: false,
            rows: Vec::new(),
        }
    }

    pub fn with_default(mut self, default: &str) -> Self {
        self.default = Some(default.to_string());
        self
    }

    pub fn with_attr(mut self, attr: &str) -> Self {
        self.attr = Some(attr.to_string());
        self
    }

    pub fn rows(name: &str, selector: &str, rows: Vec<FieldRule>) -> Self {
        Self {
            rows,
            ..Self::text(name, selector)
        }
    }

    pub fn is_rows(&self) -> bool {
        !self.rows.is_empty()
    }
}

/// Fields computed from extracted rows rather than read from the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DerivedRule {
    /// Sorted distinct four-digit years found in `rows[*].field`.
    DistinctYears {
        name: String,
        rows: String,
        field: String,
    },
    /// Most recent parseable date in `rows[*].field`, as `YYYY-MM-DD`.
    LatestDate {
        name: String,
        rows: String,
        field: String,
    },
    /// Number of rows.
    Count { name: String, rows: String },
}

impl DerivedRule {
    pub fn name(&self) -> &str {
        match self {
            DerivedRule::DistinctYears { name, .. }
            | DerivedRule::LatestDate { name, .. }
            | DerivedRule::Count { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailSpec {
    #[serde(default)]
    pub mode: FetchMode,
    /// Required structural element; pages without it are rejected.
    #[serde(default)]
    pub anchor: Option<String>,
    pub fields: Vec<FieldRule>,
    #[serde(default)]
    pub derived: Vec<DerivedRule>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactFormat {
    #[default]
    Json,
    Csv,
}

impl ArtifactFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ArtifactFormat::Json => "json",
            ArtifactFormat::Csv => "csv",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ArtifactFormat::Json => "application/json",
            ArtifactFormat::Csv => "text/csv",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetSpec {
    pub name: String,
    pub listing: ListingSpec,
    pub detail: DetailSpec,
    pub identity: IdentityRule,
    #[serde(default)]
    pub format: ArtifactFormat,
    /// Also maintain `<name>.json` / `<name>.csv` combining every record.
    #[serde(default)]
    pub rollup: bool,
}

impl TargetSpec {
    /// Fields read from the listing rather than the child page.
    pub fn listing_fields(&self) -> &[FieldRule] {
        match &self.listing {
            ListingSpec::Html { fields, .. } => fields,
            ListingSpec::WaybackCdx { .. } => &[],
        }
    }

    /// Every top-level field name a record of this target carries, in
    /// column order.
    pub fn field_names(&self) -> Vec<&str> {
        self.listing_fields()
            .iter()
            .chain(&self.detail.fields)
            .map(|f| f.name.as_str())
            .chain(self.detail.derived.iter().map(DerivedRule::name))
            .collect()
    }

    /// Fixed CSV header for this target's records.
    pub fn csv_header(&self) -> Vec<String> {
        let mut header = vec!["identity".to_string(), "source_url".to_string()];
        header.extend(self.field_names().into_iter().map(str::to_string));
        header.push("last_seen".to_string());
        header
    }
}
