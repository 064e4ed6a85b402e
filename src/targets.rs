//! Built-in scrape targets.
//!
//! These are plain [`TargetSpec`] values; a `[[targets]]` entry in the config
//! file with the same name replaces one of them.

use crate::domain::{
    ArtifactFormat, DerivedRule, DetailSpec, FetchMode, FieldRule, IdentityRule, ListingSpec,
    TargetSpec, DEFAULT_CDX_ENDPOINT,
};

pub const ARCHIVE: &str = "archive";
pub const JUDGES: &str = "judges";
pub const CRITIQUES: &str = "critiques";

const JUDGE_LIST_URL: &str =
    "https://www.thekennelclub.org.uk/search/find-a-judge/?Breed=Retriever+(Golden)";
const CRITIQUES_URL: &str =
    "https://kcjudgescritiques.org.uk/critique-listing/?Keyword=Brazenbeacon+Artemis";

const COOKIE_ACCEPT: &str = "#qc-cmp2-ui button[mode=\"primary\"]";
const TERMS_CHECKBOX: &str = "#TermsAndConditionsModal input[type=\"checkbox\"]";
const TERMS_ACCEPT: &str = "#TermsAndConditionsModal button.btn-primary";

pub fn builtin_targets() -> Vec<TargetSpec> {
    vec![archive(), judges(), critiques()]
}

pub fn builtin(name: &str) -> Option<TargetSpec> {
    builtin_targets().into_iter().find(|t| t.name == name)
}

/// Archived show result pages of standfastdata.co.uk.
fn archive() -> TargetSpec {
    TargetSpec {
        name: ARCHIVE.to_string(),
        listing: ListingSpec::WaybackCdx {
            query: "standfastdata.co.uk/*".to_string(),
            endpoint: DEFAULT_CDX_ENDPOINT.to_string(),
            limit: None,
        },
        detail: DetailSpec {
            mode: FetchMode::Http,
            anchor: None,
            fields: vec![
                FieldRule::text("show_name", "h1").with_default("No title"),
                FieldRule::text("date", "span.date").with_default("No date"),
                FieldRule::rows(
                    "results",
                    "table.result-table tr",
                    vec![
                        FieldRule::text("breed", "td:nth-child(1)"),
                        FieldRule::text("class", "td:nth-child(2)"),
                        FieldRule::text("judge", "td:nth-child(3)"),
                        FieldRule::text("cc", "td:nth-child(4)").with_default("N/A"),
                        FieldRule::text("rcc", "td:nth-child(5)").with_default("N/A"),
                    ],
                ),
            ],
            derived: vec![DerivedRule::Count {
                name: "result_count".to_string(),
                rows: "results".to_string(),
            }],
        },
        identity: IdentityRule::Url,
        format: ArtifactFormat::Json,
        rollup: true,
    }
}

/// Kennel Club judges approved for Golden Retrievers, with their
/// appointment history.
fn judges() -> TargetSpec {
    TargetSpec {
        name: JUDGES.to_string(),
        listing: ListingSpec::Html {
            url: JUDGE_LIST_URL.to_string(),
            mode: FetchMode::Rendered {
                wait_for: Some(".search-judge__item".to_string()),
                dismiss: Vec::new(),
            },
            anchor: ".search-judge__item".to_string(),
            link: "a".to_string(),
            base_url: Some("https://www.thekennelclub.org.uk".to_string()),
            fields: vec![
                FieldRule::text("name", ".search-judge__title"),
                FieldRule::text("location", ".search-judge__subtitle"),
            ],
        },
        detail: DetailSpec {
            mode: FetchMode::Rendered {
                wait_for: Some(".m-judge-profile".to_string()),
                dismiss: Vec::new(),
            },
            anchor: Some(".m-judge-profile".to_string()),
            fields: vec![FieldRule::rows(
                    "appointments",
                    ".m-judge-profile__appointment",
                    vec![
                        FieldRule::text("date", ".m-appointment-date"),
                        FieldRule::text("club_name", ".m-appointment-club"),
                        FieldRule::text("breed_average", ".m-appointment-breed-average"),
                        FieldRule::text("dogs_judged", ".m-appointment-dogs"),
                    ],
                )],
            derived: vec![
                DerivedRule::DistinctYears {
                    name: "years_judged".to_string(),
                    rows: "appointments".to_string(),
                    field: "date".to_string(),
                },
                DerivedRule::LatestDate {
                    name: "last_appointment".to_string(),
                    rows: "appointments".to_string(),
                    field: "date".to_string(),
                },
                DerivedRule::Count {
                    name: "appointment_count".to_string(),
                    rows: "appointments".to_string(),
                },
            ],
        },
        identity: IdentityRule::Query {
            param: "JudgeId".to_string(),
        },
        format: ArtifactFormat::Json,
        rollup: true,
    }
}

/// Published critiques mentioning Brazenbeacon Artemis.
fn critiques() -> TargetSpec {
    let dismiss = vec![
        COOKIE_ACCEPT.to_string(),
        TERMS_CHECKBOX.to_string(),
        TERMS_ACCEPT.to_string(),
    ];

    TargetSpec {
        name: CRITIQUES.to_string(),
        listing: ListingSpec::Html {
            url: CRITIQUES_URL.to_string(),
            mode: FetchMode::Rendered {
                wait_for: Some("div.views-row".to_string()),
                dismiss: dismiss.clone(),
            },
            anchor: "div.views-row".to_string(),
            link: "a".to_string(),
            base_url: Some("https://kcjudgescritiques.org.uk".to_string()),
            fields: Vec::new(),
        },
        detail: DetailSpec {
            mode: FetchMode::Rendered {
                wait_for: Some("div.node__content".to_string()),
                dismiss,
            },
            anchor: Some("div.node__content".to_string()),
            fields: vec![
                FieldRule::text("show_name", "h1.page-title"),
                FieldRule::text("breed", "div.field--name-field-breed span"),
                FieldRule::text("judge", "div.field--name-field-judge span"),
                FieldRule::text("show_date", "div.field--name-field-date span"),
                FieldRule::text("published_date", "div.field--name-field-published span"),
                FieldRule::text("critique", "div.field--name-body"),
            ],
            derived: Vec::new(),
        },
        identity: IdentityRule::PathSegment { index: -1 },
        format: ArtifactFormat::Json,
        rollup: true,
    }
}
