use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::app::Result;

/// Extracted fields keyed by name. `BTreeMap` keeps serialization order stable.
pub type Fields = BTreeMap<String, FieldValue>;

static NULL_FIELD: FieldValue = FieldValue::Null;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Count(u64),
    Text(String),
    Texts(Vec<String>),
    Rows(Vec<Fields>),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Flatten to a single CSV cell.
    pub fn to_cell(&self) -> String {
        match self {
            FieldValue::Null => String::new(),
            FieldValue::Count(n) => n.to_string(),
            FieldValue::Text(s) => s.clone(),
            FieldValue::Texts(items) => items.join("; "),
            FieldValue::Rows(rows) => rows
                .iter()
                .map(|row| {
                    row.values()
                        .filter(|v| !v.is_null())
                        .map(FieldValue::to_cell)
                        .collect::<Vec<_>>()
                        .join(" / ")
                })
                .collect::<Vec<_>>()
                .join("; "),
        }
    }
}

/// Keys a record serializes alongside its flattened fields.
pub const RESERVED_FIELDS: [&str; 4] = ["identity", "source_url", "fingerprint", "last_seen"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub identity: String,
    pub source_url: String,
    #[serde(flatten)]
    pub fields: Fields,
    pub fingerprint: String,
    pub last_seen: DateTime<Utc>,
}

#[derive(Serialize)]
struct CanonicalRecord<'a> {
    identity: &'a str,
    source_url: &'a str,
    fields: &'a Fields,
}

impl Record {
    pub fn new(identity: String, source_url: String, fields: Fields) -> Result<Self> {
        let fingerprint = Self::compute_fingerprint(&identity, &source_url, &fields)?;
        Ok(Self {
            identity,
            source_url,
            fields,
            fingerprint,
            last_seen: Utc::now(),
        })
    }

    /// Canonical bytes: identity, source URL and fields as compact JSON with
    /// sorted keys. `last_seen` is volatile and never part of it.
    pub fn canonical_form(identity: &str, source_url: &str, fields: &Fields) -> Result<Vec<u8>> {
        let canonical = CanonicalRecord {
            identity,
            source_url,
            fields,
        };
        Ok(serde_json::to_vec(&canonical)?)
    }

    pub fn compute_fingerprint(identity: &str, source_url: &str, fields: &Fields) -> Result<String> {
        let bytes = Self::canonical_form(identity, source_url, fields)?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(hex::encode(hasher.finalize()))
    }

    pub fn field(&self, name: &str) -> &FieldValue {
        self.fields.get(name).unwrap_or(&NULL_FIELD)
    }
}
