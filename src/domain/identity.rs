use serde::{Deserialize, Serialize};
use url::Url;

use crate::app::{Result, StandfastError};

/// How a record's identity is read out of its source URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IdentityRule {
    /// Value of a query parameter, e.g. `?JudgeId=123`.
    Query { param: String },
    /// A path segment; negative indexes count from the end.
    PathSegment { index: i32 },
    /// The whole URL.
    Url,
}

impl IdentityRule {
    pub fn parse(&self, raw: &str) -> Result<String> {
        let fail = |reason: String| StandfastError::IdentityParse {
            url: raw.to_string(),
            reason,
        };

        let url = Url::parse(raw).map_err(|e| fail(e.to_string()))?;

        match self {
            IdentityRule::Query { param } => url
                .query_pairs()
                .find(|(k, _)| k == param.as_str())
                .map(|(_, v)| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| fail(format!("missing query parameter '{}'", param))),
            IdentityRule::PathSegment { index } => {
                let segments: Vec<&str> = url
                    .path_segments()
                    .map(|s| s.filter(|seg| !seg.is_empty()).collect())
                    .unwrap_or_default();
                let len = segments.len() as i32;
                let pos = if *index < 0 { len + index } else { *index };
                if pos < 0 || pos >= len {
                    return Err(fail(format!("no path segment at index {}", index)));
                }
                Ok(segments[pos as usize].to_string())
            }
            IdentityRule::Url => Ok(url.to_string()),
        }
    }
}
