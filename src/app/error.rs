use std::time::Duration;

use thiserror::Error;

use crate::remote::RemoteError;

#[derive(Error, Debug)]
pub enum StandfastError {
    #[error("Fetch failed for {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("Content marker '{marker}' not found on {url} after {}s", waited.as_secs())]
    ContentNotFound {
        url: String,
        marker: String,
        waited: Duration,
    },

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Cannot parse identity from {url}: {reason}")]
    IdentityParse { url: String, reason: String },

    #[error("Sync error: {0}")]
    Sync(#[from] RemoteError),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Unknown target: {0}")]
    UnknownTarget(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl StandfastError {
    pub fn fetch(url: &str, reason: impl ToString) -> Self {
        Self::Fetch {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Name of the error class, as it appears in run logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Fetch { .. } => "FetchError",
            Self::ContentNotFound { .. } => "ContentNotFoundError",
            Self::Extraction(_) => "ExtractionError",
            Self::IdentityParse { .. } => "IdentityParseError",
            Self::Sync(_) => "SyncError",
            Self::Browser(_) => "BrowserError",
            Self::InvalidUrl(_) => "InvalidUrl",
            Self::Io(_) => "IoError",
            Self::Json(_) => "JsonError",
            Self::Csv(_) => "CsvError",
            Self::UnknownTarget(_) => "UnknownTarget",
            Self::Config(_) => "ConfigError",
        }
    }

    /// Whether another fetch attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Fetch { .. } | Self::ContentNotFound { .. } | Self::Browser(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, StandfastError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names() {
        assert_eq!(StandfastError::fetch("u", "boom").kind(), "FetchError");
        assert_eq!(
            StandfastError::Extraction("no anchor".into()).kind(),
            "ExtractionError"
        );
        assert_eq!(
            StandfastError::Sync(RemoteError::NotFound("x".into())).kind(),
            "SyncError"
        );
    }

    #[test]
    fn test_retryable() {
        assert!(StandfastError::fetch("u", "timeout").is_retryable());
        assert!(StandfastError::ContentNotFound {
            url: "u".into(),
            marker: ".m".into(),
            waited: Duration::from_secs(5),
        }
        .is_retryable());
        assert!(!StandfastError::Extraction("x".into()).is_retryable());
        assert!(!StandfastError::IdentityParse {
            url: "u".into(),
            reason: "r".into()
        }
        .is_retryable());
    }
}
