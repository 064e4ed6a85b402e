use serde::{Deserialize, Serialize};
use std::time::Duration;

/// HTTP fetching and retry settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Request timeout in seconds (default: 30)
    pub timeout_secs: u64,

    /// User agent sent with HTTP requests and set on browser pages
    pub user_agent: String,

    /// Total attempts per fetch, first try included (default: 2)
    pub max_attempts: u32,

    /// Delay before the first retry in milliseconds, doubled per attempt (default: 500)
    pub backoff_ms: u64,

    /// Upper bound for a single retry delay in milliseconds (default: 8000)
    pub max_backoff_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                .to_string(),
            max_attempts: 2,
            backoff_ms: 500,
            max_backoff_ms: 8000,
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Headless browser settings for rendered fetches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    /// Whether to run the browser in headless mode (default: true)
    pub headless: bool,

    /// Page navigation timeout in seconds (default: 30)
    pub timeout_secs: u64,

    /// How long to wait for a content marker in seconds (default: 10)
    pub wait_timeout_secs: u64,

    /// How long to look for each overlay button in milliseconds (default: 3000)
    pub dismiss_wait_ms: u64,

    /// Extra wait after load for dynamic content in milliseconds (default: 500)
    pub settle_ms: u64,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            timeout_secs: 30,
            wait_timeout_secs: 10,
            dismiss_wait_ms: 3000,
            settle_ms: 500,
        }
    }
}

impl BrowserSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }

    pub fn dismiss_wait(&self) -> Duration {
        Duration::from_millis(self.dismiss_wait_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_fetch_config() {
        let config = FetchConfig::default();
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.max_attempts, 2);
        assert!(config.user_agent.starts_with("Mozilla/5.0"));
    }

    #[test]
    fn test_browser_durations() {
        let settings = BrowserSettings::default();
        assert_eq!(settings.wait_timeout(), Duration::from_secs(10));
        assert_eq!(settings.dismiss_wait(), Duration::from_millis(3000));
        assert_eq!(settings.settle(), Duration::from_millis(500));
    }

    #[test]
    fn test_partial_override() {
        let settings: BrowserSettings = toml::from_str("headless = false").unwrap();
        assert!(!settings.headless);
        assert_eq!(settings.timeout_secs, 30);
    }
}
