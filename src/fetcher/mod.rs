pub mod browser;
pub mod config;
pub mod http_fetcher;
pub mod retry;

pub use browser::BrowserFetcher;
pub use config::{BrowserSettings, FetchConfig};
pub use http_fetcher::HttpFetcher;
pub use retry::{RetryPolicy, RetryingFetcher};

use async_trait::async_trait;
use tokio::sync::OnceCell;

use crate::app::Result;
use crate::domain::FetchMode;

#[async_trait]
pub trait Fetcher {
    /// Return the textual content of `url`.
    async fn fetch(&self, url: &str, mode: &FetchMode) -> Result<String>;
}

/// Dispatches plain fetches to reqwest and rendered ones to a headless
/// browser, launched on first use.
pub struct PageFetcher {
    http: HttpFetcher,
    browser: OnceCell<BrowserFetcher>,
    browser_settings: BrowserSettings,
    user_agent: String,
}

impl PageFetcher {
    pub fn new(fetch: &FetchConfig, browser_settings: BrowserSettings) -> Result<Self> {
        Ok(Self {
            http: HttpFetcher::new(fetch)?,
            browser: OnceCell::new(),
            browser_settings,
            user_agent: fetch.user_agent.clone(),
        })
    }

    async fn browser(&self) -> Result<&BrowserFetcher> {
        self.browser
            .get_or_try_init(|| {
                BrowserFetcher::launch(self.browser_settings.clone(), self.user_agent.clone())
            })
            .await
    }
}

#[async_trait]
impl Fetcher for PageFetcher {
    async fn fetch(&self, url: &str, mode: &FetchMode) -> Result<String> {
        match mode {
            FetchMode::Http => self.http.get(url).await,
            FetchMode::Rendered { wait_for, dismiss } => {
                self.browser()
                    .await?
                    .render(url, wait_for.as_deref(), dismiss)
                    .await
            }
        }
    }
}
