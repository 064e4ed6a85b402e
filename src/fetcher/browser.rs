use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info};

use crate::app::{Result, StandfastError};
use crate::fetcher::BrowserSettings;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Headless Chrome page renderer using chromiumoxide
pub struct BrowserFetcher {
    browser: Browser,
    settings: BrowserSettings,
    user_agent: String,
}

impl BrowserFetcher {
    /// Launch a browser with the given settings
    pub async fn launch(settings: BrowserSettings, user_agent: String) -> Result<Self> {
        let mut builder = BrowserConfig::builder()
            .arg("--no-sandbox")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-software-rasterizer")
            .request_timeout(settings.timeout());

        if !settings.headless {
            builder = builder.with_head();
        }

        let browser_config = builder
            .build()
            .map_err(|e| StandfastError::Browser(format!("Failed to build browser config: {}", e)))?;

        let (browser, mut handler) = Browser::launch(browser_config).await.map_err(|e| {
            StandfastError::Browser(format!(
                "Failed to launch browser: {}. Is Chrome or Chromium installed and in PATH?",
                e
            ))
        })?;

        tokio::spawn(async move { while let Some(_event) = handler.next().await {} });

        info!("Headless browser launched");

        Ok(Self {
            browser,
            settings,
            user_agent,
        })
    }

    /// Navigate to `url`, clear overlays, wait for `wait_for` and return the
    /// rendered HTML.
    pub async fn render(
        &self,
        url: &str,
        wait_for: Option<&str>,
        dismiss: &[String],
    ) -> Result<String> {
        let page = timeout(self.settings.timeout(), self.browser.new_page(url))
            .await
            .map_err(|_| StandfastError::fetch(url, "navigation timed out"))?
            .map_err(|e| StandfastError::fetch(url, format!("Failed to create page: {}", e)))?;

        let result = self.read_page(&page, url, wait_for, dismiss).await;

        // Close the tab even when reading failed
        let _ = page.close().await;

        result
    }

    async fn read_page(
        &self,
        page: &Page,
        url: &str,
        wait_for: Option<&str>,
        dismiss: &[String],
    ) -> Result<String> {
        page.set_user_agent(self.user_agent.as_str())
            .await
            .map_err(|e| StandfastError::Browser(format!("Failed to set user agent: {}", e)))?;

        // Wait for the initial load
        timeout(self.settings.timeout(), page.wait_for_navigation())
            .await
            .map_err(|_| StandfastError::fetch(url, "navigation timed out"))?
            .map_err(|e| StandfastError::fetch(url, format!("Navigation failed: {}", e)))?;

        // Click through cookie and terms overlays, in order
        for selector in dismiss {
            if wait_for_selector(page, selector, self.settings.dismiss_wait()).await {
                match page.find_element(selector.as_str()).await {
                    Ok(element) => {
                        if element.click().await.is_ok() {
                            info!("Dismissed overlay '{}' on {}", selector, url);
                        }
                    }
                    Err(e) => debug!("Overlay '{}' vanished before click: {}", selector, e),
                }
            } else {
                debug!("No overlay '{}' on {}", selector, url);
            }
        }

        // The content marker proves the page really rendered
        if let Some(marker) = wait_for {
            let waited = self.settings.wait_timeout();
            if !wait_for_selector(page, marker, waited).await {
                return Err(StandfastError::ContentNotFound {
                    url: url.to_string(),
                    marker: marker.to_string(),
                    waited,
                });
            }
        }

        // Let late scripts settle before snapshotting the DOM
        sleep(self.settings.settle()).await;

        page.content()
            .await
            .map_err(|e| StandfastError::Browser(format!("Failed to read page content: {}", e)))
    }
}

/// Poll for `selector` until it exists or `limit` elapses.
async fn wait_for_selector(page: &Page, selector: &str, limit: Duration) -> bool {
    let deadline = Instant::now() + limit;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if let Ok(Ok(_)) = timeout(remaining.max(POLL_INTERVAL), page.find_element(selector)).await {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        sleep(POLL_INTERVAL).await;
    }
}
