use reqwest::Client;

use crate::app::{Result, StandfastError};
use crate::fetcher::FetchConfig;

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .gzip(true)
            .brotli(true)
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| StandfastError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    /// GET a page as text. Timeouts, connection failures and non-2xx
    /// statuses all surface as `Fetch` errors.
    pub async fn get(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| StandfastError::fetch(url, e))?;

        let response = response
            .error_for_status()
            .map_err(|e| StandfastError::fetch(url, e))?;

        response
            .text()
            .await
            .map_err(|e| StandfastError::fetch(url, e))
    }
}
