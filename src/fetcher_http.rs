//! HTTP-based suggestion fetcher using reqwest.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::fetcher::{HttpResponse, SuggestFetcher};
use crate::Result;

/// Default user agent sent with suggestion requests.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (compatible; a3s-suggest/0.1)";

/// A fetcher that uses plain HTTP requests via reqwest.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Creates a new `HttpFetcher` with the given user agent and timeout.
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    /// Creates an `HttpFetcher` with a custom reqwest client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SuggestFetcher for HttpFetcher {
    async fn get(&self, url: &str) -> Result<HttpResponse> {
        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(HttpResponse::new(status, body))
    }

    async fn preconnect(&self, url: &str) -> Result<()> {
        // A HEAD request leaves a pooled keep-alive connection behind.
        let response = self.client.head(url).send().await?;
        debug!("Preconnected to {} ({})", url, response.status());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_fetcher_new() {
        let fetcher = HttpFetcher::new(DEFAULT_USER_AGENT, Duration::from_secs(10));
        assert!(fetcher.is_ok());
    }

    #[test]
    fn test_http_fetcher_with_client() {
        let client = Client::builder().user_agent("test-agent").build().unwrap();
        let _fetcher = HttpFetcher::with_client(client);
    }
}
