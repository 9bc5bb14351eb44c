//! HTTP client abstraction for suggestion requests.

use async_trait::async_trait;

use crate::Result;

/// Status and body of a completed HTTP GET.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    /// Creates a response.
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Creates a 200 response.
    pub fn ok(body: impl Into<String>) -> Self {
        Self::new(200, body)
    }

    /// Returns true for HTTP 200.
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

/// Trait for issuing suggestion requests.
///
/// Requests are canceled by dropping the returned future, so
/// implementations must not rely on running to completion.
#[async_trait]
pub trait SuggestFetcher: Send + Sync {
    /// Performs a GET request for `url`.
    async fn get(&self, url: &str) -> Result<HttpResponse>;

    /// Opens a connection to the origin of `url` ahead of use.
    ///
    /// Best effort; the default does nothing.
    async fn preconnect(&self, _url: &str) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoFetcher;

    #[async_trait]
    impl SuggestFetcher for EchoFetcher {
        async fn get(&self, url: &str) -> Result<HttpResponse> {
            Ok(HttpResponse::ok(url))
        }
    }

    #[test]
    fn test_http_response_ok() {
        let response = HttpResponse::ok("[]");
        assert!(response.is_ok());
        assert_eq!(response.body, "[]");
        assert!(!HttpResponse::new(404, "").is_ok());
    }

    #[test]
    fn test_default_preconnect() {
        let fetcher = EchoFetcher;
        tokio_test::block_on(async {
            assert!(fetcher.preconnect("https://example.com/").await.is_ok());
            assert_eq!(fetcher.get("u").await.unwrap().body, "u");
        });
    }
}
