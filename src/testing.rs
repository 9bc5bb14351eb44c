//! Test doubles for the external collaborators.
//!
//! ```rust,ignore
//! use a3s_suggest::testing::{fixtures, MockFetcher};
//!
//! let fetcher = MockFetcher::new()
//!     .route("alpha.test", HttpResponse::ok(fixtures::opensearch_body("ca", &["cat", "car"])));
//! ```

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::fetcher::{HttpResponse, SuggestFetcher};
use crate::{Result, SuggestError};

#[derive(Debug, Clone)]
enum Reply {
    Response(HttpResponse),
    Failure(String),
}

#[derive(Debug, Clone)]
struct Route {
    pattern: String,
    delay: Duration,
    reply: Reply,
}

/// Mock implementation of [`SuggestFetcher`].
///
/// Requests are answered by the first route whose pattern is a substring of
/// the URL; unmatched URLs get a 404. Every request and preconnect is
/// recorded for assertions.
#[derive(Debug, Default)]
pub struct MockFetcher {
    routes: Mutex<Vec<Route>>,
    requests: Mutex<Vec<String>>,
    preconnects: Mutex<Vec<String>>,
}

impl MockFetcher {
    /// Creates a fetcher with no routes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers URLs containing `pattern` immediately.
    pub fn route(self, pattern: &str, response: HttpResponse) -> Self {
        self.route_delayed(pattern, Duration::ZERO, response)
    }

    /// Answers URLs containing `pattern` after `delay`.
    pub fn route_delayed(self, pattern: &str, delay: Duration, response: HttpResponse) -> Self {
        self.push(pattern, delay, Reply::Response(response));
        self
    }

    /// Fails URLs containing `pattern` with a network error.
    pub fn route_failure(self, pattern: &str, reason: &str) -> Self {
        self.push(pattern, Duration::ZERO, Reply::Failure(reason.to_string()));
        self
    }

    /// Adds a route on a shared fetcher. Earlier routes take precedence.
    pub fn add_route(&self, pattern: &str, delay: Duration, response: HttpResponse) {
        self.push(pattern, delay, Reply::Response(response));
    }

    /// URLs requested so far, in call order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of requests whose URL contains `pattern`.
    pub fn request_count(&self, pattern: &str) -> usize {
        self.requests().iter().filter(|url| url.contains(pattern)).count()
    }

    /// URLs passed to `preconnect` so far.
    pub fn preconnects(&self) -> Vec<String> {
        self.preconnects.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn push(&self, pattern: &str, delay: Duration, reply: Reply) {
        self.routes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Route {
                pattern: pattern.to_string(),
                delay,
                reply,
            });
    }

    fn find(&self, url: &str) -> Option<Route> {
        self.routes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|route| url.contains(&route.pattern))
            .cloned()
    }
}

#[async_trait]
impl SuggestFetcher for MockFetcher {
    async fn get(&self, url: &str) -> Result<HttpResponse> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(url.to_string());

        let Some(route) = self.find(url) else {
            return Ok(HttpResponse::new(404, ""));
        };
        if !route.delay.is_zero() {
            tokio::time::sleep(route.delay).await;
        }
        match route.reply {
            Reply::Response(response) => Ok(response),
            Reply::Failure(reason) => Err(SuggestError::Network(reason)),
        }
    }

    async fn preconnect(&self, url: &str) -> Result<()> {
        self.preconnects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(url.to_string());
        Ok(())
    }
}

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::EngineDescriptor;

    /// An engine `https://{name}.test/` with an OpenSearch suggestion endpoint.
    pub fn engine(name: &str) -> EngineDescriptor {
        EngineDescriptor::new(
            format!("https://{}.test/", name),
            name,
            format!("https://{}.test/search?q={{searchTerms}}", name),
            format!("https://{}.test/suggest?q={{searchTerms}}", name),
            format!("https://{}.test/favicon.ico", name),
        )
        .expect("fixture engine is valid")
    }

    /// An engine `https://{name}.test/` without a suggestion endpoint.
    pub fn engine_without_suggestions(name: &str) -> EngineDescriptor {
        EngineDescriptor::new(
            format!("https://{}.test/", name),
            name,
            format!("https://{}.test/search?q={{searchTerms}}", name),
            "",
            "",
        )
        .expect("fixture engine is valid")
    }

    /// An OpenSearch suggestion body.
    pub fn opensearch_body(terms: &str, suggestions: &[&str]) -> String {
        serde_json::json!([terms, suggestions]).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_fetcher_routes() {
        let fetcher = MockFetcher::new()
            .route("q=cats", HttpResponse::ok("cats"))
            .route("q=cat", HttpResponse::ok("cat"))
            .route_failure("down.test", "connection refused");

        assert_eq!(fetcher.get("http://a/?q=cats").await.unwrap().body, "cats");
        assert_eq!(fetcher.get("http://a/?q=cat").await.unwrap().body, "cat");
        assert_eq!(fetcher.get("http://a/?q=dog").await.unwrap().status, 404);
        assert!(matches!(
            fetcher.get("http://down.test/").await,
            Err(SuggestError::Network(_))
        ));
        assert_eq!(fetcher.requests().len(), 4);
        assert_eq!(fetcher.request_count("q=cat"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_fetcher_delay() {
        let fetcher = MockFetcher::new().route_delayed(
            "slow",
            Duration::from_secs(5),
            HttpResponse::ok("late"),
        );
        let start = tokio::time::Instant::now();
        fetcher.get("http://slow/").await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(5));
    }

    #[test]
    fn test_fixtures() {
        let engine = fixtures::engine("alpha");
        assert_eq!(engine.id(), "https://alpha.test/");
        assert!(engine.has_suggestions());
        assert!(!fixtures::engine_without_suggestions("beta").has_suggestions());
        assert_eq!(fixtures::opensearch_body("a", &["ab"]), r#"["a",["ab"]]"#);
    }
}
