//! Debounced fan-out of suggestion requests across the active engines.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::fetcher::SuggestFetcher;
use crate::geo::GeoLocation;
use crate::query::{QueryOptions, SuggestQuery};
use crate::telemetry::{NoopTelemetry, TelemetryEvent, TelemetrySink};
use crate::translator::TranslatorRegistry;
use crate::{EngineDescriptor, Result};

const EVENT_CAPACITY: usize = 256;

/// Notification for the UI layer.
#[derive(Debug, Clone, PartialEq)]
pub enum SuggestEvent {
    /// One engine answered a suggestion round.
    Suggestions {
        engine: EngineDescriptor,
        terms: String,
        results: Vec<String>,
    },
    /// The current terms changed.
    TermsChanged(String),
    /// Membership of the active engine set changed; carries the new ids.
    EnginesChanged(Vec<String>),
}

impl SuggestEvent {
    /// Event name used at the UI boundary.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Suggestions { .. } => "suggestions",
            Self::TermsChanged(_) => "change:terms",
            Self::EnginesChanged(_) => "change:engines",
        }
    }
}

/// Timing and size limits of the aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregatorOptions {
    /// Quiet period after the last `search` call before a round starts.
    pub debounce: Duration,
    /// Limits passed to every engine query.
    pub query: QueryOptions,
}

impl Default for AggregatorOptions {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(300),
            query: QueryOptions::default(),
        }
    }
}

#[derive(Default)]
struct Session {
    terms: String,
    queries: Vec<Arc<SuggestQuery>>,
    debounce: Option<JoinHandle<()>>,
    rounds: u64,
}

struct Shared {
    session: Mutex<Session>,
    events: broadcast::Sender<SuggestEvent>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl Shared {
    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: SuggestEvent) {
        let _ = self.events.send(event);
    }

    /// Starts a round for `terms` unless newer terms arrived meanwhile.
    fn dispatch(self: &Arc<Self>, terms: String) {
        let queries = {
            let mut session = self.session();
            if session.terms != terms {
                return;
            }
            session.debounce = None;
            session.rounds += 1;
            session.queries.clone()
        };
        debug!("Dispatching '{}' to {} engines", terms, queries.len());

        for query in queries {
            let shared = Arc::clone(self);
            let terms = terms.clone();
            tokio::spawn(async move {
                let outcome = query.get_suggestions(&terms).await;
                shared.deliver(&query, terms, outcome);
            });
        }
    }

    fn deliver(&self, query: &SuggestQuery, terms: String, outcome: Result<Vec<String>>) {
        let engine = query.engine();
        let results = match outcome {
            Ok(results) => results,
            Err(e) if e.is_superseded() => return,
            Err(e) => {
                warn!("Suggestions from {} failed: {}", engine.id(), e);
                Vec::new()
            }
        };

        if self.session().terms != terms {
            debug!("Discarding stale suggestions from {} for '{}'", engine.id(), terms);
            return;
        }

        self.telemetry.record(TelemetryEvent::SuggestionRound {
            engine: engine.id().to_string(),
            count: results.len(),
        });
        self.emit(SuggestEvent::Suggestions {
            engine,
            terms,
            results,
        });
    }
}

/// Coordinates one [`SuggestQuery`] per active engine.
///
/// The active set is the defaults list restricted to engines with a
/// suggestion endpoint. Results are emitted per engine as they arrive;
/// results for terms that are no longer current are dropped.
pub struct SuggestionAggregator {
    fetcher: Arc<dyn SuggestFetcher>,
    translators: Arc<TranslatorRegistry>,
    geo: Option<Arc<dyn GeoLocation>>,
    options: AggregatorOptions,
    shared: Arc<Shared>,
}

impl SuggestionAggregator {
    /// Creates an aggregator with an empty active set.
    pub fn new(
        fetcher: Arc<dyn SuggestFetcher>,
        translators: Arc<TranslatorRegistry>,
        options: AggregatorOptions,
    ) -> Self {
        Self::with_telemetry(fetcher, translators, options, Arc::new(NoopTelemetry))
    }

    /// Creates an aggregator reporting rounds to `telemetry`.
    pub fn with_telemetry(
        fetcher: Arc<dyn SuggestFetcher>,
        translators: Arc<TranslatorRegistry>,
        options: AggregatorOptions,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            fetcher,
            translators,
            geo: None,
            options,
            shared: Arc::new(Shared {
                session: Mutex::new(Session::default()),
                events,
                telemetry,
            }),
        }
    }

    /// Uses `geo` to fill location placeholders in suggestion URLs.
    pub fn with_geo(mut self, geo: Arc<dyn GeoLocation>) -> Self {
        self.geo = Some(geo);
        self
    }

    /// Subscribes to suggestion and change events.
    pub fn subscribe(&self) -> broadcast::Receiver<SuggestEvent> {
        self.shared.events.subscribe()
    }

    pub fn options(&self) -> &AggregatorOptions {
        &self.options
    }

    /// The current search terms.
    pub fn terms(&self) -> String {
        self.shared.session().terms.clone()
    }

    /// Ids of the active engines, in defaults order.
    pub fn engine_ids(&self) -> Vec<String> {
        self.shared
            .session()
            .queries
            .iter()
            .map(|q| q.engine_id())
            .collect()
    }

    /// Number of suggestion rounds dispatched so far.
    pub fn rounds(&self) -> u64 {
        self.shared.session().rounds
    }

    /// Rebuilds the active set from the catalog's default engines.
    ///
    /// Engines that stay keep their query and any request in flight; engines
    /// that leave have their request canceled.
    pub fn set_engines(&self, defaults: &[EngineDescriptor]) {
        let changed = {
            let mut session = self.shared.session();
            let mut previous = std::mem::take(&mut session.queries);
            let mut added = false;

            for engine in defaults.iter().filter(|e| e.has_suggestions()) {
                let reused = previous
                    .iter()
                    .position(|q| {
                        let current = q.engine();
                        current.id() == engine.id()
                            && current.suggestion_url() == engine.suggestion_url()
                            && current.query_url() == engine.query_url()
                    })
                    .map(|i| previous.remove(i));
                let query = match reused {
                    Some(query) => {
                        query.update_engine(engine.clone());
                        query
                    }
                    None => {
                        added = true;
                        Arc::new(self.build_query(engine.clone()))
                    }
                };
                session.queries.push(query);
            }

            // Whatever is left in `previous` is no longer active.
            for query in &previous {
                query.cancel();
            }
            added || !previous.is_empty()
        };

        if changed {
            let ids = self.engine_ids();
            debug!("Active engines changed: {:?}", ids);
            self.shared.emit(SuggestEvent::EnginesChanged(ids));
            self.warmup();
        }
    }

    /// Records `terms` and schedules a suggestion round after the debounce
    /// period. A newer call within the period replaces the pending round.
    pub fn search(&self, terms: &str) {
        let changed = {
            let mut session = self.shared.session();
            if let Some(pending) = session.debounce.take() {
                pending.abort();
            }
            let changed = session.terms != terms;
            if changed {
                session.terms = terms.to_string();
            }

            if terms.trim().is_empty() {
                for query in &session.queries {
                    query.cancel();
                }
            } else {
                let shared = Arc::clone(&self.shared);
                let debounce = self.options.debounce;
                let terms = terms.to_string();
                session.debounce = Some(tokio::spawn(async move {
                    tokio::time::sleep(debounce).await;
                    shared.dispatch(terms);
                }));
            }
            changed
        };

        if changed {
            self.shared.emit(SuggestEvent::TermsChanged(terms.to_string()));
            self.warmup();
        }
    }

    /// Pre-connects to every active engine, subject to per-engine limits.
    pub fn warmup(&self) {
        let queries = self.shared.session().queries.clone();
        if queries.is_empty() {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        runtime.spawn(async move {
            join_all(queries.iter().map(|q| q.warmup())).await;
        });
    }

    /// Cancels the pending round and every in-flight request, and empties
    /// the active set.
    pub fn shutdown(&self) {
        let queries = {
            let mut session = self.shared.session();
            if let Some(pending) = session.debounce.take() {
                pending.abort();
            }
            std::mem::take(&mut session.queries)
        };
        for query in &queries {
            query.cancel();
        }
        if !queries.is_empty() {
            debug!("Aggregator shut down, canceled {} queries", queries.len());
        }
    }

    fn build_query(&self, engine: EngineDescriptor) -> SuggestQuery {
        let query = SuggestQuery::new(
            engine,
            Arc::clone(&self.fetcher),
            Arc::clone(&self.translators),
            self.options.query,
        );
        match &self.geo {
            Some(geo) => query.with_geo(Arc::clone(geo)),
            None => query,
        }
    }
}

impl Drop for SuggestionAggregator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for SuggestionAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuggestionAggregator")
            .field("terms", &self.terms())
            .field("engines", &self.engine_ids())
            .field("options", &self.options)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::HttpResponse;
    use crate::telemetry::testing::RecordingTelemetry;
    use crate::testing::{fixtures, MockFetcher};
    use tokio::sync::broadcast::error::TryRecvError;
    use tokio::time::{sleep, timeout};

    fn aggregator(fetcher: &Arc<MockFetcher>, engines: &[EngineDescriptor]) -> SuggestionAggregator {
        let aggregator = SuggestionAggregator::new(
            fetcher.clone(),
            Arc::new(TranslatorRegistry::new()),
            AggregatorOptions::default(),
        );
        aggregator.set_engines(engines);
        aggregator
    }

    async fn next_suggestions(rx: &mut broadcast::Receiver<SuggestEvent>) -> (String, String, Vec<String>) {
        loop {
            let event = timeout(Duration::from_secs(60), rx.recv())
                .await
                .expect("timed out waiting for suggestions")
                .expect("event channel closed");
            if let SuggestEvent::Suggestions {
                engine,
                terms,
                results,
            } = event
            {
                return (engine.name().to_string(), terms, results);
            }
        }
    }

    fn pending_suggestions(rx: &mut broadcast::Receiver<SuggestEvent>) -> Vec<SuggestEvent> {
        let mut events = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(event @ SuggestEvent::Suggestions { .. }) => events.push(event),
                Ok(_) => {}
                Err(TryRecvError::Lagged(_)) => {}
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return events,
            }
        }
    }

    #[test]
    fn test_event_names() {
        assert_eq!(SuggestEvent::TermsChanged("a".into()).name(), "change:terms");
        assert_eq!(SuggestEvent::EnginesChanged(vec![]).name(), "change:engines");
        let event = SuggestEvent::Suggestions {
            engine: fixtures::engine("a"),
            terms: "a".into(),
            results: vec![],
        };
        assert_eq!(event.name(), "suggestions");
    }

    #[test]
    fn test_default_options() {
        let options = AggregatorOptions::default();
        assert_eq!(options.debounce, Duration::from_millis(300));
        assert_eq!(options.query.max_results, 3);
        assert_eq!(options.query.request_timeout, Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_engines_filters_engines_without_suggestions() {
        let fetcher = Arc::new(MockFetcher::new());
        let aggregator = aggregator(
            &fetcher,
            &[
                fixtures::engine("alpha"),
                fixtures::engine_without_suggestions("beta"),
                fixtures::engine("gamma"),
            ],
        );
        assert_eq!(
            aggregator.engine_ids(),
            vec!["https://alpha.test/", "https://gamma.test/"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_engines_emits_only_on_membership_change() {
        let fetcher = Arc::new(MockFetcher::new());
        let aggregator = aggregator(&fetcher, &[fixtures::engine("alpha")]);
        let mut rx = aggregator.subscribe();

        aggregator.set_engines(&[fixtures::engine("alpha")]);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));

        aggregator.set_engines(&[fixtures::engine("alpha"), fixtures::engine("beta")]);
        assert_eq!(
            rx.try_recv().unwrap(),
            SuggestEvent::EnginesChanged(vec![
                "https://alpha.test/".to_string(),
                "https://beta.test/".to_string()
            ])
        );

        aggregator.set_engines(&[fixtures::engine("beta")]);
        assert_eq!(
            rx.try_recv().unwrap(),
            SuggestEvent::EnginesChanged(vec!["https://beta.test/".to_string()])
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_emits_per_engine() {
        let fetcher = Arc::new(
            MockFetcher::new()
                .route(
                    "alpha.test/suggest",
                    HttpResponse::ok(fixtures::opensearch_body("cat", &["cats", "catalog", "category", "cat toys"])),
                )
                .route_delayed(
                    "beta.test/suggest",
                    Duration::from_millis(50),
                    HttpResponse::ok(fixtures::opensearch_body("cat", &["Cat", "cat memes"])),
                ),
        );
        let aggregator = aggregator(&fetcher, &[fixtures::engine("alpha"), fixtures::engine("beta")]);
        let mut rx = aggregator.subscribe();

        aggregator.search("cat");
        assert_eq!(rx.recv().await.unwrap(), SuggestEvent::TermsChanged("cat".into()));

        let first = next_suggestions(&mut rx).await;
        assert_eq!(first, ("alpha".into(), "cat".into(), vec!["cats".into(), "catalog".into(), "category".into()]));
        let second = next_suggestions(&mut rx).await;
        assert_eq!(second, ("beta".into(), "cat".into(), vec!["cat memes".into()]));
        assert_eq!(aggregator.rounds(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_coalesces_rapid_searches() {
        let fetcher = Arc::new(
            MockFetcher::new()
                .route("q=cats", HttpResponse::ok(fixtures::opensearch_body("cats", &["cats musical"])))
                .route("q=cat", HttpResponse::ok(fixtures::opensearch_body("cat", &["cat food"]))),
        );
        let aggregator = aggregator(&fetcher, &[fixtures::engine("alpha"), fixtures::engine("beta")]);
        let mut rx = aggregator.subscribe();

        aggregator.search("cat");
        sleep(Duration::from_millis(100)).await;
        aggregator.search("cats");

        let (_, terms, _) = next_suggestions(&mut rx).await;
        assert_eq!(terms, "cats");
        next_suggestions(&mut rx).await;

        sleep(Duration::from_secs(1)).await;
        assert_eq!(aggregator.rounds(), 1);
        assert_eq!(fetcher.requests().len(), 2);
        assert!(fetcher.requests().iter().all(|url| url.ends_with("q=cats")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_response_is_discarded() {
        let fetcher = Arc::new(
            MockFetcher::new()
                .route_delayed(
                    "q=cat",
                    Duration::from_millis(350),
                    HttpResponse::ok(fixtures::opensearch_body("cat", &["cat food"])),
                )
                .route("q=dog", HttpResponse::ok(fixtures::opensearch_body("dog", &["dog park"]))),
        );
        let aggregator = aggregator(&fetcher, &[fixtures::engine("alpha")]);
        let mut rx = aggregator.subscribe();

        aggregator.search("cat");
        // Round one starts at 300ms; its response lands at 650ms.
        sleep(Duration::from_millis(400)).await;
        aggregator.search("dog");
        sleep(Duration::from_millis(100)).await;
        assert!(pending_suggestions(&mut rx).is_empty());

        let (_, terms, results) = next_suggestions(&mut rx).await;
        assert_eq!(terms, "dog");
        assert_eq!(results, vec!["dog park"]);
        assert_eq!(aggregator.rounds(), 2);
        assert_eq!(fetcher.request_count("q=cat"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_engine_does_not_affect_others() {
        let fetcher = Arc::new(
            MockFetcher::new()
                .route("alpha.test", HttpResponse::ok("{malformed"))
                .route_failure("beta.test", "connection refused")
                .route("gamma.test", HttpResponse::ok(fixtures::opensearch_body("x", &["xylophone"]))),
        );
        let aggregator = aggregator(
            &fetcher,
            &[fixtures::engine("alpha"), fixtures::engine("beta"), fixtures::engine("gamma")],
        );
        let mut rx = aggregator.subscribe();
        aggregator.search("x");

        let mut by_engine = std::collections::HashMap::new();
        for _ in 0..3 {
            let (engine, _, results) = next_suggestions(&mut rx).await;
            by_engine.insert(engine, results);
        }
        assert!(by_engine["alpha"].is_empty());
        assert!(by_engine["beta"].is_empty());
        assert_eq!(by_engine["gamma"], vec!["xylophone"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_terms_changed_only_on_change() {
        let fetcher = Arc::new(MockFetcher::new());
        let aggregator = aggregator(&fetcher, &[]);
        let mut rx = aggregator.subscribe();

        aggregator.search("a");
        aggregator.search("a");
        aggregator.search("ab");
        assert_eq!(rx.try_recv().unwrap(), SuggestEvent::TermsChanged("a".into()));
        assert_eq!(rx.try_recv().unwrap(), SuggestEvent::TermsChanged("ab".into()));
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
        assert_eq!(aggregator.terms(), "ab");
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_terms_do_not_dispatch() {
        let fetcher = Arc::new(MockFetcher::new());
        let aggregator = aggregator(&fetcher, &[fixtures::engine("alpha")]);
        aggregator.search("   ");
        sleep(Duration::from_secs(1)).await;
        assert_eq!(aggregator.rounds(), 0);
        assert!(fetcher.requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_removed_engine_request_is_canceled() {
        let fetcher = Arc::new(MockFetcher::new().route_delayed(
            "alpha.test",
            Duration::from_secs(2),
            HttpResponse::ok(fixtures::opensearch_body("cat", &["cats"])),
        ));
        let aggregator = aggregator(&fetcher, &[fixtures::engine("alpha")]);
        let mut rx = aggregator.subscribe();

        aggregator.search("cat");
        sleep(Duration::from_millis(500)).await;
        assert_eq!(fetcher.requests().len(), 1);

        aggregator.set_engines(&[]);
        sleep(Duration::from_secs(5)).await;
        assert!(pending_suggestions(&mut rx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_warmup_on_terms_and_engine_changes() {
        let fetcher = Arc::new(MockFetcher::new());
        let aggregator = aggregator(&fetcher, &[fixtures::engine("alpha")]);
        tokio::task::yield_now().await;
        assert_eq!(fetcher.preconnects(), vec!["https://alpha.test/"]);

        // Rate limited: alpha was warmed up less than ten seconds ago.
        aggregator.search("a");
        tokio::task::yield_now().await;
        assert_eq!(fetcher.preconnects().len(), 1);

        aggregator.set_engines(&[fixtures::engine("alpha"), fixtures::engine("beta")]);
        tokio::task::yield_now().await;
        assert!(fetcher.preconnects().contains(&"https://beta.test/".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_pending_round() {
        let fetcher = Arc::new(MockFetcher::new());
        let aggregator = aggregator(&fetcher, &[fixtures::engine("alpha")]);
        aggregator.search("cat");
        aggregator.shutdown();
        sleep(Duration::from_secs(1)).await;
        assert_eq!(aggregator.rounds(), 0);
        assert!(fetcher.requests().is_empty());
        assert!(aggregator.engine_ids().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_telemetry_records_rounds() {
        let fetcher = Arc::new(
            MockFetcher::new().route("alpha.test", HttpResponse::ok(fixtures::opensearch_body("a", &["ab", "ac"]))),
        );
        let sink = Arc::new(RecordingTelemetry::default());
        let aggregator = SuggestionAggregator::with_telemetry(
            fetcher.clone(),
            Arc::new(TranslatorRegistry::new()),
            AggregatorOptions::default(),
            sink.clone(),
        );
        aggregator.set_engines(&[fixtures::engine("alpha")]);
        let mut rx = aggregator.subscribe();
        aggregator.search("a");
        next_suggestions(&mut rx).await;

        assert_eq!(
            *sink.events.lock().unwrap(),
            vec![TelemetryEvent::SuggestionRound {
                engine: "https://alpha.test/".into(),
                count: 2
            }]
        );
    }
}
