//! Per-engine suggestion requests.
//!
//! A [`SuggestQuery`] owns at most one live request. Starting a new one
//! aborts the previous request and resolves its caller with
//! [`SuggestError::Superseded`], so an older response can never be
//! delivered after a newer request was issued.

use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tracing::debug;

use crate::fetcher::SuggestFetcher;
use crate::geo::GeoLocation;
use crate::translator::TranslatorRegistry;
use crate::{EngineDescriptor, Result, SuggestError};

/// Lifecycle of the latest request of a [`SuggestQuery`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QueryState {
    #[default]
    Idle,
    Requesting,
    Succeeded,
    Failed,
    /// The last request was canceled without a replacement.
    Superseded,
}

/// Limits applied to every request of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    /// Maximum suggestions kept per response.
    pub max_results: usize,
    /// Deadline for one request, treated like a network failure.
    pub request_timeout: Duration,
    /// Minimum spacing between two warm-ups.
    pub warmup_interval: Duration,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            max_results: 3,
            request_timeout: Duration::from_secs(10),
            warmup_interval: Duration::from_secs(10),
        }
    }
}

struct InFlight {
    generation: u64,
    task: JoinHandle<()>,
    reply: oneshot::Sender<Result<Vec<String>>>,
}

#[derive(Default)]
struct Slot {
    generation: u64,
    state: QueryState,
    terms: String,
    in_flight: Option<InFlight>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// One engine's suggestion endpoint plus its current request.
pub struct SuggestQuery {
    engine: RwLock<EngineDescriptor>,
    fetcher: Arc<dyn SuggestFetcher>,
    translators: Arc<TranslatorRegistry>,
    geo: Option<Arc<dyn GeoLocation>>,
    options: QueryOptions,
    slot: Arc<Mutex<Slot>>,
    last_warmup: Mutex<Option<Instant>>,
}

impl SuggestQuery {
    /// Creates an idle query for `engine`.
    pub fn new(
        engine: EngineDescriptor,
        fetcher: Arc<dyn SuggestFetcher>,
        translators: Arc<TranslatorRegistry>,
        options: QueryOptions,
    ) -> Self {
        Self {
            engine: RwLock::new(engine),
            fetcher,
            translators,
            geo: None,
            options,
            slot: Arc::new(Mutex::new(Slot::default())),
            last_warmup: Mutex::new(None),
        }
    }

    /// Uses `geo` to fill location placeholders.
    pub fn with_geo(mut self, geo: Arc<dyn GeoLocation>) -> Self {
        self.geo = Some(geo);
        self
    }

    /// Returns a copy of the engine descriptor.
    pub fn engine(&self) -> EngineDescriptor {
        self.engine.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Returns the engine id.
    pub fn engine_id(&self) -> String {
        self.engine.read().unwrap_or_else(|e| e.into_inner()).id().to_string()
    }

    /// Replaces name and icon without touching the in-flight request.
    pub fn update_engine(&self, engine: EngineDescriptor) {
        *self.engine.write().unwrap_or_else(|e| e.into_inner()) = engine;
    }

    pub fn state(&self) -> QueryState {
        lock(&self.slot).state
    }

    /// Terms of the latest request.
    pub fn terms(&self) -> String {
        lock(&self.slot).terms.clone()
    }

    /// Number of requests issued so far.
    pub fn generation(&self) -> u64 {
        lock(&self.slot).generation
    }

    /// Fetches suggestions for `terms`, superseding any pending request.
    ///
    /// Resolves to the translated suggestions, truncated to `max_results`
    /// and without entries equal to `terms` (ignoring case). Engines without
    /// a suggestion endpoint resolve to an empty list without a request.
    pub async fn get_suggestions(&self, terms: &str) -> Result<Vec<String>> {
        let engine = self.engine();
        let Some(url) = engine.get_suggestion(terms, self.geo.as_deref()) else {
            return Ok(Vec::new());
        };

        let (reply, outcome) = oneshot::channel();
        {
            let mut slot = lock(&self.slot);
            if let Some(previous) = slot.in_flight.take() {
                debug!("Superseding request {} for {}", previous.generation, engine.id());
                previous.task.abort();
                let _ = previous.reply.send(Err(SuggestError::Superseded));
            }

            slot.generation += 1;
            slot.state = QueryState::Requesting;
            slot.terms = terms.to_string();

            let generation = slot.generation;
            let request = Request {
                fetcher: Arc::clone(&self.fetcher),
                translators: Arc::clone(&self.translators),
                slot: Arc::clone(&self.slot),
                engine_id: engine.id().to_string(),
                url,
                terms: terms.to_string(),
                options: self.options,
                generation,
            };
            let task = tokio::spawn(request.run());
            slot.in_flight = Some(InFlight {
                generation,
                task,
                reply,
            });
        }

        outcome.await.unwrap_or(Err(SuggestError::Canceled))
    }

    /// Aborts the pending request, if any. Safe to call repeatedly.
    pub fn cancel(&self) {
        let mut slot = lock(&self.slot);
        if let Some(in_flight) = slot.in_flight.take() {
            in_flight.task.abort();
            let _ = in_flight.reply.send(Err(SuggestError::Canceled));
            slot.state = QueryState::Superseded;
        }
    }

    /// Pre-connects to the engine's hosts at most once per warm-up interval.
    ///
    /// Returns false if skipped because of the rate limit. Connection
    /// failures are ignored.
    pub async fn warmup(&self) -> bool {
        {
            let mut last = lock(&self.last_warmup);
            if let Some(at) = *last {
                if at.elapsed() < self.options.warmup_interval {
                    return false;
                }
            }
            *last = Some(Instant::now());
        }

        for origin in warmup_origins(&self.engine()) {
            if let Err(e) = self.fetcher.preconnect(&origin).await {
                debug!("Warm-up of {} failed: {}", origin, e);
            }
        }
        true
    }
}

impl Drop for SuggestQuery {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for SuggestQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuggestQuery")
            .field("engine", &self.engine_id())
            .field("state", &self.state())
            .finish()
    }
}

/// Everything a spawned request needs, detached from the query's lifetime.
struct Request {
    fetcher: Arc<dyn SuggestFetcher>,
    translators: Arc<TranslatorRegistry>,
    slot: Arc<Mutex<Slot>>,
    engine_id: String,
    url: String,
    terms: String,
    options: QueryOptions,
    generation: u64,
}

impl Request {
    async fn run(self) {
        let outcome = self.fetch().await;

        let mut slot = lock(&self.slot);
        let in_flight = match slot.in_flight.take() {
            Some(in_flight) if in_flight.generation == self.generation => in_flight,
            other => {
                slot.in_flight = other;
                return;
            }
        };
        slot.state = match &outcome {
            Ok(_) => QueryState::Succeeded,
            Err(_) => QueryState::Failed,
        };
        let _ = in_flight.reply.send(outcome);
    }

    async fn fetch(&self) -> Result<Vec<String>> {
        debug!("Requesting suggestions from {}", self.url);
        let response = match timeout(self.options.request_timeout, self.fetcher.get(&self.url)).await {
            Ok(response) => response?,
            Err(_) => return Err(SuggestError::Timeout),
        };
        if !response.is_ok() {
            return Err(SuggestError::Status(response.status));
        }

        let suggestions = self.translators.translate(&self.engine_id, &response.body);
        Ok(shape_results(suggestions, &self.terms, self.options.max_results))
    }
}

/// Truncates to `max_results`, then drops echoes of the typed terms.
fn shape_results(suggestions: Vec<String>, terms: &str, max_results: usize) -> Vec<String> {
    let typed = terms.to_lowercase();
    suggestions
        .into_iter()
        .take(max_results)
        .filter(|s| s.to_lowercase() != typed)
        .collect()
}

fn warmup_origins(engine: &EngineDescriptor) -> Vec<String> {
    let mut templates = vec![engine.get_submission("", None)];
    templates.extend(engine.get_suggestion("", None));

    let mut origins: Vec<String> = Vec::new();
    for template in templates {
        match url::Url::parse(&template) {
            Ok(url) if url.has_host() => {
                let origin = format!("{}/", url.origin().ascii_serialization());
                if !origins.contains(&origin) {
                    origins.push(origin);
                }
            }
            Ok(_) => {}
            Err(e) => debug!("Cannot warm up {}: {}", template, e),
        }
    }
    origins
}
