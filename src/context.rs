//! Service context tying the catalog to the suggestion aggregator.
//!
//! The context owns both halves and keeps the aggregator's active set in
//! line with the catalog's defaults. UI commands go through here.

use std::sync::{Arc, Mutex};

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::aggregator::{SuggestEvent, SuggestionAggregator};
use crate::catalog::{CatalogEvent, EngineCatalog};
use crate::config::SuggestConfig;
use crate::fetcher::SuggestFetcher;
use crate::geo::GeoLocation;
use crate::store::CatalogStore;
use crate::telemetry::{NoopTelemetry, TelemetrySink};
use crate::translator::TranslatorRegistry;
use crate::{EngineDescriptor, Result};

/// Builder for [`SuggestContext`].
pub struct SuggestContextBuilder {
    config: SuggestConfig,
    store: Arc<dyn CatalogStore>,
    fetcher: Arc<dyn SuggestFetcher>,
    translators: TranslatorRegistry,
    geo: Option<Arc<dyn GeoLocation>>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl SuggestContextBuilder {
    pub fn config(mut self, config: SuggestConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the built-in response translators.
    pub fn translators(mut self, translators: TranslatorRegistry) -> Self {
        self.translators = translators;
        self
    }

    pub fn geo(mut self, geo: Arc<dyn GeoLocation>) -> Self {
        self.geo = Some(geo);
        self
    }

    pub fn telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Loads the catalog and starts the aggregator.
    ///
    /// Must be called within a tokio runtime.
    pub fn start(self) -> Result<SuggestContext> {
        self.config.validate()?;

        let mut catalog = EngineCatalog::load(self.store, &self.config.seed())?
            .with_telemetry(Arc::clone(&self.telemetry));
        let mut aggregator = SuggestionAggregator::with_telemetry(
            self.fetcher,
            Arc::new(self.translators),
            self.config.aggregator_options(),
            self.telemetry,
        );
        if let Some(geo) = self.geo {
            catalog = catalog.with_geo(Arc::clone(&geo));
            aggregator = aggregator.with_geo(geo);
        }

        aggregator.set_engines(catalog.defaults());
        info!(
            "Suggestion context started with {} active engines",
            aggregator.engine_ids().len()
        );

        let events = catalog.subscribe();
        let catalog = Arc::new(RwLock::new(catalog));
        let aggregator = Arc::new(aggregator);
        let watcher = tokio::spawn(watch_catalog(
            events,
            Arc::clone(&catalog),
            Arc::clone(&aggregator),
        ));

        Ok(SuggestContext {
            catalog,
            aggregator,
            tasks: Mutex::new(vec![watcher]),
        })
    }
}

/// Resyncs the aggregator whenever the catalog's defaults change.
async fn watch_catalog(
    mut events: broadcast::Receiver<CatalogEvent>,
    catalog: Arc<RwLock<EngineCatalog>>,
    aggregator: Arc<SuggestionAggregator>,
) {
    loop {
        match events.recv().await {
            Ok(event) if event.affects_defaults() => {
                debug!("Catalog event {}, resyncing engines", event.name());
            }
            Ok(_) => continue,
            Err(RecvError::Lagged(skipped)) => {
                warn!("Missed {} catalog events, resyncing engines", skipped);
            }
            Err(RecvError::Closed) => break,
        }
        let defaults = catalog.read().await.defaults().to_vec();
        aggregator.set_engines(&defaults);
    }
}

/// A running suggestion service.
pub struct SuggestContext {
    catalog: Arc<RwLock<EngineCatalog>>,
    aggregator: Arc<SuggestionAggregator>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SuggestContext {
    /// Starts building a context on `store` and `fetcher`.
    pub fn builder(
        store: Arc<dyn CatalogStore>,
        fetcher: Arc<dyn SuggestFetcher>,
    ) -> SuggestContextBuilder {
        SuggestContextBuilder {
            config: SuggestConfig::default(),
            store,
            fetcher,
            translators: TranslatorRegistry::with_builtin(),
            geo: None,
            telemetry: Arc::new(NoopTelemetry),
        }
    }

    /// Shared handle to the catalog.
    pub fn catalog(&self) -> Arc<RwLock<EngineCatalog>> {
        Arc::clone(&self.catalog)
    }

    pub fn aggregator(&self) -> &SuggestionAggregator {
        &self.aggregator
    }

    /// Subscribes to suggestion and change events.
    pub fn subscribe(&self) -> broadcast::Receiver<SuggestEvent> {
        self.aggregator.subscribe()
    }

    /// Subscribes to catalog change events.
    pub async fn subscribe_catalog(&self) -> broadcast::Receiver<CatalogEvent> {
        self.catalog.read().await.subscribe()
    }

    /// Default engines in user order.
    pub async fn defaults(&self) -> Vec<EngineDescriptor> {
        self.catalog.read().await.defaults().to_vec()
    }

    /// Other known engines.
    pub async fn others(&self) -> Vec<EngineDescriptor> {
        self.catalog.read().await.others().to_vec()
    }

    /// Makes `engine` a default engine.
    pub async fn add_default(&self, engine: EngineDescriptor) -> Result<EngineDescriptor> {
        let mut catalog = self.catalog.write().await;
        let added = catalog.add_default(engine)?;
        self.aggregator.set_engines(catalog.defaults());
        Ok(added)
    }

    /// Promotes the known engine `id` to the defaults.
    ///
    /// Returns `None` if no engine with that id is known.
    pub async fn promote(&self, id: &str) -> Result<Option<EngineDescriptor>> {
        let mut catalog = self.catalog.write().await;
        let Some(engine) = catalog.get(id).cloned() else {
            return Ok(None);
        };
        let added = catalog.add_default(engine)?;
        self.aggregator.set_engines(catalog.defaults());
        Ok(Some(added))
    }

    /// Moves the default engine `id` back to the others.
    pub async fn remove_default(&self, id: &str) -> Result<Option<EngineDescriptor>> {
        let mut catalog = self.catalog.write().await;
        let removed = catalog.remove_default(id)?;
        self.aggregator.set_engines(catalog.defaults());
        Ok(removed)
    }

    /// Reorders the defaults to follow `order`.
    pub async fn sort_defaults<S: AsRef<str>>(&self, order: &[S]) -> Result<bool> {
        let mut catalog = self.catalog.write().await;
        let moved = catalog.sort_defaults(order)?;
        self.aggregator.set_engines(catalog.defaults());
        Ok(moved)
    }

    /// Adds `engine` to the others.
    pub async fn add_other(&self, engine: EngineDescriptor) -> Result<EngineDescriptor> {
        self.catalog.write().await.add_other(engine)
    }

    /// Forgets the non-default engine `id`.
    pub async fn remove_other(&self, id: &str) -> Result<Option<EngineDescriptor>> {
        self.catalog.write().await.remove_other(id)
    }

    /// Records new search terms; suggestions follow after the debounce.
    pub fn search(&self, terms: &str) {
        self.aggregator.search(terms);
    }

    /// Feeds engine descriptors reported by the collector into the catalog.
    pub fn attach_collector(&self, mut feed: mpsc::Receiver<EngineDescriptor>) {
        let catalog = Arc::clone(&self.catalog);
        let task = tokio::spawn(async move {
            while let Some(engine) = feed.recv().await {
                let id = engine.id().to_string();
                if let Err(e) = catalog.write().await.engine_discovered(engine) {
                    warn!("Failed to record discovered engine {}: {}", id, e);
                }
            }
            debug!("Collector feed closed");
        });
        self.lock_tasks().push(task);
    }

    /// Drops every engine and the stored catalog.
    pub async fn clear(&self) -> Result<()> {
        let mut catalog = self.catalog.write().await;
        catalog.clear()?;
        self.aggregator.set_engines(catalog.defaults());
        Ok(())
    }

    /// Stops background tasks and cancels every pending request.
    pub fn shutdown(&self) {
        for task in self.lock_tasks().drain(..) {
            task.abort();
        }
        self.aggregator.shutdown();
    }

    fn lock_tasks(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for SuggestContext {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for SuggestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuggestContext")
            .field("aggregator", &self.aggregator)
            .finish()
    }
}
