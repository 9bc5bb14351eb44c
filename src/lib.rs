//! # a3s-suggest
//!
//! A search engine catalog with a debounced, multi-provider autocomplete
//! suggestion aggregator.
//!
//! The library provides:
//!
//! - A persisted catalog of default and other search engines
//! - URL template expansion with term encoding and geolocation placeholders
//! - Per-engine suggestion requests where a newer request supersedes the old one
//! - Debounced fan-out of typed terms to every default engine
//! - Pluggable response translators for providers that do not speak OpenSearch
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use a3s_suggest::{HttpFetcher, JsonFileStore, SuggestContext, SuggestEvent};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = Arc::new(JsonFileStore::new("engines.json"));
//!     let fetcher = Arc::new(HttpFetcher::new(
//!         a3s_suggest::fetcher_http::DEFAULT_USER_AGENT,
//!         std::time::Duration::from_secs(10),
//!     )?);
//!     let context = SuggestContext::builder(store, fetcher).start()?;
//!
//!     let mut events = context.subscribe();
//!     context.search("rust");
//!     while let Ok(event) = events.recv().await {
//!         if let SuggestEvent::Suggestions { engine, results, .. } = event {
//!             println!("{}: {:?}", engine.name(), results);
//!         }
//!     }
//!     Ok(())
//! }
//! ```

mod aggregator;
mod catalog;
mod config;
mod context;
mod engine;
mod error;
mod fetcher;
mod geo;
mod query;
mod store;
mod telemetry;
mod translator;

pub mod engines;
pub mod fetcher_http;
pub mod testing;

pub use aggregator::{AggregatorOptions, SuggestEvent, SuggestionAggregator};
pub use catalog::{CatalogEvent, Collection, EngineCatalog, SeedData};
pub use config::SuggestConfig;
pub use context::{SuggestContext, SuggestContextBuilder};
pub use engine::{encode_terms, EngineDescriptor, EngineRecord, SEARCH_TERMS};
pub use error::{Result, SuggestError};
pub use fetcher::{HttpResponse, SuggestFetcher};
pub use fetcher_http::HttpFetcher;
pub use geo::{Coordinates, GeoLocation, StaticGeoLocation};
pub use query::{QueryOptions, QueryState, SuggestQuery};
pub use store::{CatalogStore, JsonFileStore, MemoryStore, StoredCatalog};
pub use telemetry::{NoopTelemetry, TelemetryEvent, TelemetrySink, TracingTelemetry};
pub use translator::{SuggestionTranslator, TranslatorRegistry};
