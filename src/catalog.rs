//! The engine catalog: ordered defaults plus the remaining known engines.
//!
//! Every mutation goes through [`EngineCatalog`], which keeps the two lists
//! disjoint, persists the result before committing it to memory, and
//! broadcasts a [`CatalogEvent`] per observable change.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::engine::EngineRecord;
use crate::geo::GeoLocation;
use crate::store::{CatalogStore, StoredCatalog};
use crate::telemetry::{NoopTelemetry, TelemetryEvent, TelemetrySink};
use crate::{EngineDescriptor, Result, SuggestError};

const EVENT_CAPACITY: usize = 64;

/// Which of the two catalog lists an engine lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Defaults,
    Others,
}

/// Observable catalog change.
#[derive(Debug, Clone, PartialEq)]
pub enum CatalogEvent {
    DefaultsAdded(EngineDescriptor),
    DefaultsRemoved(EngineDescriptor),
    /// New id order of the defaults list.
    DefaultsSorted(Vec<String>),
    OthersAdded(EngineDescriptor),
    OthersRemoved(EngineDescriptor),
    /// Name or icon of a known engine changed.
    EngineUpdated(EngineDescriptor),
    /// Engine dropped to bring storage back under quota.
    Evicted(EngineDescriptor, Collection),
    Cleared,
}

impl CatalogEvent {
    /// Event name used at the UI boundary.
    pub fn name(&self) -> &'static str {
        match self {
            Self::DefaultsAdded(_) => "defaults.added",
            Self::DefaultsRemoved(_) => "defaults.removed",
            Self::DefaultsSorted(_) => "defaults.sorted",
            Self::OthersAdded(_) => "others.added",
            Self::OthersRemoved(_) => "others.removed",
            Self::EngineUpdated(_) => "engine.updated",
            Self::Evicted(..) => "engine.evicted",
            Self::Cleared => "catalog.cleared",
        }
    }

    /// Returns true if the event changes membership or content of defaults.
    pub fn affects_defaults(&self) -> bool {
        match self {
            Self::DefaultsAdded(_)
            | Self::DefaultsRemoved(_)
            | Self::DefaultsSorted(_)
            | Self::EngineUpdated(_)
            | Self::Cleared => true,
            Self::Evicted(_, collection) => *collection == Collection::Defaults,
            Self::OthersAdded(_) | Self::OthersRemoved(_) => false,
        }
    }
}

/// Engines installed on first run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedData {
    #[serde(default)]
    pub defaults: Vec<EngineRecord>,
    #[serde(default)]
    pub others: Vec<EngineRecord>,
}

impl SeedData {
    /// Seed data with no engines at all.
    pub fn empty() -> Self {
        Self {
            defaults: Vec::new(),
            others: Vec::new(),
        }
    }
}

impl Default for SeedData {
    fn default() -> Self {
        Self {
            defaults: crate::engines::builtin_defaults(),
            others: crate::engines::builtin_others(),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct CatalogState {
    defaults: Vec<EngineDescriptor>,
    others: Vec<EngineDescriptor>,
}

impl CatalogState {
    fn from_records(stored: StoredCatalog) -> Self {
        let mut state = Self::default();
        for record in stored.defaults_order {
            match EngineDescriptor::from_record(record) {
                Ok(engine) if !state.defaults.contains(&engine) => state.defaults.push(engine),
                Ok(engine) => warn!("Skipping duplicate default engine {}", engine.id()),
                Err(e) => warn!("Skipping stored default engine: {}", e),
            }
        }
        for record in stored.others {
            match EngineDescriptor::from_record(record) {
                Ok(engine) if !state.contains(engine.id()) => state.others.push(engine),
                Ok(engine) => warn!("Skipping duplicate engine {}", engine.id()),
                Err(e) => warn!("Skipping stored engine: {}", e),
            }
        }
        state.sort_others();
        state
    }

    fn to_stored(&self) -> StoredCatalog {
        StoredCatalog {
            defaults_order: self.defaults.iter().map(EngineDescriptor::to_record).collect(),
            others: self.others.iter().map(EngineDescriptor::to_record).collect(),
        }
    }

    fn contains(&self, id: &str) -> bool {
        position(&self.defaults, id).is_some() || position(&self.others, id).is_some()
    }

    fn insert_other(&mut self, engine: EngineDescriptor) {
        self.others.push(engine);
        self.sort_others();
    }

    fn sort_others(&mut self) {
        self.others.sort_by(|a, b| {
            a.name()
                .to_lowercase()
                .cmp(&b.name().to_lowercase())
                .then_with(|| a.id().cmp(b.id()))
        });
    }

    /// Drops one engine: others first, then the tail of defaults.
    fn evict_one(&mut self) -> Option<(EngineDescriptor, Collection)> {
        if !self.others.is_empty() {
            return Some((self.others.remove(0), Collection::Others));
        }
        self.defaults.pop().map(|engine| (engine, Collection::Defaults))
    }
}

fn position(list: &[EngineDescriptor], id: &str) -> Option<usize> {
    list.iter().position(|engine| engine.id() == id)
}

/// The process-wide engine registry.
pub struct EngineCatalog {
    state: CatalogState,
    store: Arc<dyn CatalogStore>,
    geo: Option<Arc<dyn GeoLocation>>,
    telemetry: Arc<dyn TelemetrySink>,
    events: broadcast::Sender<CatalogEvent>,
}

impl EngineCatalog {
    /// Loads the catalog from `store`, installing `seed` if nothing is stored.
    pub fn load(store: Arc<dyn CatalogStore>, seed: &SeedData) -> Result<Self> {
        let stored = store.load()?.filter(|stored| !stored.is_empty());
        let first_run = stored.is_none();
        let stored = stored.unwrap_or_else(|| StoredCatalog {
            defaults_order: seed.defaults.clone(),
            others: seed.others.clone(),
        });

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let mut catalog = Self {
            state: CatalogState::from_records(stored),
            store,
            geo: None,
            telemetry: Arc::new(NoopTelemetry),
            events,
        };

        if first_run {
            info!(
                "Seeding catalog with {} default and {} other engines",
                catalog.state.defaults.len(),
                catalog.state.others.len()
            );
            let seeded = catalog.state.clone();
            catalog.commit(seeded)?;
        }
        Ok(catalog)
    }

    /// Attaches the geolocation collaborator and syncs its enabled flag.
    pub fn with_geo(mut self, geo: Arc<dyn GeoLocation>) -> Self {
        self.geo = Some(geo);
        self.sync_geo();
        self
    }

    /// Attaches a telemetry sink.
    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Subscribes to catalog change events.
    pub fn subscribe(&self) -> broadcast::Receiver<CatalogEvent> {
        self.events.subscribe()
    }

    /// Default engines in user order.
    pub fn defaults(&self) -> &[EngineDescriptor] {
        &self.state.defaults
    }

    /// Other known engines, sorted by name.
    pub fn others(&self) -> &[EngineDescriptor] {
        &self.state.others
    }

    /// Ids of the default engines in order.
    pub fn default_ids(&self) -> Vec<String> {
        self.state.defaults.iter().map(|e| e.id().to_string()).collect()
    }

    pub fn get_default(&self, id: &str) -> Option<&EngineDescriptor> {
        self.state.defaults.iter().find(|e| e.id() == id)
    }

    pub fn get_other(&self, id: &str) -> Option<&EngineDescriptor> {
        self.state.others.iter().find(|e| e.id() == id)
    }

    /// Looks an engine up in defaults, then others.
    pub fn get(&self, id: &str) -> Option<&EngineDescriptor> {
        self.get_default(id).or_else(|| self.get_other(id))
    }

    /// Total number of known engines.
    pub fn len(&self) -> usize {
        self.state.defaults.len() + self.state.others.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends `engine` to defaults, moving it out of others if needed.
    ///
    /// Returns the existing entry unchanged if the id is already a default.
    pub fn add_default(&mut self, engine: EngineDescriptor) -> Result<EngineDescriptor> {
        if let Some(existing) = self.get_default(engine.id()) {
            return Ok(existing.clone());
        }

        let mut next = self.state.clone();
        let moved = position(&next.others, engine.id()).map(|i| next.others.remove(i));
        next.defaults.push(engine.clone());
        let evicted = self.commit(next)?;

        info!("Added default engine {}", engine.id());
        if let Some(moved) = moved {
            self.emit(CatalogEvent::OthersRemoved(moved));
        }
        self.emit(CatalogEvent::DefaultsAdded(engine.clone()));
        self.emit_evictions(evicted);
        self.telemetry.record(TelemetryEvent::EngineAdded {
            engine: engine.id().to_string(),
        });
        self.sync_geo();
        Ok(engine)
    }

    /// Moves the default engine `id` back into others.
    pub fn remove_default(&mut self, id: &str) -> Result<Option<EngineDescriptor>> {
        let Some(index) = position(&self.state.defaults, id) else {
            return Ok(None);
        };

        let mut next = self.state.clone();
        let engine = next.defaults.remove(index);
        next.insert_other(engine.clone());
        let evicted = self.commit(next)?;

        info!("Removed default engine {}", id);
        self.emit(CatalogEvent::DefaultsRemoved(engine.clone()));
        self.emit(CatalogEvent::OthersAdded(engine.clone()));
        self.emit_evictions(evicted);
        self.telemetry.record(TelemetryEvent::EngineRemoved {
            engine: id.to_string(),
        });
        self.sync_geo();
        Ok(Some(engine))
    }

    /// Reorders defaults to follow `order`.
    ///
    /// Ids missing from `order` keep their relative order ahead of the
    /// listed ones. Returns false, without emitting, if nothing moved.
    pub fn sort_defaults<S: AsRef<str>>(&mut self, order: &[S]) -> Result<bool> {
        let rank = |engine: &EngineDescriptor| -> isize {
            order
                .iter()
                .position(|id| id.as_ref() == engine.id())
                .map_or(-1, |i| i as isize)
        };

        let mut next = self.state.clone();
        next.defaults.sort_by_key(|engine| rank(engine));
        let unchanged = next
            .defaults
            .iter()
            .zip(&self.state.defaults)
            .all(|(a, b)| a.id() == b.id());
        if unchanged {
            debug!("Defaults already in requested order");
            return Ok(false);
        }

        let evicted = self.commit(next)?;
        self.emit(CatalogEvent::DefaultsSorted(self.default_ids()));
        self.emit_evictions(evicted);
        Ok(true)
    }

    /// Adds `engine` to others.
    ///
    /// Ids already known in either list are left untouched and the existing
    /// entry is returned.
    pub fn add_other(&mut self, engine: EngineDescriptor) -> Result<EngineDescriptor> {
        if let Some(existing) = self.get(engine.id()) {
            return Ok(existing.clone());
        }

        let mut next = self.state.clone();
        next.insert_other(engine.clone());
        let evicted = self.commit(next)?;

        debug!("Added engine {}", engine.id());
        self.emit(CatalogEvent::OthersAdded(engine.clone()));
        self.emit_evictions(evicted);
        Ok(engine)
    }

    /// Forgets the non-default engine `id`.
    pub fn remove_other(&mut self, id: &str) -> Result<Option<EngineDescriptor>> {
        let Some(index) = position(&self.state.others, id) else {
            return Ok(None);
        };

        let mut next = self.state.clone();
        let engine = next.others.remove(index);
        let evicted = self.commit(next)?;

        debug!("Removed engine {}", id);
        self.emit(CatalogEvent::OthersRemoved(engine.clone()));
        self.emit_evictions(evicted);
        Ok(Some(engine))
    }

    /// Accepts a descriptor reported by the collector.
    ///
    /// Known ids only get their name and icon refreshed; URL templates of a
    /// known engine are never replaced from collected data. Unknown ids are
    /// added to others.
    pub fn engine_discovered(&mut self, engine: EngineDescriptor) -> Result<EngineDescriptor> {
        let mut next = self.state.clone();
        let slot = match position(&next.defaults, engine.id()) {
            Some(i) => Some(&mut next.defaults[i]),
            None => position(&next.others, engine.id()).map(|i| &mut next.others[i]),
        };
        let Some(existing) = slot else {
            return self.add_other(engine);
        };

        if existing.name() == engine.name() && existing.icon() == engine.icon() {
            return Ok(existing.clone());
        }
        existing.set_name(engine.name());
        existing.set_icon(engine.icon());
        let updated = existing.clone();
        next.sort_others();
        let evicted = self.commit(next)?;

        debug!("Updated engine {}", updated.id());
        self.emit(CatalogEvent::EngineUpdated(updated.clone()));
        self.emit_evictions(evicted);
        Ok(updated)
    }

    /// Drops every engine and the stored catalog.
    pub fn clear(&mut self) -> Result<()> {
        self.store.clear()?;
        self.state = CatalogState::default();
        info!("Catalog cleared");
        self.emit(CatalogEvent::Cleared);
        self.sync_geo();
        Ok(())
    }

    /// Persists `next`, evicting engines while storage reports over quota,
    /// and only then makes it the in-memory state.
    fn commit(&mut self, mut next: CatalogState) -> Result<Vec<(EngineDescriptor, Collection)>> {
        let mut evicted = Vec::new();
        loop {
            match self.store.save(&next.to_stored()) {
                Ok(()) => break,
                Err(SuggestError::QuotaExceeded { used, limit }) => match next.evict_one() {
                    Some((engine, collection)) => {
                        warn!(
                            "Storage over quota ({} > {}), evicting {} from {:?}",
                            used,
                            limit,
                            engine.id(),
                            collection
                        );
                        evicted.push((engine, collection));
                    }
                    None => return Err(SuggestError::QuotaExceeded { used, limit }),
                },
                Err(e) => return Err(e),
            }
        }
        self.state = next;
        Ok(evicted)
    }

    fn emit(&self, event: CatalogEvent) {
        // No receivers is fine; the catalog works without observers.
        let _ = self.events.send(event);
    }

    fn emit_evictions(&mut self, evicted: Vec<(EngineDescriptor, Collection)>) {
        let any_default = evicted.iter().any(|(_, c)| *c == Collection::Defaults);
        for (engine, collection) in evicted {
            self.emit(CatalogEvent::Evicted(engine, collection));
        }
        if any_default {
            self.sync_geo();
        }
    }

    fn sync_geo(&self) {
        if let Some(geo) = &self.geo {
            let needed = self.state.defaults.iter().any(|e| e.uses_geo_location());
            if geo.is_enabled() != needed {
                debug!("Geolocation {}", if needed { "enabled" } else { "disabled" });
                geo.set_enabled(needed);
            }
        }
    }
}

impl std::fmt::Debug for EngineCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineCatalog")
            .field("defaults", &self.default_ids())
            .field("others", &self.state.others.len())
            .finish()
    }
}
