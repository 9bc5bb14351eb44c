//! Search engine descriptors and URL template resolution.

use std::hash::{Hash, Hasher};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::geo::GeoLocation;
use crate::{Result, SuggestError};

/// Placeholder replaced by the user's search terms.
pub const SEARCH_TERMS: &str = "{searchTerms}";

static GEO_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{geo:(name|lat|lon)\}").expect("valid geo placeholder regex"));

/// Persisted form of an engine descriptor.
///
/// This is the stable JSON contract shared with storage and the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineRecord {
    pub id: String,
    pub name: String,
    #[serde(rename = "queryURL")]
    pub query_url: String,
    #[serde(rename = "suggestionURL", default)]
    pub suggestion_url: String,
    #[serde(default)]
    pub icon: String,
}

/// A third-party search provider.
///
/// Equality and hashing use `id` only.
#[derive(Debug, Clone)]
pub struct EngineDescriptor {
    id: String,
    name: String,
    query_url: String,
    suggestion_url: String,
    icon: String,
    uses_geo_location: bool,
}

impl EngineDescriptor {
    /// Creates a descriptor, rejecting missing identity or URL templates.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        query_url: impl Into<String>,
        suggestion_url: impl Into<String>,
        icon: impl Into<String>,
    ) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(SuggestError::Validation("engine id is empty".into()));
        }
        let query_url = query_url.into();
        let suggestion_url = suggestion_url.into();
        validate_query_url(&id, &query_url)?;
        validate_suggestion_url(&id, &suggestion_url)?;

        let uses_geo_location = detect_geo(&query_url, &suggestion_url);
        Ok(Self {
            id,
            name: name.into(),
            query_url,
            suggestion_url,
            icon: icon.into(),
            uses_geo_location,
        })
    }

    /// Rehydrates a descriptor from its persisted record.
    pub fn from_record(record: EngineRecord) -> Result<Self> {
        Self::new(
            record.id,
            record.name,
            record.query_url,
            record.suggestion_url,
            record.icon,
        )
    }

    /// Returns the persisted record for this descriptor.
    pub fn to_record(&self) -> EngineRecord {
        EngineRecord {
            id: self.id.clone(),
            name: self.name.clone(),
            query_url: self.query_url.clone(),
            suggestion_url: self.suggestion_url.clone(),
            icon: self.icon.clone(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn query_url(&self) -> &str {
        &self.query_url
    }

    pub fn suggestion_url(&self) -> &str {
        &self.suggestion_url
    }

    pub fn icon(&self) -> &str {
        &self.icon
    }

    /// Returns true if either template contains a `{geo:*}` placeholder.
    pub fn uses_geo_location(&self) -> bool {
        self.uses_geo_location
    }

    /// Returns true if the engine has a suggestion endpoint.
    pub fn has_suggestions(&self) -> bool {
        !self.suggestion_url.is_empty()
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn set_icon(&mut self, icon: impl Into<String>) {
        self.icon = icon.into();
    }

    /// Replaces the query template and recomputes geolocation use.
    pub fn set_query_url(&mut self, query_url: impl Into<String>) -> Result<()> {
        let query_url = query_url.into();
        validate_query_url(&self.id, &query_url)?;
        self.query_url = query_url;
        self.uses_geo_location = detect_geo(&self.query_url, &self.suggestion_url);
        Ok(())
    }

    /// Replaces the suggestion template and recomputes geolocation use.
    pub fn set_suggestion_url(&mut self, suggestion_url: impl Into<String>) -> Result<()> {
        let suggestion_url = suggestion_url.into();
        validate_suggestion_url(&self.id, &suggestion_url)?;
        self.suggestion_url = suggestion_url;
        self.uses_geo_location = detect_geo(&self.query_url, &self.suggestion_url);
        Ok(())
    }

    /// Resolves the search results URL for `terms`.
    pub fn get_submission(&self, terms: &str, geo: Option<&dyn GeoLocation>) -> String {
        resolve_template(&self.query_url, terms, geo)
    }

    /// Resolves the suggestion URL for `terms`, or `None` if the engine has
    /// no suggestion endpoint.
    pub fn get_suggestion(&self, terms: &str, geo: Option<&dyn GeoLocation>) -> Option<String> {
        if !self.has_suggestions() {
            return None;
        }
        Some(resolve_template(&self.suggestion_url, terms, geo))
    }
}

impl PartialEq for EngineDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for EngineDescriptor {}

impl Hash for EngineDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl TryFrom<EngineRecord> for EngineDescriptor {
    type Error = SuggestError;

    fn try_from(record: EngineRecord) -> Result<Self> {
        Self::from_record(record)
    }
}

impl From<&EngineDescriptor> for EngineRecord {
    fn from(engine: &EngineDescriptor) -> Self {
        engine.to_record()
    }
}

/// Percent-encodes search terms, with spaces as `+` and `!'()*` escaped.
pub fn encode_terms(terms: &str) -> String {
    // urlencoding leaves only ALPHA / DIGIT / "-" / "." / "_" / "~" unescaped.
    urlencoding::encode(terms).replace("%20", "+")
}

fn validate_query_url(id: &str, query_url: &str) -> Result<()> {
    if query_url.trim().is_empty() {
        return Err(SuggestError::Validation(format!("engine '{}' has no queryURL", id)));
    }
    if !query_url.contains(SEARCH_TERMS) {
        return Err(SuggestError::Validation(format!(
            "engine '{}' queryURL lacks {}",
            id, SEARCH_TERMS
        )));
    }
    Ok(())
}

fn validate_suggestion_url(id: &str, suggestion_url: &str) -> Result<()> {
    if !suggestion_url.is_empty() && !suggestion_url.contains(SEARCH_TERMS) {
        return Err(SuggestError::Validation(format!(
            "engine '{}' suggestionURL lacks {}",
            id, SEARCH_TERMS
        )));
    }
    Ok(())
}

fn detect_geo(query_url: &str, suggestion_url: &str) -> bool {
    GEO_PLACEHOLDER.is_match(query_url) || GEO_PLACEHOLDER.is_match(suggestion_url)
}

fn resolve_template(template: &str, terms: &str, geo: Option<&dyn GeoLocation>) -> String {
    let url = template.replace(SEARCH_TERMS, &encode_terms(terms));
    if !GEO_PLACEHOLDER.is_match(&url) {
        return url;
    }

    let coordinates = geo.and_then(|g| g.current_coordinates());
    let address = geo.map(|g| g.current_formatted_address()).unwrap_or_default();
    let lat = coordinates.map(|c| c.lat.to_string()).unwrap_or_default();
    let lon = coordinates.map(|c| c.lon.to_string()).unwrap_or_default();

    url.replace("{geo:name}", &encode_terms(&address))
        .replace("{geo:lat}", &encode_terms(&lat))
        .replace("{geo:lon}", &encode_terms(&lon))
}
