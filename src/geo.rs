//! Geolocation port used to fill `{geo:*}` template placeholders.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

/// A latitude/longitude pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    /// Creates a new coordinate pair.
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Source of the user's current location.
///
/// The catalog flips `set_enabled` depending on whether any default engine
/// needs location data; acquisition itself happens elsewhere.
pub trait GeoLocation: Send + Sync {
    /// Turns location acquisition on or off.
    fn set_enabled(&self, enabled: bool);

    /// Returns whether location acquisition is on.
    fn is_enabled(&self) -> bool;

    /// Returns the last known coordinates, if any.
    fn current_coordinates(&self) -> Option<Coordinates>;

    /// Returns the last known formatted address, or an empty string.
    fn current_formatted_address(&self) -> String;
}

/// A geolocation source holding a fixed, externally updated position.
#[derive(Debug, Default)]
pub struct StaticGeoLocation {
    enabled: AtomicBool,
    coordinates: RwLock<Option<Coordinates>>,
    address: RwLock<String>,
}

impl StaticGeoLocation {
    /// Creates a source with no known position.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a source with a known position.
    pub fn with_position(coordinates: Coordinates, address: impl Into<String>) -> Self {
        let geo = Self::new();
        geo.update(Some(coordinates), address);
        geo
    }

    /// Replaces the current position.
    pub fn update(&self, coordinates: Option<Coordinates>, address: impl Into<String>) {
        *self.coordinates.write().unwrap_or_else(|e| e.into_inner()) = coordinates;
        *self.address.write().unwrap_or_else(|e| e.into_inner()) = address.into();
    }
}

impl GeoLocation for StaticGeoLocation {
    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn current_coordinates(&self) -> Option<Coordinates> {
        *self.coordinates.read().unwrap_or_else(|e| e.into_inner())
    }

    fn current_formatted_address(&self) -> String {
        self.address.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_geo_default() {
        let geo = StaticGeoLocation::new();
        assert!(!geo.is_enabled());
        assert!(geo.current_coordinates().is_none());
        assert_eq!(geo.current_formatted_address(), "");
    }

    #[test]
    fn test_static_geo_enable_toggle() {
        let geo = StaticGeoLocation::new();
        geo.set_enabled(true);
        assert!(geo.is_enabled());
        geo.set_enabled(false);
        assert!(!geo.is_enabled());
    }

    #[test]
    fn test_static_geo_update() {
        let geo = StaticGeoLocation::with_position(Coordinates::new(52.5, 13.4), "Berlin");
        assert_eq!(geo.current_coordinates(), Some(Coordinates::new(52.5, 13.4)));
        assert_eq!(geo.current_formatted_address(), "Berlin");

        geo.update(None, "");
        assert!(geo.current_coordinates().is_none());
    }
}
