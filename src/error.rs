//! Error types for the suggestion library.

use thiserror::Error;

/// Result type alias for catalog and suggestion operations.
pub type Result<T> = std::result::Result<T, SuggestError>;

/// Errors that can occur in the catalog or while fetching suggestions.
#[derive(Error, Debug)]
pub enum SuggestError {
    /// Engine descriptor is malformed.
    #[error("Invalid engine descriptor: {0}")]
    Validation(String),

    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Transport failure outside of reqwest (connection refused, reset, ...).
    #[error("Network error: {0}")]
    Network(String),

    /// Provider answered with a non-200 status.
    #[error("Unexpected HTTP status {0}")]
    Status(u16),

    /// Suggestion request timeout exceeded.
    #[error("Suggestion request timed out")]
    Timeout,

    /// Provider response could not be translated.
    #[error("Failed to translate response: {0}")]
    Translation(String),

    /// A newer request for the same engine replaced this one.
    #[error("Request superseded by a newer one")]
    Superseded,

    /// The query was torn down before completing.
    #[error("Request canceled")]
    Canceled,

    /// Storage refused a write because it is over quota.
    #[error("Storage quota exceeded ({used} > {limit} bytes)")]
    QuotaExceeded { used: usize, limit: usize },

    /// Storage backend failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(String),

    /// URL parsing error.
    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),
}

impl SuggestError {
    /// Returns true for failures of the network round trip itself.
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::Network(_) | Self::Status(_) | Self::Timeout
        )
    }

    /// Returns true for errors that only unwind a stale request.
    pub fn is_superseded(&self) -> bool {
        matches!(self, Self::Superseded | Self::Canceled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_validation() {
        let err = SuggestError::Validation("missing queryURL".to_string());
        assert_eq!(err.to_string(), "Invalid engine descriptor: missing queryURL");
    }

    #[test]
    fn test_error_display_status() {
        let err = SuggestError::Status(503);
        assert_eq!(err.to_string(), "Unexpected HTTP status 503");
    }

    #[test]
    fn test_error_display_quota() {
        let err = SuggestError::QuotaExceeded { used: 120, limit: 100 };
        assert_eq!(err.to_string(), "Storage quota exceeded (120 > 100 bytes)");
    }

    #[test]
    fn test_error_display_translation() {
        let err = SuggestError::Translation("expected array".to_string());
        assert_eq!(err.to_string(), "Failed to translate response: expected array");
    }

    #[test]
    fn test_error_classification() {
        assert!(SuggestError::Timeout.is_network());
        assert!(SuggestError::Status(404).is_network());
        assert!(SuggestError::Network("reset".into()).is_network());
        assert!(!SuggestError::Translation(String::new()).is_network());
        assert!(SuggestError::Superseded.is_superseded());
        assert!(SuggestError::Canceled.is_superseded());
        assert!(!SuggestError::Timeout.is_superseded());
    }

    #[test]
    fn test_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: SuggestError = json_err.into();
        assert!(matches!(err, SuggestError::Json(_)));
    }

    #[test]
    fn test_error_debug() {
        let err = SuggestError::Superseded;
        let debug_str = format!("{:?}", err);
        assert!(debug_str.contains("Superseded"));
    }
}
