use thiserror::Error;

/// Unified error type for all tile provider operations
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Invalid or missing configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// No provider registered under the requested name
    #[error("No providers registered by the name: {name}, known providers({})", known.join(","))]
    UnknownProvider { name: String, known: Vec<String> },

    /// A provider with this name is already registered
    #[error("Provider {0} already exists")]
    DuplicateProvider(String),

    /// Requested layer is not configured on the provider
    #[error("Layer not found: {0}")]
    LayerNotFound(String),

    /// Tile coordinates or extents are out of range
    #[error("Invalid tile: {0}")]
    InvalidTile(String),

    /// Could not reach the backing data source
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Backend query execution failed
    #[error("Query failed: {0}")]
    Query(String),

    /// Row or geometry had an unexpected shape or type
    #[error("Decode error: {0}")]
    Decode(String),

    /// Provider has been closed
    #[error("Provider closed: {0}")]
    ProviderClosed(String),

    /// Streaming stopped at the consumer's or caller's request.
    /// Not a failure; callers should not log this as an error.
    #[error("Canceled")]
    Canceled,
}

impl ProviderError {
    /// Create an invalid configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        ProviderError::Config(msg.into())
    }

    /// Create a configuration error naming a missing key
    pub fn missing_key(key: &str) -> Self {
        ProviderError::Config(format!("missing required key: {}", key))
    }

    /// Create a query error
    pub fn query(msg: impl Into<String>) -> Self {
        ProviderError::Query(msg.into())
    }

    /// Create a decode error
    pub fn decode(msg: impl Into<String>) -> Self {
        ProviderError::Decode(msg.into())
    }

    /// True if this is the cancellation signal rather than a failure
    pub fn is_canceled(&self) -> bool {
        matches!(self, ProviderError::Canceled)
    }
}

pub type Result<T> = std::result::Result<T, ProviderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_provider_lists_known_names() {
        let err = ProviderError::UnknownProvider {
            name: "nope".to_string(),
            known: vec!["geojson".to_string(), "postgis".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "No providers registered by the name: nope, known providers(geojson,postgis)"
        );
    }

    #[test]
    fn test_canceled_is_distinguishable() {
        assert!(ProviderError::Canceled.is_canceled());
        assert!(!ProviderError::query("boom").is_canceled());
    }
}
