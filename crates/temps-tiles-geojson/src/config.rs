use serde::Deserialize;
use std::collections::HashSet;
use std::path::PathBuf;
use temps_tiles::{ProviderConfig, ProviderError, Result, WGS84};

/// GeoJSON provider configuration: one file per layer
#[derive(Debug, Clone, Deserialize)]
pub struct GeoJsonConfig {
    pub layers: Vec<GeoJsonLayerConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeoJsonLayerConfig {
    pub name: String,

    /// FeatureCollection file
    pub path: PathBuf,

    /// Property holding the feature id, instead of the feature's `id` member
    #[serde(default)]
    pub id_property: Option<String>,

    #[serde(default = "default_srid")]
    pub srid: u64,
}

fn default_srid() -> u64 {
    WGS84
}

impl GeoJsonConfig {
    pub fn from_provider_config(config: &ProviderConfig) -> Result<Self> {
        let parsed: Self = config.deserialize()?;
        parsed.validate()?;
        Ok(parsed)
    }

    pub fn validate(&self) -> Result<()> {
        if self.layers.is_empty() {
            return Err(ProviderError::config("at least one layer is required"));
        }

        let mut seen = HashSet::new();
        for (idx, layer) in self.layers.iter().enumerate() {
            if layer.name.is_empty() {
                return Err(ProviderError::config(format!(
                    "layers[{}]: name must not be empty",
                    idx
                )));
            }
            if layer.path.as_os_str().is_empty() {
                return Err(ProviderError::config(format!(
                    "layers[{}]: path must not be empty",
                    idx
                )));
            }
            if !seen.insert(layer.name.as_str()) {
                return Err(ProviderError::config(format!(
                    "layers[{}]: duplicate layer name {}",
                    idx, layer.name
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_and_validation() {
        let config = GeoJsonConfig::from_provider_config(
            &ProviderConfig::new().with_layer(json!({"name": "wells", "path": "/data/wells.geojson"})),
        )
        .unwrap();
        assert_eq!(config.layers[0].srid, WGS84);
        assert_eq!(config.layers[0].id_property, None);

        let err = GeoJsonConfig::from_provider_config(
            &ProviderConfig::new().with_layer(json!({"name": "wells"})),
        )
        .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("layers[0]") && msg.contains("path"), "{}", msg);

        let err = GeoJsonConfig::from_provider_config(&ProviderConfig::new()).unwrap_err();
        assert!(err.to_string().contains("layers"));

        let layer = json!({"name": "wells", "path": "a.geojson"});
        let err = GeoJsonConfig::from_provider_config(
            &ProviderConfig::new().with_layer(layer.clone()).with_layer(layer),
        )
        .unwrap_err();
        assert!(err.to_string().contains("duplicate layer name wells"));
    }
}
