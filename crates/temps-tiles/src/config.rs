use crate::error::{ProviderError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Untyped provider configuration as handed to a provider factory.
///
/// Backends deserialize it into their own typed config; unrecognized keys are
/// ignored and missing required keys are reported by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderConfig(Map<String, Value>);

impl ProviderConfig {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Build from a JSON object
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(ProviderError::config(format!(
                "provider config must be an object, got {}",
                other
            ))),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Append a layer definition to the `layers` list
    pub fn with_layer(mut self, layer: Value) -> Self {
        match self.0.get_mut("layers") {
            Some(Value::Array(layers)) => layers.push(layer),
            _ => {
                self.0.insert("layers".to_string(), Value::Array(vec![layer]));
            }
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn require_str(&self, key: &str) -> Result<&str> {
        self.get_str(key).ok_or_else(|| ProviderError::missing_key(key))
    }

    /// Deserialize into a backend's typed config. Errors carry the path to
    /// the offending key, e.g. `layers[1]: missing field `name``.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        let value = Value::Object(self.0.clone());
        serde_path_to_error::deserialize(value).map_err(|e| {
            let path = e.path().to_string();
            if path == "." {
                ProviderError::config(e.into_inner().to_string())
            } else {
                ProviderError::config(format!("{}: {}", path, e.into_inner()))
            }
        })
    }
}

impl From<Map<String, Value>> for ProviderConfig {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}
