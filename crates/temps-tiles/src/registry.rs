use crate::config::ProviderConfig;
use crate::error::{ProviderError, Result};
use crate::traits::Tiler;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Factory trait for creating providers from configurations
#[async_trait]
pub trait ProviderFactory: Send + Sync {
    /// Validate `config` and fully construct a provider
    async fn create(&self, config: ProviderConfig) -> Result<Arc<dyn Tiler>>;

    /// Called once during shutdown. Factories with nothing to release keep
    /// the default.
    async fn cleanup(&self) -> Result<()> {
        Ok(())
    }
}

/// Registry mapping provider type names to their factories
pub struct ProviderRegistry {
    factories: RwLock<HashMap<String, Arc<dyn ProviderFactory>>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            factories: RwLock::new(HashMap::new()),
        }
    }

    /// Register a factory under `name`. An existing registration is kept and
    /// `DuplicateProvider` returned.
    pub async fn register(
        &self,
        name: impl Into<String>,
        factory: Arc<dyn ProviderFactory>,
    ) -> Result<()> {
        let name = name.into();
        let mut factories = self.factories.write().await;

        if factories.contains_key(&name) {
            return Err(ProviderError::DuplicateProvider(name));
        }

        debug!("Registered provider: {}", name);
        factories.insert(name, factory);
        Ok(())
    }

    /// Names of all registered providers, sorted
    pub async fn drivers(&self) -> Vec<String> {
        let factories = self.factories.read().await;
        let mut names: Vec<String> = factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check if a provider is registered
    pub async fn has_provider(&self, name: &str) -> bool {
        self.factories.read().await.contains_key(name)
    }

    /// Create a configured provider of the given type
    pub async fn provider_for(&self, name: &str, config: ProviderConfig) -> Result<Arc<dyn Tiler>> {
        let factories = self.factories.read().await;

        let factory = match factories.get(name) {
            Some(factory) => factory.clone(),
            None => {
                let mut known: Vec<String> = factories.keys().cloned().collect();
                known.sort();
                return Err(ProviderError::UnknownProvider {
                    name: name.to_string(),
                    known,
                });
            }
        };

        drop(factories);

        debug!("Creating provider for type: {}", name);
        factory.create(config).await
    }

    /// Run every factory's cleanup. Failures are logged and the sweep continues.
    pub async fn cleanup(&self) {
        info!("cleaning up providers");
        let factories = self.factories.read().await;

        for (name, factory) in factories.iter() {
            if let Err(e) = factory.cleanup().await {
                warn!("Cleanup of provider {} failed: {}", name, e);
            }
        }
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL: Lazy<ProviderRegistry> = Lazy::new(ProviderRegistry::new);

/// Process-wide registry, constructed on first use
pub fn global() -> &'static ProviderRegistry {
    &GLOBAL
}

/// Register a factory with the process-wide registry
pub async fn register(name: impl Into<String>, factory: Arc<dyn ProviderFactory>) -> Result<()> {
    global().register(name, factory).await
}

/// Names registered with the process-wide registry
pub async fn drivers() -> Vec<String> {
    global().drivers().await
}

/// Create a provider through the process-wide registry
pub async fn provider_for(name: &str, config: ProviderConfig) -> Result<Arc<dyn Tiler>> {
    global().provider_for(name, config).await
}

/// Clean up every provider type in the process-wide registry
pub async fn cleanup() {
    global().cleanup().await
}
