use crate::error::Result;
use crate::tile::Tile;
use crate::types::*;
use async_trait::async_trait;
use downcast_rs::{impl_downcast, DowncastSync};
use tokio_util::sync::CancellationToken;

/// Callback receiving streamed features.
///
/// Called sequentially, never concurrently, for a single streaming call.
/// Returning [`ProviderError::Canceled`](crate::ProviderError::Canceled) stops
/// the stream; the provider returns that same error to its caller.
pub type FeatureConsumer<'a> = dyn FnMut(Feature) -> Result<()> + Send + 'a;

/// Core trait that all tile providers must implement
#[async_trait]
pub trait Tiler: DowncastSync {
    /// Get the type name of this provider
    fn provider_type(&self) -> &'static str;

    /// Get all capabilities supported by this provider
    fn capabilities(&self) -> Vec<Capability>;

    /// Check if a specific capability is supported
    fn supports(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    /// Information about the layers this provider serves, in configured order
    async fn layers(&self) -> Result<Vec<LayerInfo>>;

    /// Stream decoded features of `layer` intersecting `tile` to `consumer`.
    ///
    /// Stops between features once `cancel` fires or the consumer returns
    /// `Canceled`, returning `Canceled`. Features already delivered stay valid.
    async fn tile_features(
        &self,
        cancel: &CancellationToken,
        layer: &str,
        tile: &Tile,
        consumer: &mut FeatureConsumer<'_>,
    ) -> Result<()>;

    /// Bound-based streaming, if this provider supports it
    fn as_filterer(&self) -> Option<&dyn Filterer> {
        None
    }

    /// Release backend resources. Later calls fail with `ProviderClosed`.
    async fn close(&self) -> Result<()>;
}

impl_downcast!(sync Tiler);

/// Optional trait for providers that stream features for arbitrary bounds
#[async_trait]
pub trait Filterer: Tiler {
    /// Stream features of `layer` within `bounds` to `consumer`, in an order
    /// that is stable for identical inputs.
    ///
    /// When `properties` is set, a feature carrying any of the named
    /// properties must match its value (after string coercion). Features that
    /// lack a named property are still returned.
    async fn stream_features(
        &self,
        cancel: &CancellationToken,
        layer: &str,
        bounds: &Bounder,
        properties: Option<&PropertyFilter>,
        consumer: &mut FeatureConsumer<'_>,
    ) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use std::sync::Arc;

    struct Fixed {
        features: Vec<Feature>,
    }

    #[async_trait]
    impl Tiler for Fixed {
        fn provider_type(&self) -> &'static str {
            "fixed"
        }

        fn capabilities(&self) -> Vec<Capability> {
            vec![Capability::Tiles]
        }

        async fn layers(&self) -> Result<Vec<LayerInfo>> {
            Ok(Vec::new())
        }

        async fn tile_features(
            &self,
            cancel: &CancellationToken,
            _layer: &str,
            _tile: &Tile,
            consumer: &mut FeatureConsumer<'_>,
        ) -> Result<()> {
            for feature in &self.features {
                if cancel.is_cancelled() {
                    return Err(ProviderError::Canceled);
                }
                consumer(feature.clone())?;
            }
            Ok(())
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_consumer_cancellation_passes_through() {
        let tiler = Fixed {
            features: (0..5u64).map(|i| Feature::new().with_id(i)).collect(),
        };
        let tile = Tile::new(0, 0, 0).unwrap();
        let mut calls = 0;

        let result = tiler
            .tile_features(&CancellationToken::new(), "any", &tile, &mut |_f| {
                calls += 1;
                if calls == 2 {
                    Err(ProviderError::Canceled)
                } else {
                    Ok(())
                }
            })
            .await;

        assert!(result.unwrap_err().is_canceled());
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_capability_checks_and_downcast() {
        let tiler: Arc<dyn Tiler> = Arc::new(Fixed { features: vec![] });
        assert!(tiler.supports(Capability::Tiles));
        assert!(!tiler.supports(Capability::Filter));
        assert!(tiler.as_filterer().is_none());
        assert!(tiler.downcast_arc::<Fixed>().is_ok());
    }
}
