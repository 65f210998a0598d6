//! GeoJSON provider for temps-tiles
//!
//! Loads one FeatureCollection file per layer into memory and serves tiles
//! and bounded streams from it. The SHA-256 of each file is reported as the
//! layer's modification tag.

pub mod config;
pub mod parse;

use crate::config::{GeoJsonConfig, GeoJsonLayerConfig};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use temps_tiles::{
    mercator_to_lon_lat, Admission, Bounder, CancellationToken, Capability, Extent, Feature,
    FeatureConsumer, Filterer, GeometryType, LayerInfo, PropertyFilter, ProviderConfig,
    ProviderError, ProviderFactory, ProviderRegistry, Result, StreamFilter, Tile, Tiler,
    WEB_MERCATOR, WGS84,
};
use tracing::{debug, info};

/// Registry name of this provider
pub const PROVIDER_NAME: &str = "geojson";

struct Layer {
    name: String,
    srid: u64,
    modification_tag: String,
    geometry_type: Option<GeometryType>,
    /// Features in file order with their precomputed envelopes
    features: Vec<(Feature, Option<Extent>)>,
}

impl Layer {
    async fn load(config: &GeoJsonLayerConfig) -> Result<Self> {
        let bytes = tokio::fs::read(&config.path).await.map_err(|e| {
            ProviderError::config(format!(
                "layer {}: cannot read {}: {}",
                config.name,
                config.path.display(),
                e
            ))
        })?;

        let text = std::str::from_utf8(&bytes).map_err(|e| {
            ProviderError::decode(format!("layer {}: file is not UTF-8: {}", config.name, e))
        })?;
        let features = parse::parse_collection(text, config.id_property.as_deref()).map_err(
            |e| match e {
                ProviderError::Decode(msg) => {
                    ProviderError::decode(format!("layer {}: {}", config.name, msg))
                }
                other => other,
            },
        )?;

        let geometry_type = features.iter().find_map(Feature::geometry_type);
        let features: Vec<_> = features
            .into_iter()
            .map(|f| {
                let envelope = f.envelope();
                (f, envelope)
            })
            .collect();

        debug!(
            "Loaded {} features for layer {} from {}",
            features.len(),
            config.name,
            config.path.display()
        );

        Ok(Self {
            name: config.name.clone(),
            srid: config.srid,
            modification_tag: hex::encode(Sha256::digest(&bytes)),
            geometry_type,
            features,
        })
    }
}

impl Layer {
    /// The tile's buffered extent in this layer's SRID. Mercator tiles over
    /// lon/lat layers are inverse-projected; other SRID pairs are rejected.
    fn tile_extent(&self, tile: &Tile) -> Result<Extent> {
        let (extent, srid) = tile.buffered_extent();
        match (srid, self.srid) {
            (tile_srid, layer_srid) if tile_srid == layer_srid => Ok(*extent),
            (WEB_MERCATOR, WGS84) => Ok(mercator_to_lon_lat(extent)),
            (tile_srid, layer_srid) => Err(ProviderError::config(format!(
                "layer {} is stored in SRID {} and cannot serve tiles in SRID {}",
                self.name, layer_srid, tile_srid
            ))),
        }
    }
}

/// In-memory GeoJSON tile provider
pub struct GeoJsonProvider {
    layers: Vec<Layer>,
    by_name: HashMap<String, usize>,
    closed: AtomicBool,
}

impl GeoJsonProvider {
    /// Read and parse every layer file
    pub async fn load(config: GeoJsonConfig) -> Result<Self> {
        config.validate()?;

        let mut layers = Vec::with_capacity(config.layers.len());
        for layer in &config.layers {
            layers.push(Layer::load(layer).await?);
        }
        let by_name = layers
            .iter()
            .enumerate()
            .map(|(idx, layer)| (layer.name.clone(), idx))
            .collect();

        info!("GeoJSON provider ready ({} layers)", layers.len());
        Ok(Self {
            layers,
            by_name,
            closed: AtomicBool::new(false),
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ProviderError::ProviderClosed(PROVIDER_NAME.to_string()));
        }
        Ok(())
    }

    fn layer(&self, name: &str) -> Result<&Layer> {
        self.by_name
            .get(name)
            .map(|&idx| &self.layers[idx])
            .ok_or_else(|| ProviderError::LayerNotFound(name.to_string()))
    }
}

#[async_trait]
impl Tiler for GeoJsonProvider {
    fn provider_type(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn capabilities(&self) -> Vec<Capability> {
        vec![
            Capability::Tiles,
            Capability::Filter,
            Capability::ModificationTag,
        ]
    }

    async fn layers(&self) -> Result<Vec<LayerInfo>> {
        self.ensure_open()?;

        Ok(self
            .layers
            .iter()
            .map(|layer| LayerInfo {
                name: layer.name.clone(),
                geometry_type: layer.geometry_type,
                srid: layer.srid,
                modification_tag: Some(layer.modification_tag.clone()),
            })
            .collect())
    }

    async fn tile_features(
        &self,
        cancel: &CancellationToken,
        layer: &str,
        tile: &Tile,
        consumer: &mut FeatureConsumer<'_>,
    ) -> Result<()> {
        self.ensure_open()?;
        let layer = self.layer(layer)?;

        let extent = layer.tile_extent(tile)?;

        // Features without geometry have no location and never fall in a tile
        for (feature, envelope) in &layer.features {
            if cancel.is_cancelled() {
                return Err(ProviderError::Canceled);
            }
            match envelope {
                Some(envelope) if envelope.intersects(&extent) => consumer(feature.clone())?,
                _ => {}
            }
        }
        Ok(())
    }

    fn as_filterer(&self) -> Option<&dyn Filterer> {
        Some(self)
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            info!("GeoJSON provider closed");
        }
        Ok(())
    }
}

#[async_trait]
impl Filterer for GeoJsonProvider {
    async fn stream_features(
        &self,
        cancel: &CancellationToken,
        layer: &str,
        bounds: &Bounder,
        properties: Option<&PropertyFilter>,
        consumer: &mut FeatureConsumer<'_>,
    ) -> Result<()> {
        self.ensure_open()?;
        let layer = self.layer(layer)?;
        let mut filter = StreamFilter::new(bounds, properties);

        for (feature, _) in &layer.features {
            if cancel.is_cancelled() {
                return Err(ProviderError::Canceled);
            }
            match filter.admit(feature) {
                Admission::Emit => consumer(feature.clone())?,
                Admission::Skip => {}
                Admission::Exhausted => break,
            }
        }
        Ok(())
    }
}

/// Creates [`GeoJsonProvider`]s from registry configs
#[derive(Default)]
pub struct GeoJsonFactory;

#[async_trait]
impl ProviderFactory for GeoJsonFactory {
    async fn create(&self, config: ProviderConfig) -> Result<Arc<dyn Tiler>> {
        let config = GeoJsonConfig::from_provider_config(&config)?;
        Ok(Arc::new(GeoJsonProvider::load(config).await?))
    }
}

/// Register the GeoJSON factory under [`PROVIDER_NAME`]
pub async fn register(registry: &ProviderRegistry) -> Result<()> {
    registry
        .register(PROVIDER_NAME, Arc::new(GeoJsonFactory))
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use temps_tiles::{FeatureId, IndexExtent, TimeExtent};
    use tempfile::NamedTempFile;

    const WELLS: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature", "id": 1, "geometry": {"type": "Point", "coordinates": [10, 10]}, "properties": {"height": "9"}},
            {"type": "Feature", "id": 2, "geometry": {"type": "Point", "coordinates": [20, 20]}, "properties": {"height": 5}},
            {"type": "Feature", "id": 3, "geometry": {"type": "Point", "coordinates": [-120, -40]}, "properties": {}},
            {"type": "Feature", "id": 4, "geometry": null, "properties": {"height": 9}}
        ]
    }"#;

    fn write_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    async fn provider(file: &NamedTempFile, srid: u64) -> GeoJsonProvider {
        let config = GeoJsonConfig::from_provider_config(&ProviderConfig::new().with_layer(
            serde_json::json!({
                "name": "wells",
                "path": file.path(),
                "srid": srid
            }),
        ))
        .unwrap();
        GeoJsonProvider::load(config).await.unwrap()
    }

    async fn stream(
        provider: &GeoJsonProvider,
        bounds: &Bounder,
        properties: Option<&PropertyFilter>,
    ) -> Vec<u64> {
        let mut ids = Vec::new();
        provider
            .stream_features(&CancellationToken::new(), "wells", bounds, properties, &mut |f| {
                ids.extend(f.id.as_ref().and_then(FeatureId::as_number));
                Ok(())
            })
            .await
            .unwrap();
        ids
    }

    #[tokio::test]
    async fn test_layers_report_type_and_hash() {
        let file = write_file(WELLS);
        let provider = provider(&file, 4326).await;

        let layers = provider.layers().await.unwrap();
        assert_eq!(layers.len(), 1);
        assert_eq!(layers[0].geometry_type, Some(GeometryType::Point));
        assert_eq!(layers[0].srid, 4326);

        let expected = hex::encode(Sha256::digest(WELLS.as_bytes()));
        assert_eq!(layers[0].modification_tag.as_deref(), Some(expected.as_str()));
        assert!(provider.supports(Capability::ModificationTag));
    }

    #[tokio::test]
    async fn test_property_filter_is_permissive() {
        let file = write_file(WELLS);
        let provider = provider(&file, 4326).await;
        let filter: PropertyFilter = [("height".to_string(), "9".to_string())].into();

        assert_eq!(stream(&provider, &Bounder::new(), Some(&filter)).await, vec![1, 3, 4]);
        assert_eq!(stream(&provider, &Bounder::new(), None).await, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_stream_bounds() {
        let file = write_file(WELLS);
        let provider = provider(&file, 4326).await;

        let east = Bounder::new().with_extent(Extent::new(0.0, 0.0, 15.0, 15.0));
        // feature 4 has no geometry and is kept
        assert_eq!(stream(&provider, &east, None).await, vec![1, 4]);

        let window = Bounder::new().with_index(IndexExtent::new(1, 3));
        assert_eq!(stream(&provider, &window, None).await, vec![2, 3]);

        // no feature carries a time, so a time bound keeps everything
        let timed = Bounder::new().with_time(TimeExtent::new(None, None));
        assert_eq!(stream(&provider, &timed, None).await.len(), 4);
    }

    #[tokio::test]
    async fn test_tile_features_in_mercator() {
        let file = write_file(
            r#"{"type": "FeatureCollection", "features": [
                {"type": "Feature", "id": 1, "geometry": {"type": "Point", "coordinates": [1000, 1000]}, "properties": {}},
                {"type": "Feature", "id": 2, "geometry": {"type": "Point", "coordinates": [-1000000, -1000000]}, "properties": {}},
                {"type": "Feature", "id": 3, "geometry": null, "properties": {}}
            ]}"#,
        );
        let provider = provider(&file, WEB_MERCATOR).await;

        let ids = tile_ids(&provider, &Tile::new(1, 1, 0).unwrap()).await.unwrap();
        assert_eq!(ids, vec![1]);
    }

    async fn tile_ids(provider: &GeoJsonProvider, tile: &Tile) -> Result<Vec<u64>> {
        let mut ids = Vec::new();
        provider
            .tile_features(&CancellationToken::new(), "wells", tile, &mut |f| {
                ids.extend(f.id.as_ref().and_then(FeatureId::as_number));
                Ok(())
            })
            .await?;
        Ok(ids)
    }

    #[tokio::test]
    async fn test_lon_lat_layer_serves_mercator_tiles() {
        let file = write_file(
            r#"{"type": "FeatureCollection", "features": [
                {"type": "Feature", "id": 1, "geometry": {"type": "Point", "coordinates": [8.5, 47.3]}, "properties": {}},
                {"type": "Feature", "id": 2, "geometry": {"type": "Point", "coordinates": [-74.0, 40.7]}, "properties": {}}
            ]}"#,
        );
        let config = GeoJsonConfig::from_provider_config(&ProviderConfig::new().with_layer(
            serde_json::json!({"name": "wells", "path": file.path()}),
        ))
        .unwrap();
        let provider = GeoJsonProvider::load(config).await.unwrap();

        assert_eq!(tile_ids(&provider, &Tile::new(0, 0, 0).unwrap()).await.unwrap(), vec![1, 2]);
        // north-east quadrant holds Zurich only
        assert_eq!(tile_ids(&provider, &Tile::new(1, 1, 0).unwrap()).await.unwrap(), vec![1]);
        assert_eq!(tile_ids(&provider, &Tile::new(6, 33, 22).unwrap()).await.unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn test_tile_srid_without_projection() {
        let file = write_file(WELLS);
        let provider = provider(&file, 2056).await;

        let result = tile_ids(&provider, &Tile::new(0, 0, 0).unwrap()).await;
        assert!(matches!(result, Err(ProviderError::Config(ref m)) if m.contains("2056")));
    }

    #[tokio::test]
    async fn test_cancel_on_second_feature() {
        let file = write_file(WELLS);
        let provider = provider(&file, 4326).await;
        let mut calls = 0;

        let result = provider
            .stream_features(&CancellationToken::new(), "wells", &Bounder::new(), None, &mut |_f| {
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

    #[tokio::test]
    async fn test_closed_and_missing() {
        let file = write_file(WELLS);
        let provider = provider(&file, 4326).await;

        let result = stream_result(&provider, "rivers").await;
        assert!(matches!(result, Err(ProviderError::LayerNotFound(_))));

        provider.close().await.unwrap();
        let result = stream_result(&provider, "wells").await;
        assert!(matches!(result, Err(ProviderError::ProviderClosed(_))));
    }

    async fn stream_result(provider: &GeoJsonProvider, layer: &str) -> Result<()> {
        provider
            .stream_features(&CancellationToken::new(), layer, &Bounder::new(), None, &mut |_f| Ok(()))
            .await
    }

    #[tokio::test]
    async fn test_registry_roundtrip_and_missing_file() {
        let registry = ProviderRegistry::new();
        register(&registry).await.unwrap();
        assert!(registry.has_provider(PROVIDER_NAME).await);

        let file = write_file(WELLS);
        let tiler = registry
            .provider_for(
                PROVIDER_NAME,
                ProviderConfig::new().with_layer(serde_json::json!({"name": "wells", "path": file.path()})),
            )
            .await
            .unwrap();
        assert_eq!(tiler.provider_type(), PROVIDER_NAME);
        assert!(tiler.as_filterer().is_some());
        assert!(tiler.downcast_arc::<GeoJsonProvider>().is_ok());

        let result = registry
            .provider_for(
                PROVIDER_NAME,
                ProviderConfig::new()
                    .with_layer(serde_json::json!({"name": "wells", "path": "/nonexistent/wells.geojson"})),
            )
            .await;
        assert!(matches!(result, Err(ProviderError::Config(ref m)) if m.contains("cannot read")));
    }
}
