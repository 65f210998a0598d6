//! PostGIS provider for temps-tiles
//!
//! Serves each configured layer from a templated SQL statement. Per request
//! the template's tokens are replaced with the tile's buffered bounding box
//! and zoom, the statement runs on a pooled connection, and every result
//! row is decoded into a [`Feature`](temps_tiles::Feature) as it arrives.
//!
//! A layer's geometry type is detected with a one-row probe on first use and
//! kept for the life of the provider.

pub mod config;
pub mod decode;
pub mod pg_types;
pub mod pool;
pub mod row;
pub mod tokens;
pub mod wkb;

use crate::config::{LayerConfig, PostgisConfig};
use crate::decode::{decipher_fields, FieldNames};
use crate::pool::PgRowSource;
use crate::row::RowSource;
use crate::tokens::{replace_tokens, QueryBounds};
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use temps_tiles::tile::DEFAULT_TILE_EXTENT;
use temps_tiles::{
    Admission, Bounder, CancellationToken, Capability, FeatureConsumer, Filterer, GeometryType,
    LayerInfo, PropertyFilter, ProviderConfig, ProviderError, ProviderFactory, ProviderRegistry,
    Result, StreamFilter, Tile, Tiler,
};
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};

/// Registry name of this provider
pub const PROVIDER_NAME: &str = "postgis";

struct Layer {
    name: String,
    template: String,
    geometry_field: String,
    id_field: String,
    time_field: Option<String>,
    srid: u64,
    /// Empty until first detection; `Some(None)` means detected, no geometry
    geometry_type: OnceCell<Option<GeometryType>>,
}

impl Layer {
    fn from_config(config: &LayerConfig, default_srid: u64) -> Self {
        Self {
            name: config.name.clone(),
            template: config.query_template(),
            geometry_field: config.geometry_fieldname.clone(),
            id_field: config.id_fieldname.clone(),
            time_field: config.time_fieldname.clone(),
            srid: config.srid_or(default_srid),
            geometry_type: OnceCell::new(),
        }
    }

    fn field_names(&self) -> FieldNames<'_> {
        FieldNames {
            geometry: &self.geometry_field,
            id: &self.id_field,
            time: self.time_field.as_deref(),
        }
    }
}

/// PostGIS tile provider
pub struct PostgisProvider {
    layers: Vec<Layer>,
    by_name: HashMap<String, usize>,
    source: Arc<dyn RowSource>,
    closed: AtomicBool,
}

impl PostgisProvider {
    /// Validate `config`, build the connection pool and verify the database
    /// is reachable
    pub async fn connect(config: PostgisConfig) -> Result<Self> {
        config.validate()?;

        let source = PgRowSource::new(&config)?;
        source.ping().await?;

        info!(
            "PostGIS provider ready: {} ({} layers)",
            config.display_target(),
            config.layers.len()
        );
        Self::with_source(config, Arc::new(source))
    }

    /// Provider over an arbitrary row source
    pub fn with_source(config: PostgisConfig, source: Arc<dyn RowSource>) -> Result<Self> {
        config.validate()?;

        let layers: Vec<Layer> = config
            .layers
            .iter()
            .map(|layer| Layer::from_config(layer, config.srid))
            .collect();
        let by_name = layers
            .iter()
            .enumerate()
            .map(|(idx, layer)| (layer.name.clone(), idx))
            .collect();

        Ok(Self {
            layers,
            by_name,
            source,
            closed: AtomicBool::new(false),
        })
    }

    /// Configured layer names, in order
    pub fn layer_names(&self) -> Vec<&str> {
        self.layers.iter().map(|l| l.name.as_str()).collect()
    }

    /// Geometry type of `layer`, probing the database on first call
    pub async fn geometry_type(&self, layer: &str) -> Result<Option<GeometryType>> {
        self.ensure_open()?;
        let layer = self.layer(layer)?;
        self.detect_geometry_type(layer).await
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

    async fn detect_geometry_type(&self, layer: &Layer) -> Result<Option<GeometryType>> {
        layer
            .geometry_type
            .get_or_try_init(|| self.probe_geometry_type(layer))
            .await
            .copied()
    }

    /// Geometry detection raced against `cancel`, so a fired token never
    /// issues the probe query
    async fn detect_unless_canceled(
        &self,
        cancel: &CancellationToken,
        layer: &Layer,
    ) -> Result<()> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(canceled(layer)),
            detected = self.detect_geometry_type(layer) => detected.map(|_| ()),
        }
    }

    /// Read one row of the layer at the whole-world tile
    async fn probe_geometry_type(&self, layer: &Layer) -> Result<Option<GeometryType>> {
        let world = Tile::with_buffer(0, 0, 0, 0, DEFAULT_TILE_EXTENT)?;
        let sql = replace_tokens(&layer.template, &QueryBounds::for_tile(&world), layer.srid)?;
        let sql = format!("SELECT * FROM ({}) AS probe LIMIT 1", sql);

        debug!("Detecting geometry type for layer {}", layer.name);
        let mut rows = self.source.query(&sql).await?;

        let geometry_type = match rows.next().await.transpose()? {
            Some(row) => decipher_fields(&layer.field_names(), row)?.geometry_type(),
            None => None,
        };

        match geometry_type {
            Some(ty) => debug!("Layer {} geometry type: {}", layer.name, ty),
            None => debug!("Layer {} has no geometry to detect", layer.name),
        }
        Ok(geometry_type)
    }

    /// Run `sql` and hand decoded features to `consumer` until the rows run
    /// out, the filter is exhausted, or the request is canceled
    async fn stream_rows(
        &self,
        cancel: &CancellationToken,
        layer: &Layer,
        sql: &str,
        mut filter: Option<StreamFilter<'_>>,
        consumer: &mut FeatureConsumer<'_>,
    ) -> Result<()> {
        let mut rows = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(canceled(layer)),
            rows = self.source.query(sql) => rows?,
        };

        let names = layer.field_names();
        let mut delivered = 0usize;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(canceled(layer)),
                next = rows.next() => next,
            };
            let Some(row) = next else { break };

            let feature = decipher_fields(&names, row?)?;

            if let Some(filter) = filter.as_mut() {
                match filter.admit(&feature) {
                    Admission::Emit => {}
                    Admission::Skip => continue,
                    Admission::Exhausted => break,
                }
            }

            if let Err(e) = consumer(feature) {
                if e.is_canceled() {
                    debug!(
                        "Consumer stopped layer {} after {} features",
                        layer.name,
                        delivered + 1
                    );
                }
                return Err(e);
            }
            delivered += 1;
        }

        debug!("Streamed {} features from layer {}", delivered, layer.name);
        Ok(())
    }
}

fn canceled(layer: &Layer) -> ProviderError {
    debug!("Request for layer {} canceled", layer.name);
    ProviderError::Canceled
}

#[async_trait]
impl Tiler for PostgisProvider {
    fn provider_type(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn capabilities(&self) -> Vec<Capability> {
        vec![Capability::Tiles, Capability::Filter]
    }

    async fn layers(&self) -> Result<Vec<LayerInfo>> {
        self.ensure_open()?;

        let mut infos = Vec::with_capacity(self.layers.len());
        for layer in &self.layers {
            infos.push(LayerInfo {
                name: layer.name.clone(),
                geometry_type: self.detect_geometry_type(layer).await?,
                srid: layer.srid,
                modification_tag: None,
            });
        }
        Ok(infos)
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
        self.detect_unless_canceled(cancel, layer).await?;

        let sql = replace_tokens(&layer.template, &QueryBounds::for_tile(tile), layer.srid)?;
        let (z, x, y) = tile.zxy();
        debug!("Tile {}/{}/{} layer {}: {}", z, x, y, layer.name, sql);

        self.stream_rows(cancel, layer, &sql, None, consumer).await
    }

    fn as_filterer(&self) -> Option<&dyn Filterer> {
        Some(self)
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.source.close().await;
        info!("PostGIS provider closed");
        Ok(())
    }
}

#[async_trait]
impl Filterer for PostgisProvider {
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
        self.detect_unless_canceled(cancel, layer).await?;

        let query_bounds = QueryBounds::for_stream(bounds, layer.srid);
        let sql = replace_tokens(&layer.template, &query_bounds, layer.srid)?;
        debug!("Stream layer {}: {}", layer.name, sql);

        let filter = StreamFilter::new(bounds, properties);
        self.stream_rows(cancel, layer, &sql, Some(filter), consumer)
            .await
    }
}

/// Creates [`PostgisProvider`]s and closes them again on cleanup
#[derive(Default)]
pub struct PostgisFactory {
    providers: Mutex<Vec<Weak<PostgisProvider>>>,
}

impl PostgisFactory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProviderFactory for PostgisFactory {
    async fn create(&self, config: ProviderConfig) -> Result<Arc<dyn Tiler>> {
        let config = PostgisConfig::from_provider_config(&config)?;
        let provider = Arc::new(PostgisProvider::connect(config).await?);

        let mut providers = self.providers.lock().await;
        providers.retain(|p| p.strong_count() > 0);
        providers.push(Arc::downgrade(&provider));

        Ok(provider)
    }

    async fn cleanup(&self) -> Result<()> {
        let providers: Vec<_> = self.providers.lock().await.drain(..).collect();

        let mut failure = None;
        for provider in providers.iter().filter_map(Weak::upgrade) {
            if let Err(e) = provider.close().await {
                warn!("Failed to close PostGIS provider: {}", e);
                failure = Some(e);
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Register the PostGIS factory under [`PROVIDER_NAME`]
pub async fn register(registry: &ProviderRegistry) -> Result<()> {
    registry
        .register(PROVIDER_NAME, Arc::new(PostgisFactory::new()))
        .await
}
