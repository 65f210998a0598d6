//! # temps-tiles
//!
//! Core abstractions for pulling vector-tile features out of heterogeneous
//! spatial data sources in Temps.
//!
//! A provider turns a tile request (layer name plus z/x/y) into a stream of
//! [`Feature`]s filtered to the tile's buffered extent. Backends live in their
//! own crates:
//! - `temps-tiles-postgis` - PostGIS (templated SQL per layer)
//! - `temps-tiles-geojson` - GeoJSON files loaded into memory
//!
//! ## Architecture
//!
//! - **Tiler**: Core trait that every provider implements (layers, per-tile streaming)
//! - **Filterer**: Optional trait for streaming by time/extent/index bounds and properties
//! - **ProviderFactory**: Constructs providers from a [`ProviderConfig`]
//! - **ProviderRegistry**: Maps provider type names to factories; a process-wide
//!   instance is available through [`registry::global`]
//!
//! ## Example
//!
//! ```rust
//! use temps_tiles::{registry, ProviderConfig, ProviderError};
//!
//! # async fn example() -> temps_tiles::Result<()> {
//! let config = ProviderConfig::new()
//!     .with("host", "localhost")
//!     .with("database", "gis");
//!
//! // Backends register themselves first, e.g. `temps_tiles_postgis::register(registry::global())`
//! match registry::provider_for("postgis", config).await {
//!     Ok(_provider) => {}
//!     Err(ProviderError::UnknownProvider { known, .. }) => println!("known providers: {:?}", known),
//!     Err(e) => return Err(e),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Cancellation
//!
//! Streaming calls take a [`CancellationToken`] and a consumer callback. Either
//! a fired token or a consumer returning [`ProviderError::Canceled`] stops the
//! stream between features and yields `Canceled`, which callers must treat as
//! a requested stop rather than a failure (see [`ProviderError::is_canceled`]).

pub mod config;
pub mod error;
pub mod filter;
pub mod registry;
pub mod tags;
pub mod tile;
pub mod traits;
pub mod types;

// Re-export commonly used items
pub use geo_types;
pub use config::ProviderConfig;
pub use error::{ProviderError, Result};
pub use filter::{Admission, StreamFilter};
pub use registry::{ProviderFactory, ProviderRegistry};
pub use tile::{mercator_to_lon_lat, Tile, WEB_MERCATOR, WGS84};
pub use tokio_util::sync::CancellationToken;
pub use traits::{FeatureConsumer, Filterer, Tiler};
pub use types::{
    Bounder, Capability, Extent, Feature, FeatureId, GeometryType, IndexExtent, LayerInfo,
    PropertyFilter, TimeExtent,
};
