//! Tile addressing and extents.
//!
//! A [`Tile`] carries its (z, x, y) address, its native extent, and a buffered
//! extent used to avoid clipping features at tile edges. Both extents share
//! one spatial reference id.

use crate::error::{ProviderError, Result};
use crate::types::Extent;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// EPSG:3857 spherical mercator
pub const WEB_MERCATOR: u64 = 3857;
/// EPSG:4326 geographic lon/lat
pub const WGS84: u64 = 4326;

/// Highest zoom level accepted for tile addressing
pub const MAX_ZOOM: u8 = 30;

/// Default vector tile grid size
pub const DEFAULT_TILE_EXTENT: u32 = 4096;
/// Default buffer, in tile grid units
pub const DEFAULT_TILE_BUFFER: u32 = 64;

/// Half the circumference of the web mercator world, in metres
pub const WEB_MERCATOR_MAX_EXTENT: f64 = 20_037_508.342_789_244;

/// Standard rendering pixel size in metres (OGC SLD/SE)
const STANDARD_PIXEL_SIZE: f64 = 0.00028;
/// Nominal raster tile size used for scale denominators
const TILE_PIXELS: f64 = 256.0;

/// A (z, x, y) addressed map tile with its native and buffered extents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tile {
    z: u8,
    x: u32,
    y: u32,
    extent: Extent,
    buffered_extent: Extent,
    srid: u64,
    tile_extent: u32,
}

impl Tile {
    /// Web mercator tile with the default buffer
    pub fn new(z: u8, x: u32, y: u32) -> Result<Self> {
        Self::with_buffer(z, x, y, DEFAULT_TILE_BUFFER, DEFAULT_TILE_EXTENT)
    }

    /// Web mercator tile whose buffered extent grows by `buffer` grid units
    /// out of a `tile_extent` sized grid
    pub fn with_buffer(z: u8, x: u32, y: u32, buffer: u32, tile_extent: u32) -> Result<Self> {
        validate_address(z, x, y)?;
        if tile_extent == 0 {
            return Err(ProviderError::InvalidTile(
                "tile extent must be greater than zero".to_string(),
            ));
        }

        let extent = web_mercator_extent(z, x, y);
        let margin = extent.width() * f64::from(buffer) / f64::from(tile_extent);

        Ok(Self {
            z,
            x,
            y,
            extent,
            buffered_extent: extent.expand(margin),
            srid: WEB_MERCATOR,
            tile_extent,
        })
    }

    /// Tile on an arbitrary grid with caller-computed extents
    pub fn from_extents(
        z: u8,
        x: u32,
        y: u32,
        extent: Extent,
        buffered_extent: Extent,
        srid: u64,
    ) -> Result<Self> {
        validate_address(z, x, y)?;
        if !extent.is_valid() || !buffered_extent.is_valid() {
            return Err(ProviderError::InvalidTile(format!(
                "tile {}/{}/{} has a non-finite or inverted extent",
                z, x, y
            )));
        }

        Ok(Self {
            z,
            x,
            y,
            extent,
            buffered_extent,
            srid,
            tile_extent: DEFAULT_TILE_EXTENT,
        })
    }

    pub fn zxy(&self) -> (u8, u32, u32) {
        (self.z, self.x, self.y)
    }

    pub fn zoom(&self) -> u8 {
        self.z
    }

    /// Extent of the tile excluding any buffer
    pub fn extent(&self) -> (&Extent, u64) {
        (&self.extent, self.srid)
    }

    /// Extent of the tile including the buffer
    pub fn buffered_extent(&self) -> (&Extent, u64) {
        (&self.buffered_extent, self.srid)
    }

    pub fn srid(&self) -> u64 {
        self.srid
    }

    /// Map scale denominator at this tile's zoom for 256px rendering
    pub fn scale_denominator(&self) -> f64 {
        scale_denominator(self.z)
    }

    /// Width of one tile grid unit in extent units
    pub fn pixel_width(&self) -> f64 {
        self.extent.width() / f64::from(self.tile_extent)
    }

    /// Height of one tile grid unit in extent units
    pub fn pixel_height(&self) -> f64 {
        self.extent.height() / f64::from(self.tile_extent)
    }
}

/// Scale denominator for a zoom level on the web mercator grid
pub fn scale_denominator(zoom: u8) -> f64 {
    let resolution = (WEB_MERCATOR_MAX_EXTENT * 2.0) / (TILE_PIXELS * 2f64.powi(i32::from(zoom)));
    resolution / STANDARD_PIXEL_SIZE
}

/// Inverse spherical mercator: a web mercator extent in lon/lat degrees.
/// Buffered extents past the mercator bounds map past ±180° and ±85.05°.
pub fn mercator_to_lon_lat(extent: &Extent) -> Extent {
    let lon = |x: f64| x / WEB_MERCATOR_MAX_EXTENT * 180.0;
    let lat = |y: f64| (y / WEB_MERCATOR_MAX_EXTENT * PI).sinh().atan().to_degrees();

    Extent::new(
        lon(extent.min_x),
        lat(extent.min_y),
        lon(extent.max_x),
        lat(extent.max_y),
    )
}

fn validate_address(z: u8, x: u32, y: u32) -> Result<()> {
    if z > MAX_ZOOM {
        return Err(ProviderError::InvalidTile(format!(
            "zoom {} exceeds maximum of {}",
            z, MAX_ZOOM
        )));
    }

    let dim = 1u64 << z;
    if u64::from(x) >= dim || u64::from(y) >= dim {
        return Err(ProviderError::InvalidTile(format!(
            "tile {}/{}/{} is outside the {}x{} grid",
            z, x, y, dim, dim
        )));
    }

    Ok(())
}

fn web_mercator_extent(z: u8, x: u32, y: u32) -> Extent {
    let size = (WEB_MERCATOR_MAX_EXTENT * 2.0) / 2f64.powi(i32::from(z));

    let min_x = -WEB_MERCATOR_MAX_EXTENT + f64::from(x) * size;
    let max_y = WEB_MERCATOR_MAX_EXTENT - f64::from(y) * size;

    Extent::new(min_x, max_y - size, min_x + size, max_y)
}
