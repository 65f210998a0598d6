//! Query template tokens and per-request substitution.
//!
//! Only numeric values computed from the request are spliced into a
//! template: coordinates, zoom, SRIDs and derived scale metrics.

use once_cell::sync::Lazy;
use regex::Regex;
use temps_tiles::tile::{scale_denominator, DEFAULT_TILE_EXTENT, WEB_MERCATOR_MAX_EXTENT};
use temps_tiles::{Bounder, Extent, ProviderError, Result, Tile};

pub const BBOX_TOKEN: &str = "!BBOX!";
pub const ZOOM_TOKEN: &str = "!ZOOM!";
pub const SCALE_DENOMINATOR_TOKEN: &str = "!SCALE_DENOMINATOR!";
pub const PIXEL_WIDTH_TOKEN: &str = "!PIXEL_WIDTH!";
pub const PIXEL_HEIGHT_TOKEN: &str = "!PIXEL_HEIGHT!";

const KNOWN_TOKENS: [&str; 5] = [
    BBOX_TOKEN,
    ZOOM_TOKEN,
    SCALE_DENOMINATOR_TOKEN,
    PIXEL_WIDTH_TOKEN,
    PIXEL_HEIGHT_TOKEN,
];

static TOKEN_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"![A-Z_]+!").expect("token pattern is a valid regex"));

/// Values substituted into a template for one request
#[derive(Debug, Clone, PartialEq)]
pub struct QueryBounds {
    pub extent: Extent,
    pub srid: u64,
    pub zoom: u8,
    pub scale_denominator: f64,
    pub pixel_width: f64,
    pub pixel_height: f64,
}

impl QueryBounds {
    /// Bounds of a tile request: the buffered extent and the tile's zoom
    pub fn for_tile(tile: &Tile) -> Self {
        let (extent, srid) = tile.buffered_extent();
        Self {
            extent: *extent,
            srid,
            zoom: tile.zoom(),
            scale_denominator: tile.scale_denominator(),
            pixel_width: tile.pixel_width(),
            pixel_height: tile.pixel_height(),
        }
    }

    /// Bounds of a tile-less streaming request. A missing extent covers
    /// everything; zoom is 0 and the pixel metrics fall back to the zoom 0
    /// tile when the extent is not finite.
    pub fn for_stream(bounds: &Bounder, layer_srid: u64) -> Self {
        let extent = bounds.extent.unwrap_or_else(Extent::unbounded);
        let world_pixel = (WEB_MERCATOR_MAX_EXTENT * 2.0) / f64::from(DEFAULT_TILE_EXTENT);

        let pixel = |span: f64| {
            let size = span / f64::from(DEFAULT_TILE_EXTENT);
            if size.is_finite() {
                size
            } else {
                world_pixel
            }
        };

        Self {
            extent,
            srid: layer_srid,
            zoom: 0,
            scale_denominator: scale_denominator(0),
            pixel_width: pixel(extent.width()),
            pixel_height: pixel(extent.height()),
        }
    }
}

/// Check a layer template at config time: it must filter on `!BBOX!` and use
/// no unknown tokens
pub fn validate_template(layer: &str, template: &str) -> Result<()> {
    if !template.contains(BBOX_TOKEN) {
        return Err(ProviderError::config(format!(
            "layer {} query must contain the {} token",
            layer, BBOX_TOKEN
        )));
    }

    for found in TOKEN_PATTERN.find_iter(template) {
        if !KNOWN_TOKENS.contains(&found.as_str()) {
            return Err(ProviderError::config(format!(
                "layer {} query uses unknown token {}",
                layer,
                found.as_str()
            )));
        }
    }

    Ok(())
}

/// Substitute every token in `template`. Tokens left over afterwards are a
/// configuration error.
pub fn replace_tokens(template: &str, bounds: &QueryBounds, layer_srid: u64) -> Result<String> {
    let bbox = bbox_predicate(&bounds.extent, bounds.srid, layer_srid)?;

    let sql = template
        .replace(BBOX_TOKEN, &bbox)
        .replace(ZOOM_TOKEN, &bounds.zoom.to_string())
        .replace(
            SCALE_DENOMINATOR_TOKEN,
            &sql_number(bounds.scale_denominator)?,
        )
        .replace(PIXEL_WIDTH_TOKEN, &sql_number(bounds.pixel_width)?)
        .replace(PIXEL_HEIGHT_TOKEN, &sql_number(bounds.pixel_height)?);

    if let Some(left) = TOKEN_PATTERN.find(&sql) {
        return Err(ProviderError::config(format!(
            "unresolved token {} after substitution",
            left.as_str()
        )));
    }

    Ok(sql)
}

/// Envelope predicate for `extent`, reprojected into the layer SRID when the
/// two differ
pub fn bbox_predicate(extent: &Extent, srid: u64, layer_srid: u64) -> Result<String> {
    let envelope = format!(
        "ST_MakeEnvelope({},{},{},{},{})",
        sql_number(extent.min_x)?,
        sql_number(extent.min_y)?,
        sql_number(extent.max_x)?,
        sql_number(extent.max_y)?,
        srid
    );

    if srid == layer_srid {
        Ok(envelope)
    } else {
        Ok(format!("ST_Transform({}, {})", envelope, layer_srid))
    }
}

/// Numeric SQL literal; very large magnitudes use exponent notation
pub fn sql_number(value: f64) -> Result<String> {
    if !value.is_finite() {
        return Err(ProviderError::config(format!(
            "cannot substitute non-finite value {}",
            value
        )));
    }

    if value.abs() >= 1e16 {
        Ok(format!("{:e}", value))
    } else {
        Ok(value.to_string())
    }
}
