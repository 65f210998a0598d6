//! Row decoding: turns one result row into a [`Feature`].
//!
//! Columns are classified by name against the layer's geometry and id field
//! names. The geometry column is decoded from (E)WKB, the id column fills the
//! feature id, and every other column becomes one or more string tags.
//! Key/value columns (hstore, JSON objects) contribute each inner key as its
//! own tag. Tags are written in column order, so a later column overwrites an
//! earlier tag with the same name.

use crate::row::{SqlRow, SqlValue};
use crate::wkb;
use chrono::{DateTime, Utc};
use temps_tiles::tags::{flatten_json_object, float_tag_value, json_tag_value};
use temps_tiles::{Feature, FeatureId, ProviderError, Result};

/// Column names with special meaning for a layer
#[derive(Debug, Clone, Copy)]
pub struct FieldNames<'a> {
    pub geometry: &'a str,
    pub id: &'a str,
    pub time: Option<&'a str>,
}

/// Decode one row into a feature
pub fn decipher_fields(names: &FieldNames<'_>, row: SqlRow) -> Result<Feature> {
    if row.columns.len() != row.values.len() {
        return Err(ProviderError::decode(format!(
            "row has {} columns but {} values",
            row.columns.len(),
            row.values.len()
        )));
    }

    let mut feature = Feature::new();

    for (column, value) in row.columns.into_iter().zip(row.values) {
        let name = column.name;

        if name == names.geometry {
            feature.geometry = decode_geometry(&name, value)?;
        } else if name == names.id {
            feature.id = decode_id(&name, value)?;
        } else {
            if names.time == Some(name.as_str()) {
                feature.time = decode_time(&name, &value)?;
            }
            add_tags(&mut feature, name, value)?;
        }
    }

    Ok(feature)
}

fn decode_geometry(column: &str, value: SqlValue) -> Result<Option<geo_types::Geometry<f64>>> {
    match value {
        SqlValue::Null => Ok(None),
        SqlValue::Bytes(bytes) => wkb::decode(&bytes).map(Some),
        SqlValue::Text(text) => wkb::decode_hex(&text).map(Some),
        other => Err(ProviderError::decode(format!(
            "geometry column {} holds {}, expected binary geometry",
            column,
            kind_of(&other)
        ))),
    }
}

fn decode_id(column: &str, value: SqlValue) -> Result<Option<FeatureId>> {
    match value {
        SqlValue::Null => Ok(None),
        SqlValue::Int(n) => Ok(Some(match u64::try_from(n) {
            Ok(n) => FeatureId::Number(n),
            Err(_) => FeatureId::Text(n.to_string()),
        })),
        SqlValue::Float(f) if f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64 => {
            Ok(Some(FeatureId::Number(f as u64)))
        }
        SqlValue::Float(f) => Ok(Some(FeatureId::Text(float_tag_value(f)))),
        SqlValue::Text(text) => Ok(Some(FeatureId::parse(&text))),
        other => Err(ProviderError::decode(format!(
            "id column {} holds {}, expected a number or text",
            column,
            kind_of(&other)
        ))),
    }
}

fn decode_time(column: &str, value: &SqlValue) -> Result<Option<DateTime<Utc>>> {
    match value {
        SqlValue::Null => Ok(None),
        SqlValue::Timestamp(ts) => Ok(Some(*ts)),
        SqlValue::Text(text) => DateTime::parse_from_rfc3339(text)
            .map(|ts| Some(ts.with_timezone(&Utc)))
            .map_err(|e| {
                ProviderError::decode(format!(
                    "time column {} value {:?} is not RFC 3339: {}",
                    column, text, e
                ))
            }),
        other => Err(ProviderError::decode(format!(
            "time column {} holds {}, expected a timestamp",
            column,
            kind_of(other)
        ))),
    }
}

fn add_tags(feature: &mut Feature, column: String, value: SqlValue) -> Result<()> {
    match value {
        SqlValue::Null => {}
        SqlValue::Bool(b) => feature.set_tag(column, b.to_string()),
        SqlValue::Int(n) => feature.set_tag(column, n.to_string()),
        SqlValue::Float(f) => feature.set_tag(column, float_tag_value(f)),
        SqlValue::Text(text) => feature.set_tag(column, text),
        SqlValue::Timestamp(ts) => feature.set_tag(column, ts.to_rfc3339()),
        SqlValue::KeyValue(pairs) => {
            for (key, value) in pairs {
                if let Some(value) = value {
                    feature.set_tag(key, value);
                }
            }
        }
        SqlValue::Json(json) if json.is_object() => {
            for (key, value) in flatten_json_object(&json) {
                feature.set_tag(key, value);
            }
        }
        SqlValue::Json(json) => {
            if let Some(value) = json_tag_value(&json) {
                feature.set_tag(column, value);
            }
        }
        SqlValue::Bytes(_) => {
            return Err(ProviderError::decode(format!(
                "column {} is binary; only the geometry column may hold binary data",
                column
            )))
        }
    }

    Ok(())
}

fn kind_of(value: &SqlValue) -> &'static str {
    match value {
        SqlValue::Null => "null",
        SqlValue::Bool(_) => "a boolean",
        SqlValue::Int(_) => "an integer",
        SqlValue::Float(_) => "a float",
        SqlValue::Text(_) => "text",
        SqlValue::Bytes(_) => "binary data",
        SqlValue::Timestamp(_) => "a timestamp",
        SqlValue::Json(_) => "json",
        SqlValue::KeyValue(_) => "a key/value map",
    }
}
