//! PostgreSQL row conversion into [`SqlValue`]s.
//!
//! Values arrive in the binary protocol. Types tokio-postgres does not decode
//! itself (numeric, PostGIS geometry) get small `FromSql` wrappers.

use crate::row::{ColumnDesc, SqlRow, SqlValue};
use byteorder::{BigEndian, ReadBytesExt};
use std::collections::HashMap;
use std::error::Error;
use std::io::Cursor;
use temps_tiles::{ProviderError, Result};
use tokio_postgres::types::{FromSql, Type};
use tokio_postgres::Row;

type BoxError = Box<dyn Error + Sync + Send>;

/// numeric in binary form, rendered as canonical decimal text
#[derive(Debug, Clone, PartialEq)]
pub struct Numeric(pub String);

const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

impl<'a> FromSql<'a> for Numeric {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> std::result::Result<Self, BoxError> {
        let mut cursor = Cursor::new(raw);
        let ndigits = cursor.read_u16::<BigEndian>()?;
        let weight = cursor.read_i16::<BigEndian>()?;
        let sign = cursor.read_u16::<BigEndian>()?;
        let dscale = cursor.read_u16::<BigEndian>()?;

        match sign {
            NUMERIC_NAN => return Ok(Numeric("NaN".to_string())),
            NUMERIC_PINF => return Ok(Numeric("Infinity".to_string())),
            NUMERIC_NINF => return Ok(Numeric("-Infinity".to_string())),
            _ => {}
        }

        let mut digits = Vec::with_capacity(ndigits as usize);
        for _ in 0..ndigits {
            digits.push(cursor.read_u16::<BigEndian>()?);
        }

        // base-10000 digits; digit i has weight (weight - i)
        let mut int_part = String::new();
        for w in (0..=weight.max(-1)).rev() {
            let idx = (weight - w) as usize;
            let digit = digits.get(idx).copied().unwrap_or(0);
            if int_part.is_empty() {
                int_part.push_str(&digit.to_string());
            } else {
                int_part.push_str(&format!("{:04}", digit));
            }
        }
        if int_part.is_empty() {
            int_part.push('0');
        }

        let mut frac_part = String::new();
        let mut w = -1i32;
        while frac_part.len() < dscale as usize {
            let idx = i32::from(weight) - w;
            let digit = if idx >= 0 {
                digits.get(idx as usize).copied().unwrap_or(0)
            } else {
                0
            };
            frac_part.push_str(&format!("{:04}", digit));
            w -= 1;
        }
        frac_part.truncate(dscale as usize);

        let mut text = String::new();
        if sign == NUMERIC_NEG {
            text.push('-');
        }
        text.push_str(&int_part);
        if !frac_part.is_empty() {
            text.push('.');
            text.push_str(&frac_part);
        }

        Ok(Numeric(text))
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}

/// Raw binary payload of bytea and PostGIS geometry/geography columns
#[derive(Debug, Clone, PartialEq)]
pub struct RawBytes(pub Vec<u8>);

impl<'a> FromSql<'a> for RawBytes {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> std::result::Result<Self, BoxError> {
        Ok(RawBytes(raw.to_vec()))
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::BYTEA || matches!(ty.name(), "geometry" | "geography")
    }
}

/// Convert a PostgreSQL row into a dialect-free [`SqlRow`]
pub fn convert_row(row: &Row) -> Result<SqlRow> {
    let mut columns = Vec::with_capacity(row.len());
    let mut values = Vec::with_capacity(row.len());

    for (idx, column) in row.columns().iter().enumerate() {
        columns.push(ColumnDesc::new(column.name(), column.type_().name()));
        values.push(extract_value(row, idx)?);
    }

    Ok(SqlRow::new(columns, values))
}

/// Extract value from PostgreSQL row
fn extract_value(row: &Row, idx: usize) -> Result<SqlValue> {
    let column = &row.columns()[idx];
    let ty = column.type_();

    let value = match ty.name() {
        "bool" => get::<bool>(row, idx)?.map(SqlValue::Bool),
        "int2" => get::<i16>(row, idx)?.map(|v| SqlValue::Int(i64::from(v))),
        "int4" => get::<i32>(row, idx)?.map(|v| SqlValue::Int(i64::from(v))),
        "int8" => get::<i64>(row, idx)?.map(SqlValue::Int),
        "float4" => get::<f32>(row, idx)?.map(|v| SqlValue::Float(f64::from(v))),
        "float8" => get::<f64>(row, idx)?.map(SqlValue::Float),
        "numeric" => get::<Numeric>(row, idx)?.map(|v| SqlValue::Text(v.0)),
        "varchar" | "text" | "bpchar" | "name" | "citext" => {
            get::<String>(row, idx)?.map(SqlValue::Text)
        }
        "char" => get::<i8>(row, idx)?.map(|v| SqlValue::Text(internal_char(v))),
        "timestamptz" => get::<chrono::DateTime<chrono::Utc>>(row, idx)?.map(SqlValue::Timestamp),
        "timestamp" => get::<chrono::NaiveDateTime>(row, idx)?
            .map(|v| SqlValue::Timestamp(v.and_utc())),
        "date" => get::<chrono::NaiveDate>(row, idx)?.map(|v| SqlValue::Text(v.to_string())),
        "json" | "jsonb" => get::<serde_json::Value>(row, idx)?.map(SqlValue::Json),
        "uuid" => get::<uuid::Uuid>(row, idx)?.map(|v| SqlValue::Text(v.to_string())),
        "hstore" => get::<HashMap<String, Option<String>>>(row, idx)?
            .map(|pairs| SqlValue::KeyValue(pairs.into_iter().collect())),
        "bytea" | "geometry" | "geography" => get::<RawBytes>(row, idx)?.map(|v| SqlValue::Bytes(v.0)),
        other => {
            return Err(ProviderError::decode(format!(
                "column {} has unsupported type {}",
                column.name(),
                other
            )))
        }
    };

    Ok(value.unwrap_or(SqlValue::Null))
}

/// The single-byte `"char"` type, rendered as its character
fn internal_char(value: i8) -> String {
    char::from(value as u8).to_string()
}

fn get<'a, T: FromSql<'a>>(row: &'a Row, idx: usize) -> Result<Option<T>> {
    row.try_get::<_, Option<T>>(idx).map_err(|e| {
        ProviderError::decode(format!(
            "failed to read column {}: {}",
            row.columns()[idx].name(),
            e
        ))
    })
}
