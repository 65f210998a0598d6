//! Dialect-free row model shared by the decoder and the row sources.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use temps_tiles::Result;

/// Typed column value as read from a result row
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Timestamp(DateTime<Utc>),
    Json(serde_json::Value),
    /// Embedded key/value map (e.g. hstore); values may be null
    KeyValue(Vec<(String, Option<String>)>),
}

/// Name and backend type of a result column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDesc {
    pub name: String,
    pub type_name: String,
}

impl ColumnDesc {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }
}

/// One result row: column descriptions paired with values by position
#[derive(Debug, Clone, PartialEq)]
pub struct SqlRow {
    pub columns: Vec<ColumnDesc>,
    pub values: Vec<SqlValue>,
}

impl SqlRow {
    pub fn new(columns: Vec<ColumnDesc>, values: Vec<SqlValue>) -> Self {
        Self { columns, values }
    }

    /// Value of the named column, if present
    pub fn get(&self, name: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .position(|c| c.name == name)
            .and_then(|idx| self.values.get(idx))
    }
}

/// Rows of one executing query. Dropping the stream abandons the query and
/// releases its connection.
pub type RowStream = BoxStream<'static, Result<SqlRow>>;

/// Executes synthesized SQL and streams typed rows back
#[async_trait]
pub trait RowSource: Send + Sync {
    /// Start executing `sql`
    async fn query(&self, sql: &str) -> Result<RowStream>;

    /// Release pooled connections; later queries fail
    async fn close(&self);
}
