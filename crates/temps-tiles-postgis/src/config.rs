//! Typed PostGIS provider configuration.

use crate::tokens::{validate_template, BBOX_TOKEN};
use serde::{Deserialize, Deserializer};
use std::collections::HashSet;
use temps_tiles::{ProviderConfig, ProviderError, Result, WEB_MERCATOR};

/// Connection settings and the ordered layer list
#[derive(Debug, Clone, Deserialize)]
pub struct PostgisConfig {
    pub host: String,

    #[serde(default = "default_port", deserialize_with = "deserialize_port")]
    pub port: u16,

    pub database: String,

    pub user: String,

    #[serde(default)]
    pub password: String,

    /// Pool size
    #[serde(
        default = "default_max_connections",
        deserialize_with = "deserialize_max_connections"
    )]
    pub max_connections: usize,

    /// Default SRID for layers that do not set their own
    #[serde(default = "default_srid")]
    pub srid: u64,

    pub layers: Vec<LayerConfig>,
}

/// One layer: either a raw `sql` template or a `tablename` to select from
#[derive(Debug, Clone, Deserialize)]
pub struct LayerConfig {
    pub name: String,

    #[serde(default)]
    pub sql: Option<String>,

    #[serde(default)]
    pub tablename: Option<String>,

    /// Extra columns selected from `tablename`
    #[serde(default)]
    pub fields: Vec<String>,

    #[serde(default = "default_geometry_fieldname")]
    pub geometry_fieldname: String,

    #[serde(default = "default_id_fieldname")]
    pub id_fieldname: String,

    #[serde(default)]
    pub srid: Option<u64>,

    #[serde(default)]
    pub time_fieldname: Option<String>,
}

impl PostgisConfig {
    /// Parse and validate a registry config
    pub fn from_provider_config(config: &ProviderConfig) -> Result<Self> {
        let parsed: Self = config.deserialize()?;
        parsed.validate()?;
        Ok(parsed)
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(ProviderError::config("host must not be empty"));
        }
        if self.database.is_empty() {
            return Err(ProviderError::config("database must not be empty"));
        }
        if self.max_connections == 0 {
            return Err(ProviderError::config(
                "max_connections must be greater than zero",
            ));
        }
        if self.layers.is_empty() {
            return Err(ProviderError::config("at least one layer is required"));
        }

        let mut seen = HashSet::new();
        for (idx, layer) in self.layers.iter().enumerate() {
            layer
                .validate()
                .map_err(|e| ProviderError::config(format!("layers[{}]: {}", idx, message(e))))?;

            if !seen.insert(layer.name.as_str()) {
                return Err(ProviderError::config(format!(
                    "layers[{}]: duplicate layer name {}",
                    idx, layer.name
                )));
            }
        }

        Ok(())
    }

    /// Client settings for tokio-postgres
    pub fn pg_config(&self) -> tokio_postgres::Config {
        let mut config = tokio_postgres::Config::new();
        config
            .host(&self.host)
            .port(self.port)
            .dbname(&self.database)
            .user(&self.user)
            .application_name("temps-tiles");
        if !self.password.is_empty() {
            config.password(&self.password);
        }
        config
    }

    /// Connection target for log lines, without credentials
    pub fn display_target(&self) -> String {
        format!("{}@{}:{}/{}", self.user, self.host, self.port, self.database)
    }
}

impl LayerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(ProviderError::missing_key("name"));
        }
        if self.geometry_fieldname.is_empty() {
            return Err(ProviderError::config("geometry_fieldname must not be empty"));
        }
        if self.id_fieldname.is_empty() {
            return Err(ProviderError::config("id_fieldname must not be empty"));
        }
        if self.time_fieldname.as_deref() == Some("") {
            return Err(ProviderError::config("time_fieldname must not be empty"));
        }

        match (&self.sql, &self.tablename) {
            (Some(_), Some(_)) => Err(ProviderError::config(format!(
                "layer {} sets both sql and tablename",
                self.name
            ))),
            (None, None) => Err(ProviderError::config(format!(
                "layer {} needs one of: sql, tablename",
                self.name
            ))),
            (None, Some(table)) if table.is_empty() => {
                Err(ProviderError::config("tablename must not be empty"))
            }
            (None, Some(_)) if self.fields.iter().any(String::is_empty) => {
                Err(ProviderError::config("fields must not contain empty names"))
            }
            _ => validate_template(&self.name, &self.query_template()),
        }
    }

    /// The SQL template, synthesized from `tablename` when no `sql` is given
    pub fn query_template(&self) -> String {
        if let Some(sql) = &self.sql {
            return sql.clone();
        }

        let table = self.tablename.as_deref().unwrap_or_default();
        let geom = quote_ident(&self.geometry_fieldname);

        let mut columns = vec![
            quote_ident(&self.id_fieldname),
            format!("ST_AsBinary({geom}) AS {geom}"),
        ];
        if let Some(time) = &self.time_fieldname {
            columns.push(quote_ident(time));
        }
        columns.extend(
            self.fields
                .iter()
                .filter(|f| {
                    **f != self.id_fieldname
                        && **f != self.geometry_fieldname
                        && Some(f.as_str()) != self.time_fieldname.as_deref()
                })
                .map(|f| quote_ident(f)),
        );

        format!(
            "SELECT {} FROM {} WHERE {} && {}",
            columns.join(", "),
            quote_table(table),
            geom,
            BBOX_TOKEN
        )
    }

    pub fn srid_or(&self, default: u64) -> u64 {
        self.srid.unwrap_or(default)
    }
}

/// Double-quoted SQL identifier
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote each dot-separated part of a (schema-qualified) table name
fn quote_table(table: &str) -> String {
    table
        .split('.')
        .map(quote_ident)
        .collect::<Vec<_>>()
        .join(".")
}

fn message(error: ProviderError) -> String {
    match error {
        ProviderError::Config(msg) => msg,
        other => other.to_string(),
    }
}

fn default_port() -> u16 {
    5432
}

fn default_max_connections() -> usize {
    16
}

fn default_srid() -> u64 {
    WEB_MERCATOR
}

fn default_geometry_fieldname() -> String {
    "geom".to_string()
}

fn default_id_fieldname() -> String {
    "gid".to_string()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    String(String),
    Number(u64),
}

/// Deserialize port from either string or number
fn deserialize_port<'de, D>(deserializer: D) -> std::result::Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let n = match StringOrNumber::deserialize(deserializer)? {
        StringOrNumber::String(s) => s.parse::<u64>().map_err(D::Error::custom)?,
        StringOrNumber::Number(n) => n,
    };
    u16::try_from(n).map_err(|_| D::Error::custom(format!("port {} out of range", n)))
}

/// Deserialize max_connections from either string or number
fn deserialize_max_connections<'de, D>(deserializer: D) -> std::result::Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match StringOrNumber::deserialize(deserializer)? {
        StringOrNumber::String(s) => s.parse::<usize>().map_err(D::Error::custom),
        StringOrNumber::Number(n) => usize::try_from(n).map_err(D::Error::custom),
    }
}
