//! Pooled tokio-postgres connections exposed as a [`RowSource`].

use crate::config::PostgisConfig;
use crate::pg_types::convert_row;
use crate::row::{RowSource, RowStream};
use async_stream::try_stream;
use async_trait::async_trait;
use deadpool::managed::{Manager, Metrics, Object, Pool, RecycleError, RecycleResult};
use futures::StreamExt;
use temps_tiles::{ProviderError, Result};
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, NoTls};
use tracing::{debug, error};

/// Manager for deadpool that opens and health-checks PostgreSQL clients
pub struct PgManager {
    config: tokio_postgres::Config,
}

impl Manager for PgManager {
    type Type = Client;
    type Error = tokio_postgres::Error;

    async fn create(&self) -> std::result::Result<Client, tokio_postgres::Error> {
        let (client, connection) = self.config.connect(NoTls).await?;

        // Spawn connection handler
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("PostgreSQL connection error: {}", e);
            }
        });

        Ok(client)
    }

    async fn recycle(
        &self,
        client: &mut Client,
        _metrics: &Metrics,
    ) -> RecycleResult<tokio_postgres::Error> {
        if client.is_closed() {
            return Err(RecycleError::message("connection closed"));
        }
        Ok(())
    }
}

/// PostgreSQL row source backed by a bounded connection pool
pub struct PgRowSource {
    pool: Pool<PgManager>,
    target: String,
}

impl PgRowSource {
    /// Build the pool. No connection is opened until first use.
    pub fn new(config: &PostgisConfig) -> Result<Self> {
        let manager = PgManager {
            config: config.pg_config(),
        };

        let pool = Pool::builder(manager)
            .max_size(config.max_connections)
            .build()
            .map_err(|e| ProviderError::config(format!("failed to build connection pool: {}", e)))?;

        Ok(Self {
            pool,
            target: config.display_target(),
        })
    }

    async fn checkout(&self) -> Result<Object<PgManager>> {
        self.pool.get().await.map_err(|e| {
            ProviderError::Connection(format!("PostgreSQL {}: {}", self.target, e))
        })
    }

    /// Check out one connection and run a trivial statement
    pub async fn ping(&self) -> Result<()> {
        debug!("Connecting to PostgreSQL: {}", self.target);

        let client = self.checkout().await?;
        client.simple_query("SELECT 1").await.map_err(|e| {
            ProviderError::Connection(format!("PostgreSQL {}: {}", self.target, e))
        })?;

        debug!("Successfully connected to PostgreSQL: {}", self.target);
        Ok(())
    }
}

#[async_trait]
impl RowSource for PgRowSource {
    async fn query(&self, sql: &str) -> Result<RowStream> {
        let client = self.checkout().await?;

        debug!("Executing query: {}", sql);
        let rows = client
            .query_raw(sql, std::iter::empty::<&(dyn ToSql + Sync)>())
            .await
            .map_err(|e| ProviderError::query(e.to_string()))?;

        // The stream owns the pooled client; dropping it returns the connection
        let stream: RowStream = Box::pin(try_stream! {
            let _client = client;
            futures::pin_mut!(rows);
            while let Some(row) = rows.next().await {
                let row = row.map_err(|e| ProviderError::query(e.to_string()))?;
                yield convert_row(&row)?;
            }
        });

        Ok(stream)
    }

    async fn close(&self) {
        debug!("Closing PostgreSQL pool: {}", self.target);
        self.pool.close();
    }
}
