//! # Database Probe: Per-Host Pooled Status Query
//!
//! Reports whether the operator-selected databases on a SQL host are online.
//! Pools are owned by an explicit [`PoolRegistry`] (one pool per host and
//! login, created on first use and reused for the life of the process) rather
//! than by a global map. Keying by login means an ad hoc listing with other
//! credentials never borrows a pool opened for a registered server.
//!
//! The allow-list of database names is bound as an array parameter, so names
//! never reach the SQL text.

use crate::model::DatabaseStatus;
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgSslMode};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::info;

#[derive(Error, Debug)]
pub enum DbProbeError {
    #[error("cannot connect to database host {host}: {reason}")]
    Connect { host: String, reason: String },

    #[error("status query on {host} failed: {source}")]
    Query {
        host: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("database host {host} timed out after {timeout:?}")]
    Timeout { host: String, timeout: Duration },
}

#[async_trait]
pub trait DatabaseProbe: Send + Sync {
    /// Status of each requested database that exists on `host`.
    async fn fetch(
        &self,
        host: &str,
        username: &str,
        password: &str,
        database_names: &[String],
    ) -> Result<Vec<DatabaseStatus>, DbProbeError>;

    /// All non-template database names on `host`.
    async fn list_databases(
        &self,
        host: &str,
        username: &str,
        password: &str,
    ) -> Result<Vec<String>, DbProbeError>;
}

#[derive(Debug, Clone)]
pub struct DbProbeSettings {
    pub catalog: String,
    pub default_port: u16,
    pub connect_timeout: Duration,
    pub query_timeout: Duration,
    pub max_connections: u32,
}

impl Default for DbProbeSettings {
    fn default() -> Self {
        DbProbeSettings {
            catalog: "postgres".to_string(),
            default_port: 5432,
            connect_timeout: Duration::from_secs(10),
            query_timeout: Duration::from_secs(10),
            max_connections: 2,
        }
    }
}

/// Split `db1:6432` into host and port, falling back to `default_port`.
pub fn split_host_port(host: &str, default_port: u16) -> (String, u16) {
    match host.rsplit_once(':') {
        Some((name, port)) if !name.is_empty() => match port.parse::<u16>() {
            Ok(port) => (name.to_string(), port),
            Err(_) => (host.to_string(), default_port),
        },
        _ => (host.to_string(), default_port),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PoolKey {
    host: String,
    username: String,
    password: String,
}

impl PoolKey {
    fn new(host: &str, username: &str, password: &str) -> Self {
        PoolKey {
            host: host.to_string(),
            username: username.to_string(),
            password: password.to_string(),
        }
    }
}

/// Lazily created connection pools, one per database host and login.
///
/// Concurrent first callers for the same key share a single creation
/// attempt. A failed attempt leaves the slot empty so the next call retries.
#[derive(Default)]
pub struct PoolRegistry {
    pools: Mutex<HashMap<PoolKey, Arc<OnceCell<PgPool>>>>,
}

impl PoolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: PoolKey) -> Arc<OnceCell<PgPool>> {
        let mut pools = self.pools.lock().unwrap_or_else(|e| e.into_inner());
        pools
            .entry(key)
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone()
    }

    pub async fn get_or_connect(
        &self,
        host: &str,
        username: &str,
        password: &str,
        settings: &DbProbeSettings,
    ) -> Result<PgPool, DbProbeError> {
        let slot = self.slot(PoolKey::new(host, username, password));
        let pool = slot
            .get_or_try_init(|| async {
                let (hostname, port) = split_host_port(host, settings.default_port);
                let options = PgConnectOptions::new()
                    .host(&hostname)
                    .port(port)
                    .username(username)
                    .password(password)
                    .database(&settings.catalog)
                    .ssl_mode(PgSslMode::Require);
                let pool = PgPoolOptions::new()
                    .max_connections(settings.max_connections)
                    .acquire_timeout(settings.connect_timeout)
                    .connect_with(options)
                    .await
                    .map_err(|e| DbProbeError::Connect {
                        host: host.to_string(),
                        reason: e.to_string(),
                    })?;
                info!(host, "opened database probe pool");
                Ok::<PgPool, DbProbeError>(pool)
            })
            .await?;
        Ok(pool.clone())
    }

    pub fn len(&self) -> usize {
        self.pools
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|cell| cell.initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct PgDatabaseProbe {
    pools: Arc<PoolRegistry>,
    settings: DbProbeSettings,
}

impl PgDatabaseProbe {
    pub fn new(pools: Arc<PoolRegistry>, settings: DbProbeSettings) -> Self {
        PgDatabaseProbe { pools, settings }
    }

    async fn bounded<T>(
        &self,
        host: &str,
        query: impl std::future::Future<Output = Result<T, sqlx::Error>>,
    ) -> Result<T, DbProbeError> {
        match tokio::time::timeout(self.settings.query_timeout, query).await {
            Ok(Ok(rows)) => Ok(rows),
            Ok(Err(source)) => Err(DbProbeError::Query {
                host: host.to_string(),
                source,
            }),
            Err(_) => Err(DbProbeError::Timeout {
                host: host.to_string(),
                timeout: self.settings.query_timeout,
            }),
        }
    }
}

const STATUS_QUERY: &str = "SELECT datname::text AS name, \
     CASE WHEN datallowconn THEN 'ONLINE' ELSE 'OFFLINE' END AS state \
     FROM pg_database WHERE datname::text = ANY($1) ORDER BY datname";

const LIST_QUERY: &str =
    "SELECT datname::text FROM pg_database WHERE NOT datistemplate ORDER BY datname";

#[async_trait]
impl DatabaseProbe for PgDatabaseProbe {
    async fn fetch(
        &self,
        host: &str,
        username: &str,
        password: &str,
        database_names: &[String],
    ) -> Result<Vec<DatabaseStatus>, DbProbeError> {
        let pool = self
            .pools
            .get_or_connect(host, username, password, &self.settings)
            .await?;
        let rows: Vec<(String, String)> = self
            .bounded(
                host,
                sqlx::query_as(STATUS_QUERY)
                    .bind(database_names.to_vec())
                    .fetch_all(&pool),
            )
            .await?;
        Ok(rows
            .into_iter()
            .map(|(database_name, status)| DatabaseStatus {
                database_name,
                status,
            })
            .collect())
    }

    async fn list_databases(
        &self,
        host: &str,
        username: &str,
        password: &str,
    ) -> Result<Vec<String>, DbProbeError> {
        let pool = self
            .pools
            .get_or_connect(host, username, password, &self.settings)
            .await?;
        self.bounded(host, sqlx::query_scalar(LIST_QUERY).fetch_all(&pool))
            .await
    }
}
