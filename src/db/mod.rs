//! # Database: PostgreSQL Storage Layer
//!
//! Persists server registrations, status documents and tag definitions via
//! `sqlx::PgPool`. Documents are stored as JSONB with a few columns lifted out
//! for querying (tags for containment filters, timestamps for ordering).
//!
//! ## Schema
//!
//! - `server_meta`: hostname, registration JSONB
//! - `server_status`: hostname, status document JSONB, `tags TEXT[]` (GIN), timestamps
//! - `tag_definitions`: operator-defined filter tags
//!
//! The schema lives in `migrations/001_fleet_health.sql` and is applied by
//! [`Database::migrate`].
//!
//! ## Module Structure
//!
//! - [`servers`]: Registration CRUD and cascading delete
//! - [`status`]: Status document upsert and tag-filtered listing
//! - [`tags`]: Tag definition CRUD

mod servers;
mod status;
mod tags;

use crate::model::{ServerMeta, ServerStatusDocument, TagDefinition};
use crate::store::StatusStore;
use anyhow::Result;
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};

const SCHEMA: &str = include_str!("../../migrations/001_fleet_health.sql");

pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect to PostgreSQL using the provided database URL.
    ///
    /// The URL is parsed by hand so percent-encoded credentials survive intact.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let url = url::Url::parse(database_url)?;
        let username = urlencoding::decode(url.username())?.into_owned();
        let password = url
            .password()
            .map(|p| urlencoding::decode(p).map(|s| s.into_owned()))
            .transpose()?;
        let mut opts = PgConnectOptions::new()
            .host(url.host_str().unwrap_or("localhost"))
            .port(url.port().unwrap_or(5432))
            .database(url.path().trim_start_matches('/'))
            .username(&username);
        if let Some(ref pw) = password {
            opts = opts.password(pw);
        }
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await?;
        Ok(Database { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the schema. Every statement is `IF NOT EXISTS`, so this is idempotent.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    /// Health check: execute `SELECT 1` to verify database connectivity.
    ///
    /// Used by the `/readyz` readiness probe.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl StatusStore for Database {
    async fn create_server_meta(&self, meta: &ServerMeta) -> Result<bool> {
        self.insert_server_meta(meta).await
    }

    async fn get_server_meta(&self, hostname: &str) -> Result<Option<ServerMeta>> {
        self.fetch_server_meta(hostname).await
    }

    async fn list_server_meta(&self) -> Result<Vec<ServerMeta>> {
        self.fetch_all_server_meta().await
    }

    async fn update_server_tags(&self, hostname: &str, tags: &[String]) -> Result<bool> {
        self.replace_server_tags(hostname, tags).await
    }

    async fn delete_server(&self, hostname: &str) -> Result<bool> {
        self.delete_server_cascade(hostname).await
    }

    async fn get_status(&self, hostname: &str) -> Result<Option<ServerStatusDocument>> {
        self.fetch_status(hostname).await
    }

    async fn put_status(&self, doc: &ServerStatusDocument) -> Result<()> {
        self.upsert_status(doc).await
    }

    async fn list_status(&self) -> Result<Vec<ServerStatusDocument>> {
        self.fetch_status_filtered(&[]).await
    }

    async fn list_status_with_tags(&self, tags: &[String]) -> Result<Vec<ServerStatusDocument>> {
        self.fetch_status_filtered(tags).await
    }

    async fn list_tags(&self) -> Result<Vec<TagDefinition>> {
        self.fetch_tags().await
    }

    async fn add_tag(&self, tag: &str) -> Result<bool> {
        self.insert_tag(tag).await
    }

    async fn delete_tag(&self, tag: &str) -> Result<bool> {
        self.remove_tag(tag).await
    }

    async fn health_check(&self) -> Result<()> {
        Database::health_check(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_is_idempotent() {
        for line in SCHEMA.lines().filter(|l| l.starts_with("CREATE")) {
            assert!(line.contains("IF NOT EXISTS"), "not idempotent: {}", line);
        }
    }

    #[test]
    fn schema_declares_all_tables() {
        for table in ["server_meta", "server_status", "tag_definitions"] {
            assert!(SCHEMA.contains(&format!("CREATE TABLE IF NOT EXISTS {table}")));
        }
    }
}
