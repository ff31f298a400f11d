//! Server registrations. The full [`ServerMeta`] (credentials included) is
//! stored as JSONB; `created_at` is the column value.

use super::Database;
use crate::model::ServerMeta;
use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::types::Json;

type MetaRow = (Json<ServerMeta>, DateTime<Utc>);

fn from_row((Json(mut meta), created_at): MetaRow) -> ServerMeta {
    meta.created_at = Some(created_at);
    meta
}

impl Database {
    /// Insert a registration. Returns `false` if the hostname is taken.
    pub async fn insert_server_meta(&self, meta: &ServerMeta) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO server_meta (hostname, meta) VALUES ($1, $2)
             ON CONFLICT (hostname) DO NOTHING",
        )
        .bind(&meta.hostname)
        .bind(Json(meta))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn fetch_server_meta(&self, hostname: &str) -> Result<Option<ServerMeta>> {
        let row: Option<MetaRow> =
            sqlx::query_as("SELECT meta, created_at FROM server_meta WHERE hostname = $1")
                .bind(hostname)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(from_row))
    }

    pub async fn fetch_all_server_meta(&self) -> Result<Vec<ServerMeta>> {
        let rows: Vec<MetaRow> =
            sqlx::query_as("SELECT meta, created_at FROM server_meta ORDER BY hostname")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(from_row).collect())
    }

    /// Replace the tag list on the registration and on its status document.
    pub async fn replace_server_tags(&self, hostname: &str, tags: &[String]) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query(
            "UPDATE server_meta SET meta = jsonb_set(meta, '{tags}', to_jsonb($2::text[]))
             WHERE hostname = $1",
        )
        .bind(hostname)
        .bind(tags)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if updated == 0 {
            tx.rollback().await?;
            return Ok(false);
        }
        sqlx::query(
            "UPDATE server_status
             SET tags = $2, document = jsonb_set(document, '{tags}', to_jsonb($2::text[])),
                 updated_at = NOW()
             WHERE hostname = $1",
        )
        .bind(hostname)
        .bind(tags)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(true)
    }

    /// Delete a registration together with its status document.
    pub async fn delete_server_cascade(&self, hostname: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let metas = sqlx::query("DELETE FROM server_meta WHERE hostname = $1")
            .bind(hostname)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let docs = sqlx::query("DELETE FROM server_status WHERE hostname = $1")
            .bind(hostname)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;
        Ok(metas + docs > 0)
    }
}
