//! Status documents, one row per hostname.
//!
//! The document body is JSONB; `tags` is mirrored into a `TEXT[]` column so the
//! containment filter (`tags @> $1`) can use the GIN index. The timestamp
//! columns are authoritative and are copied onto the document on read.

use super::Database;
use crate::model::ServerStatusDocument;
use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::types::Json;

type StatusRow = (Json<ServerStatusDocument>, DateTime<Utc>, DateTime<Utc>);

fn from_row((Json(mut doc), created_at, updated_at): StatusRow) -> ServerStatusDocument {
    doc.created_at = Some(created_at);
    doc.updated_at = Some(updated_at);
    doc
}

impl Database {
    pub async fn fetch_status(&self, hostname: &str) -> Result<Option<ServerStatusDocument>> {
        let row: Option<StatusRow> = sqlx::query_as(
            "SELECT document, created_at, updated_at FROM server_status WHERE hostname = $1",
        )
        .bind(hostname)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(from_row))
    }

    /// Insert or replace a document, keeping the original `created_at`.
    pub async fn upsert_status(&self, doc: &ServerStatusDocument) -> Result<()> {
        sqlx::query(
            "INSERT INTO server_status (hostname, document, tags, created_at, updated_at)
             VALUES ($1, $2, $3, NOW(), NOW())
             ON CONFLICT (hostname) DO UPDATE SET
               document = EXCLUDED.document, tags = EXCLUDED.tags, updated_at = NOW()",
        )
        .bind(&doc.hostname)
        .bind(Json(doc))
        .bind(&doc.tags)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Documents carrying every tag in `tags` (all documents when empty),
    /// most recently updated first.
    pub async fn fetch_status_filtered(&self, tags: &[String]) -> Result<Vec<ServerStatusDocument>> {
        let rows: Vec<StatusRow> = sqlx::query_as(
            "SELECT document, created_at, updated_at FROM server_status
             WHERE tags @> $1::text[]
             ORDER BY updated_at DESC, hostname",
        )
        .bind(tags)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(from_row).collect())
    }
}
