//! Tag definitions offered by the dashboard's filter bar.

use super::Database;
use crate::model::TagDefinition;
use anyhow::Result;
use chrono::{DateTime, Utc};

impl Database {
    pub async fn fetch_tags(&self) -> Result<Vec<TagDefinition>> {
        let rows: Vec<(String, DateTime<Utc>)> =
            sqlx::query_as("SELECT tag, created_at FROM tag_definitions ORDER BY created_at, tag")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows
            .into_iter()
            .map(|(tag, created_at)| TagDefinition {
                tag,
                created_at: Some(created_at),
            })
            .collect())
    }

    /// Returns `false` if the tag already exists.
    pub async fn insert_tag(&self, tag: &str) -> Result<bool> {
        let result =
            sqlx::query("INSERT INTO tag_definitions (tag) VALUES ($1) ON CONFLICT DO NOTHING")
                .bind(tag)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn remove_tag(&self, tag: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM tag_definitions WHERE tag = $1")
            .bind(tag)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
