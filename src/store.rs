//! # Store: Registration and Status Persistence
//!
//! [`StatusStore`] is the document-store seam used by the coordinator and the
//! API. Two implementations exist:
//!
//! - [`crate::db::Database`]: PostgreSQL, JSONB documents keyed by hostname.
//! - [`MemoryStore`]: in-process maps with the same semantics, used by tests
//!   and by `serve --ephemeral`.
//!
//! Semantics shared by both:
//!
//! - `create_server_meta` returns `false` when the hostname already exists.
//! - `put_status` is an upsert that keeps the original `createdAt` and stamps
//!   `updatedAt`.
//! - `list_status*` return documents newest-updated first.
//! - `delete_server` removes the meta record and its status document together.

use crate::model::{ServerMeta, ServerStatusDocument, TagDefinition};
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[async_trait]
pub trait StatusStore: Send + Sync {
    // ── Server registrations ────────────────────────────────────
    async fn create_server_meta(&self, meta: &ServerMeta) -> Result<bool>;
    async fn get_server_meta(&self, hostname: &str) -> Result<Option<ServerMeta>>;
    async fn list_server_meta(&self) -> Result<Vec<ServerMeta>>;
    /// Replace the tag list on both records. Returns `false` for an unknown hostname.
    async fn update_server_tags(&self, hostname: &str, tags: &[String]) -> Result<bool>;
    async fn delete_server(&self, hostname: &str) -> Result<bool>;

    // ── Status documents ────────────────────────────────────────
    async fn get_status(&self, hostname: &str) -> Result<Option<ServerStatusDocument>>;
    async fn put_status(&self, doc: &ServerStatusDocument) -> Result<()>;
    async fn list_status(&self) -> Result<Vec<ServerStatusDocument>>;
    async fn list_status_with_tags(&self, tags: &[String]) -> Result<Vec<ServerStatusDocument>>;

    // ── Tag definitions ─────────────────────────────────────────
    async fn list_tags(&self) -> Result<Vec<TagDefinition>>;
    async fn add_tag(&self, tag: &str) -> Result<bool>;
    async fn delete_tag(&self, tag: &str) -> Result<bool>;

    async fn health_check(&self) -> Result<()>;
}

#[derive(Default)]
struct MemoryState {
    metas: HashMap<String, ServerMeta>,
    status: HashMap<String, ServerStatusDocument>,
    tags: Vec<TagDefinition>,
}

/// In-process [`StatusStore`].
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first(mut docs: Vec<ServerStatusDocument>) -> Vec<ServerStatusDocument> {
    docs.sort_by(|a, b| {
        b.updated_at
            .cmp(&a.updated_at)
            .then_with(|| a.hostname.cmp(&b.hostname))
    });
    docs
}

#[async_trait]
impl StatusStore for MemoryStore {
    async fn create_server_meta(&self, meta: &ServerMeta) -> Result<bool> {
        let mut state = self.state.write().await;
        if state.metas.contains_key(&meta.hostname) {
            return Ok(false);
        }
        let mut meta = meta.clone();
        meta.created_at.get_or_insert_with(Utc::now);
        state.metas.insert(meta.hostname.clone(), meta);
        Ok(true)
    }

    async fn get_server_meta(&self, hostname: &str) -> Result<Option<ServerMeta>> {
        Ok(self.state.read().await.metas.get(hostname).cloned())
    }

    async fn list_server_meta(&self) -> Result<Vec<ServerMeta>> {
        let mut metas: Vec<ServerMeta> = self.state.read().await.metas.values().cloned().collect();
        metas.sort_by(|a, b| a.hostname.cmp(&b.hostname));
        Ok(metas)
    }

    async fn update_server_tags(&self, hostname: &str, tags: &[String]) -> Result<bool> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let Some(meta) = state.metas.get_mut(hostname) else {
            return Ok(false);
        };
        meta.tags = tags.to_vec();
        if let Some(doc) = state.status.get_mut(hostname) {
            doc.tags = tags.to_vec();
            doc.updated_at = Some(Utc::now());
        }
        Ok(true)
    }

    async fn delete_server(&self, hostname: &str) -> Result<bool> {
        let mut state = self.state.write().await;
        let existed = state.metas.remove(hostname).is_some();
        let had_status = state.status.remove(hostname).is_some();
        Ok(existed || had_status)
    }

    async fn get_status(&self, hostname: &str) -> Result<Option<ServerStatusDocument>> {
        Ok(self.state.read().await.status.get(hostname).cloned())
    }

    async fn put_status(&self, doc: &ServerStatusDocument) -> Result<()> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let mut doc = doc.clone();
        doc.created_at = state
            .status
            .get(&doc.hostname)
            .and_then(|existing| existing.created_at)
            .or(doc.created_at)
            .or(Some(now));
        doc.updated_at = Some(now);
        state.status.insert(doc.hostname.clone(), doc);
        Ok(())
    }

    async fn list_status(&self) -> Result<Vec<ServerStatusDocument>> {
        let docs = self.state.read().await.status.values().cloned().collect();
        Ok(newest_first(docs))
    }

    async fn list_status_with_tags(&self, tags: &[String]) -> Result<Vec<ServerStatusDocument>> {
        let docs = self
            .state
            .read()
            .await
            .status
            .values()
            .filter(|d| d.has_all_tags(tags))
            .cloned()
            .collect();
        Ok(newest_first(docs))
    }

    async fn list_tags(&self) -> Result<Vec<TagDefinition>> {
        Ok(self.state.read().await.tags.clone())
    }

    async fn add_tag(&self, tag: &str) -> Result<bool> {
        let mut state = self.state.write().await;
        if state.tags.iter().any(|t| t.tag == tag) {
            return Ok(false);
        }
        state.tags.push(TagDefinition {
            tag: tag.to_string(),
            created_at: Some(Utc::now()),
        });
        Ok(true)
    }

    async fn delete_tag(&self, tag: &str) -> Result<bool> {
        let mut state = self.state.write().await;
        let before = state.tags.len();
        state.tags.retain(|t| t.tag != tag);
        Ok(state.tags.len() != before)
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}
