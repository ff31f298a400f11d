//! # Model: Server Registrations and Status Documents
//!
//! Two record kinds flow through the engine:
//!
//! - [`ServerMeta`]: what the operator registered (hostname, cluster shape,
//!   credentials, database selection, tags). Immutable except for tags.
//! - [`ServerStatusDocument`]: one per hostname, upserted by the coordinator and
//!   read by the dashboard. Holds the latest service/supervisor/database state
//!   and the rolling disk/memory windows.
//!
//! Both serialize as camelCase JSON, which is also the persisted shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reserved "measurement failed" sample value, distinct from zero usage.
pub const SENTINEL: f64 = -1.0;

// ── Server registration ─────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMeta {
    // Required fields decode as empty so validation reports them all at once.
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub is_cluster: bool,
    #[serde(default)]
    pub node_hostnames: Vec<String>,
    #[serde(default)]
    pub registry_username: String,
    #[serde(default)]
    pub registry_password: String,
    #[serde(default)]
    pub shell_username: String,
    #[serde(default)]
    pub shell_password: String,
    #[serde(default)]
    pub show_database_info: bool,
    #[serde(default)]
    pub database_host: String,
    #[serde(default)]
    pub database_username: String,
    #[serde(default)]
    pub database_password: String,
    #[serde(default)]
    pub selected_database_names: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl ServerMeta {
    /// The hosts probed per node: the member list for clusters, otherwise the
    /// hostname itself.
    pub fn nodes(&self) -> Vec<String> {
        if self.is_cluster {
            self.node_hostnames.clone()
        } else {
            vec![self.hostname.clone()]
        }
    }

    /// Host queried for the installed version. Clusters are assumed homogeneous,
    /// so only the first member is sampled.
    pub fn version_node(&self) -> Option<&str> {
        if self.is_cluster {
            self.node_hostnames.first().map(String::as_str)
        } else {
            Some(self.hostname.as_str())
        }
    }

    /// Enforce the storage invariants: no node list for standalone servers and
    /// no database fields when database info is off.
    pub fn normalized(mut self) -> Self {
        self.hostname = self.hostname.trim().to_ascii_lowercase();
        if self.is_cluster {
            self.node_hostnames = self
                .node_hostnames
                .into_iter()
                .map(|n| n.trim().to_ascii_lowercase())
                .collect();
        } else {
            self.node_hostnames.clear();
        }
        if !self.show_database_info {
            self.database_host.clear();
            self.database_username.clear();
            self.database_password.clear();
            self.selected_database_names.clear();
        }
        let mut seen = std::collections::HashSet::new();
        self.tags
            .retain(|t| !t.trim().is_empty() && seen.insert(t.clone()));
        self
    }

    pub fn view(&self) -> ServerMetaView {
        ServerMetaView {
            hostname: self.hostname.clone(),
            is_cluster: self.is_cluster,
            node_hostnames: self.node_hostnames.clone(),
            show_database_info: self.show_database_info,
            database_host: self.database_host.clone(),
            selected_database_names: self.selected_database_names.clone(),
            tags: self.tags.clone(),
            created_at: self.created_at,
        }
    }
}

/// Credential-free projection of [`ServerMeta`] returned by the API.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMetaView {
    pub hostname: String,
    pub is_cluster: bool,
    pub node_hostnames: Vec<String>,
    pub show_database_info: bool,
    pub database_host: String,
    pub selected_database_names: Vec<String>,
    pub tags: Vec<String>,
    pub created_at: Option<DateTime<Utc>>,
}

// ── Status document ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    Up,
    Down,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceNode {
    pub node_name: String,
    pub status: NodeState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    pub service_name: String,
    #[serde(default)]
    pub nodes: Vec<ServiceNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessStatus {
    pub name: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupervisorNodeStatus {
    pub node_name: String,
    #[serde(default)]
    pub processes: Vec<ProcessStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskUsageForNode {
    pub node_name: String,
    #[serde(rename = "capacityGB")]
    pub capacity_gb: f64,
    #[serde(default)]
    pub used_samples: Vec<f64>,
    #[serde(default)]
    pub sample_timestamps: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryPressureForNode {
    pub node_name: String,
    #[serde(rename = "memoryTotalMB")]
    pub memory_total_mb: f64,
    #[serde(default)]
    pub memory_used_samples: Vec<f64>,
    #[serde(rename = "swapTotalMB")]
    pub swap_total_mb: f64,
    #[serde(default)]
    pub swap_used_samples: Vec<f64>,
    #[serde(default)]
    pub sample_timestamps: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseStatus {
    pub database_name: String,
    pub status: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerStatusDocument {
    pub hostname: String,
    pub alias: String,
    pub is_cluster: bool,
    pub node_hostnames: Vec<String>,
    pub show_database_info: bool,
    pub tags: Vec<String>,
    pub server_version: String,
    pub services: Vec<ServiceStatus>,
    pub supervisor_status: Vec<SupervisorNodeStatus>,
    pub disk_usage: Vec<DiskUsageForNode>,
    pub memory_pressure: Vec<MemoryPressureForNode>,
    pub database_status: Vec<DatabaseStatus>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ServerStatusDocument {
    /// Seed a document from its registration: only hostname, tags and cluster
    /// shape are populated.
    pub fn from_meta(meta: &ServerMeta) -> Self {
        let mut doc = ServerStatusDocument {
            hostname: meta.hostname.clone(),
            ..Default::default()
        };
        doc.apply_meta(meta);
        doc
    }

    /// Refresh the registration-derived fields on an existing document.
    pub fn apply_meta(&mut self, meta: &ServerMeta) {
        self.alias = resolve_alias(&meta.hostname);
        self.is_cluster = meta.is_cluster;
        self.node_hostnames = meta.node_hostnames.clone();
        self.show_database_info = meta.show_database_info;
        self.tags = meta.tags.clone();
    }

    /// Nodes this document reports on.
    pub fn nodes(&self) -> Vec<String> {
        if self.is_cluster {
            self.node_hostnames.clone()
        } else {
            vec![self.hostname.clone()]
        }
    }

    /// Replace the process list of a node in place, or append a new node entry.
    pub fn set_supervisor_status(&mut self, node: &str, processes: Vec<ProcessStatus>) {
        match self
            .supervisor_status
            .iter_mut()
            .find(|s| s.node_name == node)
        {
            Some(entry) => entry.processes = processes,
            None => self.supervisor_status.push(SupervisorNodeStatus {
                node_name: node.to_string(),
                processes,
            }),
        }
    }

    pub fn has_all_tags(&self, tags: &[String]) -> bool {
        tags.iter().all(|t| self.tags.contains(t))
    }
}

/// Display alias for a hostname: the short name when the hostname is fully
/// qualified, otherwise empty.
pub fn resolve_alias(hostname: &str) -> String {
    match hostname.split_once('.') {
        Some((short, _)) if !short.is_empty() && short != hostname => short.to_string(),
        _ => String::new(),
    }
}

/// Operator-managed tag offered for filtering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagDefinition {
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}
