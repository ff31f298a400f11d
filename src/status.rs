//! # Status: Categorical Health Derivation
//!
//! Maps the latest values on a [`ServerStatusDocument`] to one of four states.
//! `UNKNOWN` means the instrumentation could not determine the state (probe
//! failure, no data yet) and must be rendered differently from `DOWN`.
//!
//! | Check | DOWN | WARNING | UNKNOWN |
//! |-------|------|---------|---------|
//! | services | no services, or all down | some down |: |
//! | database | all not ONLINE | some not ONLINE | disabled / no data |
//! | disk | used/capacity > 0.98 | > 0.90 | no data / sentinel |
//! | memory | swap > 0.98 and mem > 0.98 | swap > 0.98 and mem > 0.95 | no data / both sentinel |

use crate::model::{
    DatabaseStatus, DiskUsageForNode, MemoryPressureForNode, NodeState, ServerStatusDocument,
    ServiceStatus, SENTINEL,
};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthStatus {
    Up,
    Warning,
    Down,
    Unknown,
}

impl HealthStatus {
    fn severity(self) -> u8 {
        match self {
            HealthStatus::Up => 0,
            HealthStatus::Unknown => 1,
            HealthStatus::Warning => 2,
            HealthStatus::Down => 3,
        }
    }

    /// The more severe of two states (`DOWN > WARNING > UNKNOWN > UP`).
    pub fn worst(self, other: HealthStatus) -> HealthStatus {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }

    fn from_counts(bad: usize, total: usize) -> HealthStatus {
        if bad == 0 {
            HealthStatus::Up
        } else if bad == total {
            HealthStatus::Down
        } else {
            HealthStatus::Warning
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Up => write!(f, "UP"),
            HealthStatus::Warning => write!(f, "WARNING"),
            HealthStatus::Down => write!(f, "DOWN"),
            HealthStatus::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

pub fn services_status(services: &[ServiceStatus], node: &str, alias: &str) -> HealthStatus {
    if services.is_empty() {
        return HealthStatus::Down;
    }
    let matches = |name: &str| name == node || (!alias.is_empty() && name == alias);
    let down = services
        .iter()
        .filter(|service| {
            service.nodes.is_empty()
                || service
                    .nodes
                    .iter()
                    .any(|n| matches(&n.node_name) && n.status == NodeState::Down)
        })
        .count();
    HealthStatus::from_counts(down, services.len())
}

pub fn database_status(show_database_info: bool, databases: &[DatabaseStatus]) -> HealthStatus {
    if !show_database_info || databases.is_empty() {
        return HealthStatus::Unknown;
    }
    let offline = databases
        .iter()
        .filter(|db| !db.status.eq_ignore_ascii_case("ONLINE"))
        .count();
    HealthStatus::from_counts(offline, databases.len())
}

pub fn disk_status(disk_usage: &[DiskUsageForNode], node: &str) -> HealthStatus {
    if disk_usage.is_empty() {
        return HealthStatus::Unknown;
    }
    let Some(entry) = disk_usage.iter().find(|d| d.node_name == node) else {
        return HealthStatus::Up;
    };
    let Some(&last) = entry.used_samples.last() else {
        return HealthStatus::Unknown;
    };
    if last == SENTINEL || entry.capacity_gb <= 0.0 {
        return HealthStatus::Unknown;
    }
    let ratio = last / entry.capacity_gb;
    if ratio > 0.98 {
        HealthStatus::Down
    } else if ratio > 0.90 {
        HealthStatus::Warning
    } else {
        HealthStatus::Up
    }
}

fn usage_ratio(used: f64, total: f64) -> f64 {
    if total > 0.0 {
        used / total
    } else {
        0.0
    }
}

pub fn memory_status(memory_pressure: &[MemoryPressureForNode], node: &str) -> HealthStatus {
    if memory_pressure.is_empty() {
        return HealthStatus::Unknown;
    }
    let Some(entry) = memory_pressure.iter().find(|m| m.node_name == node) else {
        return HealthStatus::Up;
    };
    let (Some(&memory_used), Some(&swap_used)) = (
        entry.memory_used_samples.last(),
        entry.swap_used_samples.last(),
    ) else {
        return HealthStatus::Unknown;
    };
    if memory_used == SENTINEL && swap_used == SENTINEL {
        return HealthStatus::Unknown;
    }
    let memory_ratio = usage_ratio(memory_used, entry.memory_total_mb);
    let swap_ratio = usage_ratio(swap_used, entry.swap_total_mb);
    if swap_ratio > 0.98 && memory_ratio > 0.98 {
        HealthStatus::Down
    } else if swap_ratio > 0.98 && memory_ratio > 0.95 {
        HealthStatus::Warning
    } else {
        HealthStatus::Up
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeHealth {
    pub node_name: String,
    pub services: HealthStatus,
    pub database: HealthStatus,
    pub disk: HealthStatus,
    pub memory: HealthStatus,
}

impl NodeHealth {
    pub fn overall(&self) -> HealthStatus {
        self.services
            .worst(self.database)
            .worst(self.disk)
            .worst(self.memory)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerHealth {
    pub hostname: String,
    pub alias: String,
    pub nodes: Vec<NodeHealth>,
    pub overall: HealthStatus,
}

/// Evaluate every node of a document. The database check is server-wide, so
/// it is reported on each node. A disabled database check does not count
/// towards `overall`.
pub fn derive_server_health(doc: &ServerStatusDocument) -> ServerHealth {
    let database = database_status(doc.show_database_info, &doc.database_status);
    let nodes: Vec<NodeHealth> = doc
        .nodes()
        .into_iter()
        .map(|node| NodeHealth {
            services: services_status(&doc.services, &node, &doc.alias),
            database,
            disk: disk_status(&doc.disk_usage, &node),
            memory: memory_status(&doc.memory_pressure, &node),
            node_name: node,
        })
        .collect();

    let overall = nodes
        .iter()
        .map(|n| {
            let status = n.services.worst(n.disk).worst(n.memory);
            if doc.show_database_info {
                status.worst(n.database)
            } else {
                status
            }
        })
        .fold(
            if nodes.is_empty() {
                HealthStatus::Unknown
            } else {
                HealthStatus::Up
            },
            HealthStatus::worst,
        );

    ServerHealth {
        hostname: doc.hostname.clone(),
        alias: doc.alias.clone(),
        nodes,
        overall,
    }
}
