//! TOML configuration structs, parsing, and validation.
//!
//! `fleetpulse.toml` tunes the scheduler, the three probe transports, the
//! monitored mount/package and the dashboard. Every key has a default, so an
//! absent file or an empty section is valid. Secrets never live here: the
//! store URL comes from `DATABASE_URL`, probe credentials from registrations.

use crate::coordinator::ProbeSettings;
use crate::dbprobe::DbProbeSettings;
use crate::registry::RegistrySettings;
use crate::scheduler::SchedulerSettings;
use crate::shell::ShellSettings;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

// ── TOML Configuration Structs ──────────────────────────────────

/// Top-level configuration, one field per TOML section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FleetConfig {
    pub scheduler: SchedulerConfig,
    pub shell: ShellConfig,
    pub registry: RegistryConfig,
    pub database_probe: DatabaseProbeConfig,
    pub probes: ProbesConfig,
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    pub full_interval_secs: u64,
    pub fast_interval_secs: u64,
    pub run_on_startup: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            full_interval_secs: 300,
            fast_interval_secs: 120,
            run_on_startup: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ShellConfig {
    pub port: u16,
    pub connect_timeout_secs: u64,
    pub command_timeout_secs: u64,
}

impl Default for ShellConfig {
    fn default() -> Self {
        ShellConfig {
            port: 22,
            connect_timeout_secs: 10,
            command_timeout_secs: 30,
        }
    }
}

/// The `[registry]` section: where and how the service registry is reached.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegistryConfig {
    pub scheme: String,
    pub port: u16,
    pub path: String,
    pub namespace: String,
    pub timeout_secs: u64,
    pub accept_invalid_certs: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfig {
            scheme: "https".to_string(),
            port: 2443,
            path: "/configuration-service-admin/cluster/nodes".to_string(),
            namespace: "/serviceRegistry".to_string(),
            timeout_secs: 5,
            accept_invalid_certs: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseProbeConfig {
    pub catalog: String,
    pub default_port: u16,
    pub connect_timeout_secs: u64,
    pub query_timeout_secs: u64,
    pub max_connections: u32,
}

impl Default for DatabaseProbeConfig {
    fn default() -> Self {
        DatabaseProbeConfig {
            catalog: "postgres".to_string(),
            default_port: 5432,
            connect_timeout_secs: 10,
            query_timeout_secs: 10,
            max_connections: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProbesConfig {
    pub disk_mount_path: String,
    pub version_package: String,
}

impl Default for ProbesConfig {
    fn default() -> Self {
        ProbesConfig {
            disk_mount_path: "/pss".to_string(),
            version_package: "pss-org-services".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DashboardConfig {
    pub port: u16,
    pub static_dir: Option<PathBuf>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        DashboardConfig {
            port: 8000,
            static_dir: None,
        }
    }
}

// ── Conversions into component settings ─────────────────────────

impl FleetConfig {
    pub fn scheduler_settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            full_interval: Duration::from_secs(self.scheduler.full_interval_secs),
            fast_interval: Duration::from_secs(self.scheduler.fast_interval_secs),
            run_on_startup: self.scheduler.run_on_startup,
        }
    }

    pub fn shell_settings(&self) -> ShellSettings {
        ShellSettings {
            port: self.shell.port,
            connect_timeout: Duration::from_secs(self.shell.connect_timeout_secs),
            command_timeout: Duration::from_secs(self.shell.command_timeout_secs),
        }
    }

    pub fn registry_settings(&self) -> RegistrySettings {
        RegistrySettings {
            scheme: self.registry.scheme.clone(),
            port: self.registry.port,
            path: self.registry.path.clone(),
            namespace: self.registry.namespace.clone(),
            timeout: Duration::from_secs(self.registry.timeout_secs),
            accept_invalid_certs: self.registry.accept_invalid_certs,
        }
    }

    pub fn db_probe_settings(&self) -> DbProbeSettings {
        DbProbeSettings {
            catalog: self.database_probe.catalog.clone(),
            default_port: self.database_probe.default_port,
            connect_timeout: Duration::from_secs(self.database_probe.connect_timeout_secs),
            query_timeout: Duration::from_secs(self.database_probe.query_timeout_secs),
            max_connections: self.database_probe.max_connections,
        }
    }

    pub fn probe_settings(&self) -> ProbeSettings {
        ProbeSettings {
            disk_mount_path: self.probes.disk_mount_path.clone(),
            version_package: self.probes.version_package.clone(),
        }
    }
}

// ── TOML Parsing ────────────────────────────────────────────────

/// Parse a configuration from a TOML string.
pub fn parse_toml(content: &str) -> Result<FleetConfig> {
    let config: FleetConfig = toml::from_str(content)?;
    validate_config(&config)?;
    Ok(config)
}

pub fn parse_toml_file(path: &Path) -> Result<FleetConfig> {
    let content = std::fs::read_to_string(path)?;
    parse_toml(&content)
}

/// Load `path` if it exists, otherwise fall back to defaults.
pub fn load_or_default(path: &Path) -> Result<FleetConfig> {
    if path.exists() {
        parse_toml_file(path)
    } else {
        Ok(FleetConfig::default())
    }
}

fn validate_config(config: &FleetConfig) -> Result<()> {
    let positive = [
        ("scheduler.full_interval_secs", config.scheduler.full_interval_secs),
        ("scheduler.fast_interval_secs", config.scheduler.fast_interval_secs),
        ("shell.connect_timeout_secs", config.shell.connect_timeout_secs),
        ("shell.command_timeout_secs", config.shell.command_timeout_secs),
        ("registry.timeout_secs", config.registry.timeout_secs),
        (
            "database_probe.connect_timeout_secs",
            config.database_probe.connect_timeout_secs,
        ),
        (
            "database_probe.query_timeout_secs",
            config.database_probe.query_timeout_secs,
        ),
        (
            "database_probe.max_connections",
            u64::from(config.database_probe.max_connections),
        ),
    ];
    for (key, value) in positive {
        if value == 0 {
            anyhow::bail!("{key} must be greater than zero");
        }
    }

    if !matches!(config.registry.scheme.as_str(), "http" | "https") {
        anyhow::bail!(
            "registry.scheme must be 'http' or 'https', got '{}'",
            config.registry.scheme
        );
    }
    if !config.registry.path.starts_with('/') {
        anyhow::bail!("registry.path must start with '/'");
    }
    if config.probes.disk_mount_path.trim().is_empty() {
        anyhow::bail!("probes.disk_mount_path is required");
    }
    if config.probes.version_package.trim().is_empty() {
        anyhow::bail!("probes.version_package is required");
    }
    if config.database_probe.catalog.trim().is_empty() {
        anyhow::bail!("database_probe.catalog is required");
    }
    Ok(())
}
