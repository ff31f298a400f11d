//! # Coordinator: Per-Server Update Orchestration
//!
//! For one registered server, runs the probe steps in a fixed order and folds
//! each result into that server's [`ServerStatusDocument`]:
//!
//! | Step | Source | Document field | Cadence |
//! |------|--------|----------------|---------|
//! | services | service registry (hostname) | `services` (replaced) | full |
//! | supervisor | `supervisorctl status` per node | `supervisorStatus` (per node) | full |
//! | database | SQL status query | `databaseStatus` (replaced) | full |
//! | disk | `df -h` per node | `diskUsage` window | fast |
//! | memory | `free -m` per node | `memoryPressure` window | fast |
//! | version | `rpm -q` on the first node | `serverVersion` (non-empty only) | full |
//!
//! ## Failure isolation
//!
//! Probe failures never escape: a failed shell command becomes a sentinel
//! sample (or an empty list), a failed registry or database probe becomes an
//! empty list. A step that fails for any other reason (store error) is logged
//! and the remaining steps still run.
//!
//! ## Single writer per host
//!
//! Every write to a server's records runs under that hostname's async lock in
//! [`HostLocks`]: the probe steps of both cycles and manual refreshes, and the
//! API's register, retag and delete. Probe I/O happens before the lock is
//! taken. A step re-reads the registration under the lock, so it never writes
//! stale tags back and never recreates the document of a deleted server.

use crate::dbprobe::DatabaseProbe;
use crate::model::{ServerMeta, ServerMetaView, ServerStatusDocument};
use crate::parsers::{self, DiskReading, MemoryReading};
use crate::prom_metrics::Metrics;
use crate::registration::{self, RegistrationError};
use crate::registry::RegistryProbe;
use crate::shell::RemoteShell;
use crate::store::StatusStore;
use anyhow::Result;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const DISK_COMMAND: &str = "df -h";
pub const MEMORY_COMMAND: &str = "free -m";
pub const SUPERVISOR_COMMAND: &str = "supervisorctl status";

#[derive(Debug, Clone)]
pub struct ProbeSettings {
    pub disk_mount_path: String,
    pub version_package: String,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        ProbeSettings {
            disk_mount_path: "/pss".to_string(),
            version_package: "pss-org-services".to_string(),
        }
    }
}

impl ProbeSettings {
    pub fn version_command(&self) -> String {
        format!("rpm -q {}", self.version_package)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Step {
    Services,
    Supervisor,
    Database,
    Disk,
    Memory,
    Version,
}

impl Step {
    pub const ALL: [Step; 6] = [
        Step::Services,
        Step::Supervisor,
        Step::Database,
        Step::Disk,
        Step::Memory,
        Step::Version,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Step::Services => "services",
            Step::Supervisor => "supervisor",
            Step::Database => "database",
            Step::Disk => "disk",
            Step::Memory => "memory",
            Step::Version => "version",
        }
    }
}

/// Which steps a scheduled cycle runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Cadence {
    Full,
    Fast,
}

impl Cadence {
    pub fn steps(self) -> &'static [Step] {
        match self {
            Cadence::Full => &[Step::Services, Step::Supervisor, Step::Database, Step::Version],
            Cadence::Fast => &[Step::Disk, Step::Memory],
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Cadence::Full => "full",
            Cadence::Fast => "fast",
        }
    }
}

impl std::fmt::Display for Cadence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One async mutex per hostname, created on demand. Entries are never removed,
/// so a re-registered hostname shares the lock of its previous incarnation.
#[derive(Default)]
pub struct HostLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl HostLocks {
    pub fn for_host(&self, hostname: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .entry(hostname.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleSummary {
    pub cadence: Cadence,
    pub servers: usize,
    pub elapsed: Duration,
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub struct Coordinator {
    store: Arc<dyn StatusStore>,
    shell: Arc<dyn RemoteShell>,
    registry: Arc<dyn RegistryProbe>,
    databases: Arc<dyn DatabaseProbe>,
    settings: ProbeSettings,
    locks: HostLocks,
    metrics: Arc<Metrics>,
}

impl Coordinator {
    pub fn new(
        store: Arc<dyn StatusStore>,
        shell: Arc<dyn RemoteShell>,
        registry: Arc<dyn RegistryProbe>,
        databases: Arc<dyn DatabaseProbe>,
        settings: ProbeSettings,
        metrics: Arc<Metrics>,
    ) -> Self {
        Coordinator {
            store,
            shell,
            registry,
            databases,
            settings,
            locks: HostLocks::default(),
            metrics,
        }
    }

    pub fn store(&self) -> &Arc<dyn StatusStore> {
        &self.store
    }

    pub fn databases(&self) -> &Arc<dyn DatabaseProbe> {
        &self.databases
    }

    /// Validate and store a new server, seeding its document.
    pub async fn register(&self, meta: ServerMeta) -> Result<ServerMetaView, RegistrationError> {
        let meta = meta.normalized();
        let lock = self.locks.for_host(&meta.hostname);
        let _guard = lock.lock().await;
        registration::register_server(self.store.as_ref(), meta).await
    }

    /// Replace a server's tags. `Ok(false)` for an unknown hostname.
    pub async fn update_tags(&self, hostname: &str, tags: Vec<String>) -> Result<bool> {
        let lock = self.locks.for_host(hostname);
        let _guard = lock.lock().await;
        registration::update_tags(self.store.as_ref(), hostname, tags).await
    }

    /// Remove a server and its document. `Ok(false)` for an unknown hostname.
    pub async fn delete_server(&self, hostname: &str) -> Result<bool> {
        let lock = self.locks.for_host(hostname);
        let _guard = lock.lock().await;
        registration::delete_server(self.store.as_ref(), hostname).await
    }

    /// Run `steps` for one server, in order. Step failures are logged, never returned.
    pub async fn update_server(&self, meta: &ServerMeta, steps: &[Step]) {
        for &step in steps {
            debug!(hostname = %meta.hostname, step = step.name(), "running step");
            if let Err(e) = self.run_step(meta, step).await {
                warn!(
                    hostname = %meta.hostname,
                    step = step.name(),
                    error = %e,
                    "update step failed"
                );
            }
        }
    }

    /// Run every step for `hostname` now and return the reloaded document.
    /// `None` if the hostname is not registered.
    pub async fn refresh_now(&self, hostname: &str) -> Result<Option<ServerStatusDocument>> {
        let Some(meta) = self.store.get_server_meta(hostname).await? else {
            return Ok(None);
        };
        self.update_server(&meta, &Step::ALL).await;
        self.store.get_status(hostname).await
    }

    /// One scheduled pass over all registered servers, one server at a time.
    pub async fn run_cycle(&self, cadence: Cadence) -> Result<CycleSummary> {
        let started = Instant::now();
        let metas = self.store.list_server_meta().await?;
        for listed in &metas {
            // Re-read so a server deleted mid-cycle is skipped.
            match self.store.get_server_meta(&listed.hostname).await {
                Ok(Some(meta)) => self.update_server(&meta, cadence.steps()).await,
                Ok(None) => debug!(hostname = %listed.hostname, "server removed during cycle"),
                Err(e) => warn!(hostname = %listed.hostname, error = %e, "cannot load server"),
            }
        }
        let elapsed = started.elapsed();
        self.metrics
            .cycle_finished(cadence.name(), elapsed.as_secs_f64(), metas.len());
        info!(
            cadence = cadence.name(),
            servers = metas.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "polling cycle complete"
        );
        Ok(CycleSummary {
            cadence,
            servers: metas.len(),
            elapsed,
        })
    }

    async fn run_step(&self, meta: &ServerMeta, step: Step) -> Result<()> {
        match step {
            Step::Services => self.update_services(meta).await,
            Step::Supervisor => self.update_supervisor(meta).await,
            Step::Database => self.update_databases(meta).await,
            Step::Disk => self.update_disk(meta).await,
            Step::Memory => self.update_memory(meta).await,
            Step::Version => self.update_version(meta).await,
        }
    }

    /// Load (or seed) the document, apply `change`, write it back, all under
    /// the host lock. Nothing is written for a server deleted in the meantime.
    async fn mutate<F>(&self, meta: &ServerMeta, change: F) -> Result<()>
    where
        F: FnOnce(&mut ServerStatusDocument) + Send,
    {
        let lock = self.locks.for_host(&meta.hostname);
        let _guard = lock.lock().await;

        let Some(current) = self.store.get_server_meta(&meta.hostname).await? else {
            debug!(hostname = %meta.hostname, "server removed; dropping update");
            return Ok(());
        };
        let mut doc = self
            .store
            .get_status(&meta.hostname)
            .await?
            .unwrap_or_else(|| ServerStatusDocument::from_meta(&current));
        doc.apply_meta(&current);
        change(&mut doc);
        self.store.put_status(&doc).await
    }

    /// Per-node variant of [`Self::mutate`]: a failed write is logged and the
    /// remaining nodes still run.
    async fn mutate_node<F>(&self, meta: &ServerMeta, node: &str, step: Step, change: F)
    where
        F: FnOnce(&mut ServerStatusDocument) + Send,
    {
        if let Err(e) = self.mutate(meta, change).await {
            warn!(
                hostname = %meta.hostname,
                node,
                step = step.name(),
                error = %e,
                "cannot store node result"
            );
        }
    }

    async fn shell_output(&self, meta: &ServerMeta, node: &str, command: &str, probe: &str) -> Option<String> {
        match self
            .shell
            .run(command, node, &meta.shell_username, &meta.shell_password)
            .await
        {
            Ok(output) => Some(output),
            Err(e) => {
                self.metrics.probe_failed(probe);
                warn!(hostname = %meta.hostname, node, step = probe, error = %e, "remote command failed");
                None
            }
        }
    }

    async fn update_services(&self, meta: &ServerMeta) -> Result<()> {
        let services = match self
            .registry
            .try_fetch(&meta.hostname, &meta.registry_username, &meta.registry_password)
            .await
        {
            Ok(services) => services,
            Err(e) => {
                self.metrics.probe_failed("registry");
                warn!(hostname = %meta.hostname, error = %e, "service registry unavailable");
                Vec::new()
            }
        };
        self.mutate(meta, move |doc| doc.services = services).await
    }

    async fn update_supervisor(&self, meta: &ServerMeta) -> Result<()> {
        for node in meta.nodes() {
            let processes = self
                .shell_output(meta, &node, SUPERVISOR_COMMAND, "supervisor")
                .await
                .map(|out| parsers::parse_supervisor_status(&out))
                .unwrap_or_default();
            self.mutate_node(meta, &node, Step::Supervisor, |doc| {
                doc.set_supervisor_status(&node, processes)
            })
            .await;
        }
        Ok(())
    }

    async fn update_databases(&self, meta: &ServerMeta) -> Result<()> {
        if !meta.show_database_info {
            return Ok(());
        }
        let statuses = match self
            .databases
            .fetch(
                &meta.database_host,
                &meta.database_username,
                &meta.database_password,
                &meta.selected_database_names,
            )
            .await
        {
            Ok(statuses) => statuses,
            Err(e) => {
                self.metrics.probe_failed("database");
                warn!(hostname = %meta.hostname, error = %e, "database probe failed");
                Vec::new()
            }
        };
        self.mutate(meta, move |doc| doc.database_status = statuses)
            .await
    }

    async fn update_disk(&self, meta: &ServerMeta) -> Result<()> {
        for node in meta.nodes() {
            let reading = match self.shell_output(meta, &node, DISK_COMMAND, "disk").await {
                Some(out) => parsers::parse_disk_usage(&out, &self.settings.disk_mount_path, now_ms()),
                None => DiskReading::unknown(now_ms()),
            };
            self.mutate_node(meta, &node, Step::Disk, |doc| {
                doc.record_disk_sample(&node, &reading)
            })
            .await;
        }
        Ok(())
    }

    async fn update_memory(&self, meta: &ServerMeta) -> Result<()> {
        for node in meta.nodes() {
            let reading = match self.shell_output(meta, &node, MEMORY_COMMAND, "memory").await {
                Some(out) => parsers::parse_memory_usage(&out, now_ms()),
                None => MemoryReading::unknown(now_ms()),
            };
            self.mutate_node(meta, &node, Step::Memory, |doc| {
                doc.record_memory_sample(&node, &reading)
            })
            .await;
        }
        Ok(())
    }

    async fn update_version(&self, meta: &ServerMeta) -> Result<()> {
        let Some(node) = meta.version_node() else {
            return Ok(());
        };
        let version = self
            .shell_output(meta, node, &self.settings.version_command(), "version")
            .await
            .map(|out| parsers::parse_version(&out, &self.settings.version_package))
            .unwrap_or_default();
        if version.is_empty() {
            debug!(hostname = %meta.hostname, "no version reported; keeping previous");
            return Ok(());
        }
        self.mutate(meta, move |doc| doc.server_version = version)
            .await
    }
}
