//! Shared test helpers for integration tests.
//!
//! Probe fakes let the coordinator and the API run without SSH, a registry or
//! a database server. The PostgreSQL helpers are only used by tests gated on
//! `TEST_DATABASE_URL`.

#![allow(dead_code)]

use async_trait::async_trait;
use fleetpulse::coordinator::{Coordinator, ProbeSettings};
use fleetpulse::dashboard::AppState;
use fleetpulse::db::Database;
use fleetpulse::dbprobe::{DatabaseProbe, DbProbeError};
use fleetpulse::model::{
    DatabaseStatus, NodeState, ServerMeta, ServerStatusDocument, ServiceNode, ServiceStatus,
    TagDefinition,
};
use fleetpulse::prom_metrics::Metrics;
use fleetpulse::registry::{RegistryError, RegistryProbe};
use fleetpulse::shell::{RemoteShell, ShellError};
use fleetpulse::store::{MemoryStore, StatusStore};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use tokio::sync::Notify;

// ── Probe fakes ─────────────────────────────────────────────────

pub const DF_OUTPUT: &str = "\
Filesystem                   Size  Used Avail Use% Mounted on
devtmpfs                     5.8G     0  5.8G   0% /dev
/dev/mapper/vg_root-lv_root   20G  8.1G   11G  43% /
/dev/mapper/vg_pss-lv_pss    100G   42G   58G  42% /pss
";

pub const FREE_OUTPUT: &str = "\
              total        used        free      shared  buff/cache   available
Mem:          15885        6400        1214         401        8270        8746
Swap:          4095         512        3583
";

pub const SUPERVISOR_OUTPUT: &str = "\
pss-api                          RUNNING   pid 1234, uptime 2 days, 3:04:05
pss-worker                       FATAL     Exited too quickly
";

pub const RPM_OUTPUT: &str = "pss-org-services-4.2.1-3.el8.x86_64\n";

pub fn df_output(capacity: &str, used: &str) -> String {
    format!(
        "Filesystem Size Used Avail Use% Mounted on\n/dev/sdb1 {capacity} {used} 1G 50% /pss\n"
    )
}

/// Scripted [`RemoteShell`]: answers per (command, host), fails for anything
/// not scripted or explicitly marked as failing.
#[derive(Default)]
pub struct FakeShell {
    outputs: Mutex<HashMap<(String, String), Option<String>>>,
    calls: AtomicUsize,
}

impl FakeShell {
    pub fn respond(&self, command: &str, host: &str, output: &str) {
        self.outputs
            .lock()
            .unwrap()
            .insert((command.to_string(), host.to_string()), Some(output.to_string()));
    }

    pub fn fail(&self, command: &str, host: &str) {
        self.outputs
            .lock()
            .unwrap()
            .insert((command.to_string(), host.to_string()), None);
    }

    /// Script the healthy default outputs for every probe command on `host`.
    pub fn healthy_host(&self, host: &str) {
        self.respond("df -h", host, DF_OUTPUT);
        self.respond("free -m", host, FREE_OUTPUT);
        self.respond("supervisorctl status", host, SUPERVISOR_OUTPUT);
        self.respond("rpm -q pss-org-services", host, RPM_OUTPUT);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteShell for FakeShell {
    async fn run(
        &self,
        command: &str,
        host: &str,
        _username: &str,
        _password: &str,
    ) -> Result<String, ShellError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self
            .outputs
            .lock()
            .unwrap()
            .get(&(command.to_string(), host.to_string()))
            .cloned()
            .flatten();
        scripted.ok_or_else(|| ShellError::Connect {
            host: host.to_string(),
            reason: "connection refused".to_string(),
        })
    }
}

/// [`RegistryProbe`] returning a fixed service list, or failing when unset.
#[derive(Default)]
pub struct FakeRegistry {
    services: Mutex<Option<Vec<ServiceStatus>>>,
}

impl FakeRegistry {
    pub fn set(&self, services: Vec<ServiceStatus>) {
        *self.services.lock().unwrap() = Some(services);
    }

    pub fn fail(&self) {
        *self.services.lock().unwrap() = None;
    }
}

#[async_trait]
impl RegistryProbe for FakeRegistry {
    async fn try_fetch(
        &self,
        _hostname: &str,
        _username: &str,
        _password: &str,
    ) -> Result<Vec<ServiceStatus>, RegistryError> {
        self.services
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| RegistryError::NotSuccess("error".to_string()))
    }
}

/// [`DatabaseProbe`] answering from an in-memory catalog.
#[derive(Default)]
pub struct FakeDatabaseProbe {
    catalog: Mutex<Option<Vec<DatabaseStatus>>>,
    calls: AtomicUsize,
}

impl FakeDatabaseProbe {
    pub fn set(&self, databases: Vec<DatabaseStatus>) {
        *self.catalog.lock().unwrap() = Some(databases);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DatabaseProbe for FakeDatabaseProbe {
    async fn fetch(
        &self,
        host: &str,
        _username: &str,
        _password: &str,
        database_names: &[String],
    ) -> Result<Vec<DatabaseStatus>, DbProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let catalog = self.catalog.lock().unwrap().clone();
        let catalog = catalog.ok_or_else(|| DbProbeError::Connect {
            host: host.to_string(),
            reason: "connection refused".to_string(),
        })?;
        Ok(catalog
            .into_iter()
            .filter(|db| database_names.contains(&db.database_name))
            .collect())
    }

    async fn list_databases(
        &self,
        host: &str,
        _username: &str,
        _password: &str,
    ) -> Result<Vec<String>, DbProbeError> {
        let catalog = self.catalog.lock().unwrap().clone();
        catalog
            .map(|dbs| dbs.into_iter().map(|db| db.database_name).collect())
            .ok_or_else(|| DbProbeError::Connect {
                host: host.to_string(),
                reason: "connection refused".to_string(),
            })
    }
}

// ── Store wrapper ───────────────────────────────────────────────

/// [`StatusStore`] over a [`MemoryStore`] that can park the next `get_status`
/// until released, or fail upcoming `put_status` calls. Lets a test land an
/// API write in the middle of a coordinator read-modify-write.
pub struct GatedStore {
    inner: Arc<MemoryStore>,
    hold_next_read: AtomicBool,
    held: Notify,
    release: Notify,
    failing_puts: AtomicUsize,
}

impl GatedStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        GatedStore {
            inner,
            hold_next_read: AtomicBool::new(false),
            held: Notify::new(),
            release: Notify::new(),
            failing_puts: AtomicUsize::new(0),
        }
    }

    pub fn hold_next_read(&self) {
        self.hold_next_read.store(true, Ordering::SeqCst);
    }

    /// Resolves once a `get_status` call is parked.
    pub async fn wait_until_held(&self) {
        self.held.notified().await;
    }

    pub fn release(&self) {
        self.release.notify_one();
    }

    pub fn fail_next_puts(&self, count: usize) {
        self.failing_puts.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl StatusStore for GatedStore {
    async fn create_server_meta(&self, meta: &ServerMeta) -> anyhow::Result<bool> {
        self.inner.create_server_meta(meta).await
    }

    async fn get_server_meta(&self, hostname: &str) -> anyhow::Result<Option<ServerMeta>> {
        self.inner.get_server_meta(hostname).await
    }

    async fn list_server_meta(&self) -> anyhow::Result<Vec<ServerMeta>> {
        self.inner.list_server_meta().await
    }

    async fn update_server_tags(&self, hostname: &str, tags: &[String]) -> anyhow::Result<bool> {
        self.inner.update_server_tags(hostname, tags).await
    }

    async fn delete_server(&self, hostname: &str) -> anyhow::Result<bool> {
        self.inner.delete_server(hostname).await
    }

    async fn get_status(&self, hostname: &str) -> anyhow::Result<Option<ServerStatusDocument>> {
        if self.hold_next_read.swap(false, Ordering::SeqCst) {
            self.held.notify_one();
            self.release.notified().await;
        }
        self.inner.get_status(hostname).await
    }

    async fn put_status(&self, doc: &ServerStatusDocument) -> anyhow::Result<()> {
        let failing = self
            .failing_puts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            anyhow::bail!("store unavailable");
        }
        self.inner.put_status(doc).await
    }

    async fn list_status(&self) -> anyhow::Result<Vec<ServerStatusDocument>> {
        self.inner.list_status().await
    }

    async fn list_status_with_tags(
        &self,
        tags: &[String],
    ) -> anyhow::Result<Vec<ServerStatusDocument>> {
        self.inner.list_status_with_tags(tags).await
    }

    async fn list_tags(&self) -> anyhow::Result<Vec<TagDefinition>> {
        self.inner.list_tags().await
    }

    async fn add_tag(&self, tag: &str) -> anyhow::Result<bool> {
        self.inner.add_tag(tag).await
    }

    async fn delete_tag(&self, tag: &str) -> anyhow::Result<bool> {
        self.inner.delete_tag(tag).await
    }

    async fn health_check(&self) -> anyhow::Result<()> {
        self.inner.health_check().await
    }
}

// ── Fixtures ────────────────────────────────────────────────────

pub fn standalone(hostname: &str) -> ServerMeta {
    ServerMeta {
        hostname: hostname.to_string(),
        is_cluster: false,
        node_hostnames: Vec::new(),
        registry_username: "registry".to_string(),
        registry_password: "registry-pass".to_string(),
        shell_username: "ops".to_string(),
        shell_password: "ops-pass".to_string(),
        show_database_info: false,
        database_host: String::new(),
        database_username: String::new(),
        database_password: String::new(),
        selected_database_names: Vec::new(),
        tags: Vec::new(),
        created_at: None,
    }
}

pub fn cluster(hostname: &str, nodes: &[&str]) -> ServerMeta {
    ServerMeta {
        is_cluster: true,
        node_hostnames: nodes.iter().map(|n| n.to_string()).collect(),
        ..standalone(hostname)
    }
}

pub fn with_database(mut meta: ServerMeta, names: &[&str]) -> ServerMeta {
    meta.show_database_info = true;
    meta.database_host = "sql.example.com".to_string();
    meta.database_username = "monitor".to_string();
    meta.database_password = "monitor-pass".to_string();
    meta.selected_database_names = names.iter().map(|n| n.to_string()).collect();
    meta
}

pub fn service(name: &str, nodes: &[(&str, NodeState)]) -> ServiceStatus {
    ServiceStatus {
        service_name: name.to_string(),
        nodes: nodes
            .iter()
            .map(|(node, status)| ServiceNode {
                node_name: node.to_string(),
                status: *status,
            })
            .collect(),
    }
}

pub fn online(name: &str) -> DatabaseStatus {
    DatabaseStatus {
        database_name: name.to_string(),
        status: "ONLINE".to_string(),
    }
}

/// A coordinator over an in-memory store and scripted probes.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub shell: Arc<FakeShell>,
    pub registry: Arc<FakeRegistry>,
    pub databases: Arc<FakeDatabaseProbe>,
    pub metrics: Arc<Metrics>,
    pub coordinator: Arc<Coordinator>,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self::build(store.clone(), store)
    }

    /// A harness whose coordinator reads and writes through a [`GatedStore`].
    /// `store` still exposes the underlying memory store.
    pub fn gated() -> (Self, Arc<GatedStore>) {
        let store = Arc::new(MemoryStore::new());
        let gate = Arc::new(GatedStore::new(store.clone()));
        (Self::build(store, gate.clone()), gate)
    }

    fn build(store: Arc<MemoryStore>, coordinator_store: Arc<dyn StatusStore>) -> Self {
        let shell = Arc::new(FakeShell::default());
        let registry = Arc::new(FakeRegistry::default());
        let databases = Arc::new(FakeDatabaseProbe::default());
        let metrics = Arc::new(Metrics::new());
        let coordinator = Arc::new(Coordinator::new(
            coordinator_store,
            shell.clone(),
            registry.clone(),
            databases.clone(),
            ProbeSettings::default(),
            metrics.clone(),
        ));
        Harness {
            store,
            shell,
            registry,
            databases,
            metrics,
            coordinator,
        }
    }

    /// Register `meta` the way the API does, without the follow-up refresh.
    pub async fn register(&self, meta: ServerMeta) {
        self.coordinator
            .register(meta)
            .await
            .expect("registration failed");
    }

    pub fn router(&self) -> axum::Router {
        let state = AppState::new(self.coordinator.clone(), self.metrics.clone());
        fleetpulse::dashboard::build_router(state, None)
    }
}

/// Build an Axum test app over an empty in-memory store.
pub fn build_test_app() -> (axum::Router, Harness) {
    let harness = Harness::new();
    (harness.router(), harness)
}

// ── PostgreSQL ──────────────────────────────────────────────────

/// Returns the test database URL from the `TEST_DATABASE_URL` environment variable.
/// Panics if the variable is not set.
pub fn test_db_url() -> String {
    std::env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL must be set for integration tests")
}

/// Returns true if the test database URL is configured.
pub fn has_test_db() -> bool {
    std::env::var("TEST_DATABASE_URL").is_ok()
}

static SCHEMA_INIT: Once = Once::new();

/// Ensure the test database schema exists (runs once per test binary).
pub fn ensure_schema() {
    SCHEMA_INIT.call_once(|| {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let db = Database::connect(&test_db_url()).await.unwrap();
            db.migrate().await.unwrap();
        });
    });
}

/// Connect to the test database with empty tables.
pub async fn setup_test_db() -> Database {
    ensure_schema();
    let db = Database::connect(&test_db_url())
        .await
        .expect("Failed to connect to test database");
    truncate_all_tables(db.pool()).await;
    db
}

pub async fn truncate_all_tables(pool: &sqlx::PgPool) {
    sqlx::raw_sql("TRUNCATE TABLE server_status, server_meta, tag_definitions")
        .execute(pool)
        .await
        .unwrap();
}

/// Assert helper for store-agnostic tests.
pub async fn status_hostnames(store: &dyn StatusStore, tags: &[String]) -> Vec<String> {
    store
        .list_status_with_tags(tags)
        .await
        .unwrap()
        .into_iter()
        .map(|doc| doc.hostname)
        .collect()
}
