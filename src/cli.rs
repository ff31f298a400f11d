//! # CLI Execution Functions
//!
//! Execution logic for each subcommand, kept out of `main.rs`. Shared wiring
//! (settings file, status store, probes, coordinator) lives here too.

use anyhow::Result;
use fleetpulse::config::{self, FleetConfig};
use fleetpulse::coordinator::{Cadence, Coordinator};
use fleetpulse::dashboard::{self, AppState};
use fleetpulse::db::Database;
use fleetpulse::dbprobe::{PgDatabaseProbe, PoolRegistry};
use fleetpulse::prom_metrics::Metrics;
use fleetpulse::registry::HttpRegistryProbe;
use fleetpulse::shell::SshShell;
use fleetpulse::store::{MemoryStore, StatusStore};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use super::{CadenceArg, Cli};

fn load_config(cli: &Cli) -> Result<FleetConfig> {
    config::load_or_default(&cli.config)
        .map_err(|e| anyhow::anyhow!("invalid settings in {}: {}", cli.config.display(), e))
}

fn database_url(cli: &Cli) -> Result<&str> {
    cli.database_url
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is required (set via --database-url or env)"))
}

async fn connect_database(cli: &Cli) -> Result<Database> {
    let database = Database::connect(database_url(cli)?).await?;
    database.migrate().await?;
    Ok(database)
}

async fn open_store(cli: &Cli, ephemeral: bool) -> Result<Arc<dyn StatusStore>> {
    if ephemeral {
        info!("using in-memory status store");
        return Ok(Arc::new(MemoryStore::new()));
    }
    Ok(Arc::new(connect_database(cli).await?))
}

/// Wire the real probes around `store`.
fn build_coordinator(
    config: &FleetConfig,
    store: Arc<dyn StatusStore>,
    metrics: Arc<Metrics>,
) -> Result<Arc<Coordinator>> {
    let shell = Arc::new(SshShell::new(config.shell_settings()));
    let registry = Arc::new(HttpRegistryProbe::new(config.registry_settings())?);
    let databases = Arc::new(PgDatabaseProbe::new(
        Arc::new(PoolRegistry::new()),
        config.db_probe_settings(),
    ));
    Ok(Arc::new(Coordinator::new(
        store,
        shell,
        registry,
        databases,
        config.probe_settings(),
        metrics,
    )))
}

pub async fn run_serve(
    cli: &Cli,
    port: Option<u16>,
    static_dir: Option<&Path>,
    no_scheduler: bool,
    ephemeral: bool,
) -> Result<()> {
    let config = load_config(cli)?;
    let store = open_store(cli, ephemeral).await?;
    let metrics = Arc::new(Metrics::new());
    let coordinator = build_coordinator(&config, store, metrics.clone())?;
    let state = AppState::new(coordinator, metrics);

    let port = port.unwrap_or(config.dashboard.port);
    let static_dir = static_dir.or(config.dashboard.static_dir.as_deref());
    let scheduler = (!no_scheduler).then(|| config.scheduler_settings());
    dashboard::run(port, state, scheduler, static_dir).await
}

pub async fn run_refresh(cli: &Cli, hostname: &str) -> Result<()> {
    let config = load_config(cli)?;
    let store = open_store(cli, false).await?;
    let coordinator = build_coordinator(&config, store, Arc::new(Metrics::new()))?;
    match coordinator.refresh_now(hostname).await? {
        Some(doc) => {
            println!("{}", serde_json::to_string_pretty(&doc)?);
            Ok(())
        }
        None => anyhow::bail!("server {} is not registered", hostname),
    }
}

pub async fn run_cycle(cli: &Cli, cadence: CadenceArg) -> Result<()> {
    let cadence = match cadence {
        CadenceArg::Full => Cadence::Full,
        CadenceArg::Fast => Cadence::Fast,
    };
    let config = load_config(cli)?;
    let store = open_store(cli, false).await?;
    let coordinator = build_coordinator(&config, store, Arc::new(Metrics::new()))?;
    let summary = coordinator.run_cycle(cadence).await?;
    println!("{}", serde_json::to_string(&summary)?);
    Ok(())
}

pub async fn run_migrate(cli: &Cli) -> Result<()> {
    connect_database(cli).await?;
    println!("schema up to date");
    Ok(())
}

pub fn run_check_config(cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;
    if !cli.config.exists() {
        eprintln!(
            "{} not found, showing built-in defaults",
            cli.config.display()
        );
    }
    print!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}
