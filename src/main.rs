//! # Main: CLI Entry Point
//!
//! Routes subcommands to the API server, one-shot polling runs, and schema
//! management.
//!
//! ## Global Options
//!
//! - `--database-url` / `DATABASE_URL`: PostgreSQL status store.
//! - `--config`: TOML settings file (defaults apply when it does not exist).

mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "fleetpulse", about = "Poll server fleet health and serve it to a dashboard")]
struct Cli {
    /// PostgreSQL connection URL (or set DATABASE_URL env var)
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Path to the TOML settings file
    #[arg(long, default_value = "fleetpulse.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum CadenceArg {
    /// Services, supervisor, database and version
    Full,
    /// Disk and memory
    Fast,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the JSON API and run the polling scheduler
    Serve {
        /// Port to listen on (overrides dashboard.port)
        #[arg(long)]
        port: Option<u16>,
        /// Directory with the built frontend (overrides dashboard.static_dir)
        #[arg(long)]
        static_dir: Option<PathBuf>,
        /// Serve the API without background polling
        #[arg(long)]
        no_scheduler: bool,
        /// Keep all state in memory instead of PostgreSQL
        #[arg(long)]
        ephemeral: bool,
    },
    /// Poll one server now and print its status document
    Refresh {
        #[arg(long)]
        hostname: String,
    },
    /// Run a single polling cycle over all servers and exit
    Cycle {
        #[arg(long, value_enum, default_value = "full")]
        cadence: CadenceArg,
    },
    /// Create or update the database schema
    Migrate,
    /// Validate the settings file and print the effective configuration
    CheckConfig,
}

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    // LOG_FORMAT=json for log shippers, human-readable otherwise
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }

    let cli = Cli::parse();

    match &cli.command {
        Commands::CheckConfig => cli::run_check_config(&cli),
        Commands::Migrate => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(cli::run_migrate(&cli))
        }
        Commands::Serve {
            port,
            static_dir,
            no_scheduler,
            ephemeral,
        } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(cli::run_serve(
                &cli,
                *port,
                static_dir.as_deref(),
                *no_scheduler,
                *ephemeral,
            ))
        }
        Commands::Refresh { hostname } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(cli::run_refresh(&cli, hostname))
        }
        Commands::Cycle { cadence } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(cli::run_cycle(&cli, *cadence))
        }
    }
}
