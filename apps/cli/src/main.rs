//! ferrum-map - operator CLI for the normalization registry
//!
//! Usage:
//!   ferrum-map --source-dir ./registry reload
//!   ferrum-map --source-dir ./registry --tenant acme resolve --element Appointment.status --code SCH --system urn:acme:status
//!   ferrum-map --config ferrum-map.toml ingest records.json

mod commands;
mod logging;
mod settings;

use anyhow::Context;
use clap::{Parser, Subcommand};
use ferrum_mapping::{FileSystemSource, RegistryStore, ReloadCoordinator, SourceKey};
use settings::Config;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "ferrum-map", version)]
#[command(about = "Load, inspect and apply the FHIR normalization registry")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Registry directory containing the listing and backing documents
    #[arg(long, global = true)]
    source_dir: Option<PathBuf>,

    /// Tenant to resolve for; also narrows reloads to that tenant
    #[arg(short, long, global = true)]
    tenant: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Reload the registry once and print what changed
    Reload {
        /// Re-fetch every document even if its version is unchanged
        #[arg(long)]
        force: bool,
    },

    /// Map a source code to its normalized target
    Resolve {
        /// Data element, e.g. Appointment.status
        #[arg(short, long)]
        element: String,

        #[arg(long)]
        code: String,

        /// Source code system
        #[arg(long, default_value = "")]
        system: String,

        #[arg(short, long)]
        profile: Option<String>,
    },

    /// Print the value set registered for a data element
    ResolveSet {
        #[arg(short, long)]
        element: String,

        #[arg(short, long)]
        profile: Option<String>,
    },

    /// Reload periodically until interrupted
    Watch {
        /// Overrides registry.reload_interval_secs
        #[arg(long)]
        interval_secs: Option<u64>,
    },

    /// Dispatch, transform and validate a file of records
    Ingest {
        /// JSON array of resources, a single resource or a Bundle
        file: PathBuf,

        /// Profile URL stamped on every transformed record
        #[arg(short, long)]
        profile: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(source_dir) = cli.source_dir {
        config.registry.source_dir = Some(source_dir);
    }
    if let Some(tenant) = cli.tenant {
        config.registry.tenant = Some(tenant);
    }
    if cli.json_logs {
        config.logging.json = true;
    }
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {e}"))?;

    logging::init_logging(&config.logging)?;

    tracing::debug!(
        version = env!("CARGO_PKG_VERSION"),
        source_dir = ?config.registry.source_dir,
        tenant = ?config.registry.tenant,
        "Configuration loaded"
    );

    let source = FileSystemSource::from_config(&config.registry)
        .context("A registry directory is required (--source-dir or registry.source_dir)")?;
    let store = Arc::new(RegistryStore::new());
    let coordinator = ReloadCoordinator::new(store, Arc::new(source));
    let scope = config.registry.scope();

    match cli.command {
        Command::Reload { force } => commands::reload(&coordinator, &scope, force).await,
        Command::Resolve {
            element,
            code,
            system,
            profile,
        } => {
            let tenant = required_tenant(&config)?;
            commands::resolve(
                &coordinator,
                &scope,
                tenant,
                &element,
                &SourceKey::new(code, system),
                profile.as_deref(),
            )
            .await
        }
        Command::ResolveSet { element, profile } => {
            let tenant = required_tenant(&config)?;
            commands::resolve_set(&coordinator, &scope, tenant, &element, profile.as_deref())
                .await
        }
        Command::Watch { interval_secs } => {
            let interval = interval_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or_else(|| config.registry.reload_interval());
            commands::watch(&coordinator, scope, interval).await
        }
        Command::Ingest { file, profile } => {
            let tenant = required_tenant(&config)?;
            commands::ingest(
                &coordinator,
                &scope,
                tenant,
                &config.transform,
                profile.as_deref(),
                &file,
            )
            .await
        }
    }
}

fn required_tenant(config: &Config) -> anyhow::Result<&str> {
    config
        .registry
        .tenant
        .as_deref()
        .context("A tenant is required (--tenant or registry.tenant)")
}
