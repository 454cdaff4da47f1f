//! multiserver CLI - Main Entry Point
//!
//! Registers managed services and runs their lifecycle actions directly
//! against the local state database.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use multiserver_common::{ArtifactStore, Config, Database, ServiceId};
use multiserver_controller::system::RecordingSystem;
use multiserver_controller::{Capabilities, Panel};

mod commands;
mod output;

use commands::{lifecycle, service};

/// multiserver - service lifecycle control panel
#[derive(Parser)]
#[command(name = "multiserver")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file
    #[arg(long, env = "MULTISERVER_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print the host commands a lifecycle action would run without
    /// running them or saving any state
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(flatten)]
    Service(service::ServiceCommands),

    #[command(flatten)]
    Lifecycle(lifecycle::LifecycleCommands),

    /// Print the effective configuration
    Config,

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(multiserver_common::default_config_path);
    let mut config = Config::load(&config_path)?;
    config.apply_env_overrides();

    match cli.command {
        Commands::Service(cmd) => {
            if cli.dry_run {
                anyhow::bail!("--dry-run only applies to lifecycle actions");
            }
            let panel = Panel::open(&config)?;
            service::execute(cmd, &panel, cli.format).await?;
        }
        Commands::Lifecycle(cmd) => {
            if cli.dry_run {
                let (panel, recorder) = dry_run_panel(&config, cmd.id())?;
                lifecycle::execute(cmd, &panel, cli.format).await?;
                print_plan(&recorder);
            } else {
                let panel = Panel::open(&config)?;
                lifecycle::execute(cmd, &panel, cli.format).await?;
            }
        }
        Commands::Config => commands::config::execute(&config, &config_path, cli.format)?,
        Commands::Version => {
            println!("multiserver v{}", multiserver_common::VERSION);
        }
    }

    Ok(())
}

/// A panel over a scratch copy of one record whose host capabilities only
/// record what they are asked to do.
fn dry_run_panel(config: &Config, id: ServiceId) -> anyhow::Result<(Panel, RecordingSystem)> {
    let service = Database::open_read_only(config.db_path())?.require_service(id)?;

    let scratch = Database::open_memory()?;
    scratch.import_service(&service)?;

    let recorder = RecordingSystem::new();
    let panel = Panel::new(
        scratch,
        ArtifactStore::new(&config.media_root),
        Capabilities::recording(recorder.clone()),
        config.controller.failure_policy,
    );
    Ok((panel, recorder))
}

fn print_plan(recorder: &RecordingSystem) {
    let calls = recorder.calls();
    if calls.is_empty() {
        eprintln!("dry run: no host commands would run");
        return;
    }
    eprintln!("dry run: would run");
    for call in calls {
        eprintln!("  {}", call);
    }
}
