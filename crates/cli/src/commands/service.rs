//! Service record commands

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use std::path::{Path, PathBuf};

use multiserver_common::{NewService, ServiceDetail, ServiceId, ServiceUpdate};
use multiserver_controller::Panel;

use crate::output::{print_item, print_list, print_structured, print_success, OutputFormat};

#[derive(Subcommand)]
pub enum ServiceCommands {
    /// List managed services, ordered by port
    List,

    /// Show a service with its stored unit and site config
    Show {
        /// Service ID
        id: ServiceId,
    },

    /// Register a new service
    Create(CreateArgs),

    /// Change a service's fields or config files
    Update(UpdateArgs),

    /// Delete a service record and its stored config files
    Delete {
        /// Service ID
        id: ServiceId,
    },
}

#[derive(Args)]
pub struct CreateArgs {
    /// Display name
    #[arg(short, long)]
    pub name: String,

    /// systemd unit name (without `.service`)
    #[arg(long)]
    pub service_name: String,

    /// nginx server name
    #[arg(long)]
    pub domain: String,

    /// Git repository to clone on initialize
    #[arg(long)]
    pub repo: String,

    /// Port the service listens on
    #[arg(short, long)]
    pub port: u16,

    #[arg(long, default_value = "")]
    pub description: String,

    /// Path to the systemd unit file
    #[arg(long)]
    pub unit: PathBuf,

    /// Path to the nginx site config
    #[arg(long)]
    pub nginx: PathBuf,
}

#[derive(Args)]
pub struct UpdateArgs {
    /// Service ID
    pub id: ServiceId,

    #[arg(short, long)]
    pub name: Option<String>,

    #[arg(long)]
    pub service_name: Option<String>,

    #[arg(long)]
    pub domain: Option<String>,

    #[arg(long)]
    pub repo: Option<String>,

    #[arg(short, long)]
    pub port: Option<u16>,

    #[arg(long)]
    pub description: Option<String>,

    /// New systemd unit file; marks systemd as pending
    #[arg(long)]
    pub unit: Option<PathBuf>,

    /// New nginx site config; marks nginx as pending
    #[arg(long)]
    pub nginx: Option<PathBuf>,
}

pub async fn execute(cmd: ServiceCommands, panel: &Panel, format: OutputFormat) -> Result<()> {
    let registry = panel.registry();

    match cmd {
        ServiceCommands::List => {
            let services = registry.list()?;
            print_list(&services, format);
        }

        ServiceCommands::Show { id } => {
            let detail = registry.detail(id).await?;
            print_detail(&detail, format);
        }

        ServiceCommands::Create(args) => {
            let new = NewService {
                name: args.name,
                service_name: args.service_name,
                domain_name: args.domain,
                description: args.description,
                repo_url: args.repo,
                port: args.port,
                systemd_unit: read_content(&args.unit).await?,
                nginx_config: read_content(&args.nginx).await?,
            };

            let service = registry.create(new).await?;
            if !format.is_structured() {
                print_success(&format!("Service '{}' created with id {}", service.name, service.id));
            }
            print_item(&service, format);
        }

        ServiceCommands::Update(args) => {
            let update = ServiceUpdate {
                name: args.name,
                service_name: args.service_name,
                domain_name: args.domain,
                description: args.description,
                repo_url: args.repo,
                port: args.port,
                systemd_unit: read_optional(args.unit.as_deref()).await?,
                nginx_config: read_optional(args.nginx.as_deref()).await?,
            };
            if update.is_empty() {
                anyhow::bail!("nothing to update; pass at least one field");
            }

            let service = registry.update(args.id, update).await?;
            if !format.is_structured() {
                print_success(&format!("Service '{}' updated", service.name));
            }
            print_item(&service, format);
        }

        ServiceCommands::Delete { id } => {
            let service = registry.delete(id).await?;
            if format.is_structured() {
                print_structured(&service, format);
            } else {
                print_success(&format!("{} deleted.", service.name));
            }
        }
    }

    Ok(())
}

fn print_detail(detail: &ServiceDetail, format: OutputFormat) {
    if format.is_structured() {
        print_structured(detail, format);
        return;
    }

    print_item(&detail.service, format);
    println!();
    println!("Repository: {}", detail.service.repo_url);
    if !detail.service.description.is_empty() {
        println!("Description: {}", detail.service.description);
    }
    println!();
    println!("# {}", detail.service.unit_name());
    println!("{}", detail.systemd_unit.as_deref().unwrap_or("(missing)"));
    println!("# {}", detail.service.site_file_name());
    println!("{}", detail.nginx_config.as_deref().unwrap_or("(missing)"));
}

async fn read_content(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))
}

async fn read_optional(path: Option<&Path>) -> Result<Option<String>> {
    match path {
        Some(path) => Ok(Some(read_content(path).await?)),
        None => Ok(None),
    }
}
