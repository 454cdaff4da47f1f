//! Lifecycle action commands

use anyhow::Result;
use clap::{Args, Subcommand};
use serde::Serialize;

use multiserver_common::{ManagedService, ServiceId};
use multiserver_controller::{Cascade, Panel};

use crate::output::{print_info, print_structured, print_success, OutputFormat};

#[derive(Subcommand)]
pub enum LifecycleCommands {
    /// Clone the repository, start the unit and publish the site config
    Initialize {
        /// Service ID
        id: ServiceId,
    },

    /// Reload systemd and restart the service's unit
    ApplySystemd(ActionArgs),

    /// Reload nginx with the service's site config
    ApplyNginx(ActionArgs),

    /// Apply pending systemd and nginx changes
    ApplyAll(ActionArgs),

    /// Link the site into nginx's enabled sites
    Enable(ActionArgs),

    /// Remove the site from nginx's enabled sites
    Disable(ActionArgs),
}

#[derive(Args)]
pub struct ActionArgs {
    /// Service ID
    pub id: ServiceId,

    /// Fail instead of initializing an uninitialized service first
    #[arg(long)]
    pub require_initialized: bool,
}

impl ActionArgs {
    fn cascade(&self) -> Cascade {
        if self.require_initialized {
            Cascade::Require
        } else {
            Cascade::Initialize
        }
    }
}

impl LifecycleCommands {
    /// The service the command acts on
    pub fn id(&self) -> ServiceId {
        match self {
            LifecycleCommands::Initialize { id } => *id,
            LifecycleCommands::ApplySystemd(args)
            | LifecycleCommands::ApplyNginx(args)
            | LifecycleCommands::ApplyAll(args)
            | LifecycleCommands::Enable(args)
            | LifecycleCommands::Disable(args) => args.id,
        }
    }
}

/// What an action did, as printed for structured formats
#[derive(Serialize)]
struct ActionReport {
    changed: bool,
    cascaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    systemd: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    nginx: Option<bool>,
    message: String,
    service: ManagedService,
}

pub async fn execute(cmd: LifecycleCommands, panel: &Panel, format: OutputFormat) -> Result<()> {
    let controller = panel.controller();

    let report = match cmd {
        LifecycleCommands::Initialize { id } => {
            let outcome = controller.initialize(id).await?;
            ActionReport {
                changed: outcome.changed,
                cascaded: outcome.cascaded,
                systemd: None,
                nginx: None,
                message: format!("{} initialized.", outcome.service.name),
                service: outcome.service,
            }
        }

        LifecycleCommands::ApplySystemd(args) => {
            let outcome = controller.apply_systemd(args.id, args.cascade()).await?;
            ActionReport {
                changed: outcome.changed,
                cascaded: outcome.cascaded,
                systemd: None,
                nginx: None,
                message: format!("Systemd config applied for {}.", outcome.service.name),
                service: outcome.service,
            }
        }

        LifecycleCommands::ApplyNginx(args) => {
            let outcome = controller.apply_nginx(args.id, args.cascade()).await?;
            ActionReport {
                changed: outcome.changed,
                cascaded: outcome.cascaded,
                systemd: None,
                nginx: None,
                message: format!("Nginx config applied for {}.", outcome.service.name),
                service: outcome.service,
            }
        }

        LifecycleCommands::ApplyAll(args) => {
            let applied = controller.apply_changes(args.id, args.cascade()).await?;
            ActionReport {
                changed: applied.changed(),
                cascaded: applied.cascaded,
                systemd: Some(applied.systemd),
                nginx: Some(applied.nginx),
                message: format!("Configs applied for {}.", applied.service.name),
                service: applied.service,
            }
        }

        LifecycleCommands::Enable(args) => {
            let outcome = controller.enable(args.id, args.cascade()).await?;
            ActionReport {
                changed: outcome.changed,
                cascaded: outcome.cascaded,
                systemd: None,
                nginx: None,
                message: format!("{} enabled.", outcome.service.name),
                service: outcome.service,
            }
        }

        LifecycleCommands::Disable(args) => {
            let outcome = controller.disable(args.id, args.cascade()).await?;
            ActionReport {
                changed: outcome.changed,
                cascaded: outcome.cascaded,
                systemd: None,
                nginx: None,
                message: format!("{} disabled.", outcome.service.name),
                service: outcome.service,
            }
        }
    };

    if format.is_structured() {
        print_structured(&report, format);
        return Ok(());
    }

    if report.cascaded {
        print_info(&format!("{} was not initialized; initialized it first", report.service.name));
    }
    if report.changed {
        print_success(&report.message);
    } else {
        print_info(&format!("Nothing to do for {}.", report.service.name));
    }
    println!("State: {}", report.service.state);

    Ok(())
}
