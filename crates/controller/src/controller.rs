//! Service lifecycle controller
//!
//! Drives a managed service through its lifecycle:
//!
//! ```text
//! uninitialized --initialize--> initialized --apply-systemd--> systemd applied
//!                                           --apply-nginx----> nginx applied
//!                                           --enable/disable-> site enabled / disabled
//! ```
//!
//! Every operation holds the service's lock from the first read to the final
//! state write. An operation whose target state is already reached performs
//! no side effects and reports `changed: false`.

use crate::locks::ServiceLocks;
use crate::system::Capabilities;
use multiserver_common::lifecycle::{Action, Transition};
use multiserver_common::{
    ArtifactStore, Database, Error, FailurePolicy, ManagedService, Result, ServiceId, ServiceState,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use tracing::{debug, info, warn};

/// What an operation does when the service has not been initialized yet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cascade {
    /// Run initialize first, then the requested operation
    #[default]
    Initialize,
    /// Fail with [`Error::NotInitialized`] without side effects
    Require,
}

/// Result of a single lifecycle operation
#[derive(Debug, Clone, Serialize)]
pub struct Outcome {
    /// The operation performed work
    pub changed: bool,
    /// Initialize ran first because the service was not initialized
    pub cascaded: bool,
    pub service: ManagedService,
}

/// Result of applying all pending configuration
#[derive(Debug, Clone, Serialize)]
pub struct ApplyReport {
    pub cascaded: bool,
    pub systemd: bool,
    pub nginx: bool,
    pub service: ManagedService,
}

impl ApplyReport {
    pub fn changed(&self) -> bool {
        self.systemd || self.nginx
    }
}

#[derive(Clone)]
pub struct LifecycleController {
    db: Database,
    artifacts: ArtifactStore,
    caps: Capabilities,
    locks: ServiceLocks,
    policy: FailurePolicy,
}

impl LifecycleController {
    pub fn new(
        db: Database,
        artifacts: ArtifactStore,
        caps: Capabilities,
        locks: ServiceLocks,
        policy: FailurePolicy,
    ) -> Self {
        Self {
            db,
            artifacts,
            caps,
            locks,
            policy,
        }
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Clone the repository, enable and start the unit, publish the site
    /// config to nginx and reload it.
    pub async fn initialize(&self, id: ServiceId) -> Result<Outcome> {
        let _guard = self.locks.acquire(id).await?;
        let mut service = self.db.require_service(id)?;
        let changed = self.initialize_locked(&mut service).await?;
        Ok(Outcome {
            changed,
            cascaded: false,
            service,
        })
    }

    /// Reload unit definitions and restart the unit.
    pub async fn apply_systemd(&self, id: ServiceId, cascade: Cascade) -> Result<Outcome> {
        let _guard = self.locks.acquire(id).await?;
        let mut service = self.db.require_service(id)?;
        let cascaded = self.ensure_initialized(&mut service, cascade).await?;
        let changed = self.apply_systemd_locked(&mut service).await?;
        Ok(Outcome {
            changed,
            cascaded,
            service,
        })
    }

    /// Reload nginx with the stored site config.
    pub async fn apply_nginx(&self, id: ServiceId, cascade: Cascade) -> Result<Outcome> {
        let _guard = self.locks.acquire(id).await?;
        let mut service = self.db.require_service(id)?;
        let cascaded = self.ensure_initialized(&mut service, cascade).await?;
        let changed = self.apply_nginx_locked(&mut service).await?;
        Ok(Outcome {
            changed,
            cascaded,
            service,
        })
    }

    /// Apply systemd, then nginx. Both are attempted; the report says which
    /// of them had pending work.
    pub async fn apply_changes(&self, id: ServiceId, cascade: Cascade) -> Result<ApplyReport> {
        let _guard = self.locks.acquire(id).await?;
        let mut service = self.db.require_service(id)?;
        let cascaded = self.ensure_initialized(&mut service, cascade).await?;
        let systemd = self.apply_systemd_locked(&mut service).await?;
        let nginx = self.apply_nginx_locked(&mut service).await?;
        Ok(ApplyReport {
            cascaded,
            systemd,
            nginx,
            service,
        })
    }

    /// Link the site into nginx's enabled directory and reload.
    pub async fn enable(&self, id: ServiceId, cascade: Cascade) -> Result<Outcome> {
        let _guard = self.locks.acquire(id).await?;
        let mut service = self.db.require_service(id)?;
        let cascaded = self.ensure_initialized(&mut service, cascade).await?;

        let Some(next) = self.plan(&service, Action::Enable)? else {
            return Ok(Outcome {
                changed: false,
                cascaded,
                service,
            });
        };
        let site = service.site_file_name();
        self.step(&service, "enable-site", self.caps.proxy.enable_site(&site))
            .await?;
        self.step(&service, "reload-proxy", self.caps.proxy.reload())
            .await?;
        self.commit(&mut service, next, Action::Enable)?;

        Ok(Outcome {
            changed: true,
            cascaded,
            service,
        })
    }

    /// Remove the site from nginx's enabled directory and reload.
    pub async fn disable(&self, id: ServiceId, cascade: Cascade) -> Result<Outcome> {
        let _guard = self.locks.acquire(id).await?;
        let mut service = self.db.require_service(id)?;
        let cascaded = self.ensure_initialized(&mut service, cascade).await?;

        let Some(next) = self.plan(&service, Action::Disable)? else {
            return Ok(Outcome {
                changed: false,
                cascaded,
                service,
            });
        };
        let site = service.site_file_name();
        self.step(&service, "disable-site", self.caps.proxy.disable_site(&site))
            .await?;
        self.step(&service, "reload-proxy", self.caps.proxy.reload())
            .await?;
        self.commit(&mut service, next, Action::Disable)?;

        Ok(Outcome {
            changed: true,
            cascaded,
            service,
        })
    }

    /// Returns whether initialize ran.
    async fn ensure_initialized(&self, service: &mut ManagedService, cascade: Cascade) -> Result<bool> {
        if service.state.is_initialized() {
            return Ok(false);
        }
        match cascade {
            Cascade::Require => Err(Error::NotInitialized {
                name: service.name.clone(),
            }),
            Cascade::Initialize => {
                debug!("Service {} not initialized, initializing first", service.name);
                self.initialize_locked(service).await
            }
        }
    }

    async fn initialize_locked(&self, service: &mut ManagedService) -> Result<bool> {
        let Some(next) = self.plan(service, Action::Initialize)? else {
            return Ok(false);
        };

        let checkout = self.artifacts.workspace_path(&service.service_name);
        let unit_path = self.artifacts.unit_path(&service.service_name);
        let site_config = self.artifacts.nginx_path(&service.domain_name);
        let site = service.site_file_name();

        self.step(service, "clone", self.caps.source.clone_repo(&service.repo_url, &checkout))
            .await?;
        self.step(service, "enable-and-start", self.caps.services.enable_and_start(&unit_path))
            .await?;
        self.step(service, "link-available", self.caps.proxy.link_available(&site_config, &site))
            .await?;
        self.step(service, "reload-proxy", self.caps.proxy.reload())
            .await?;

        self.commit(service, next, Action::Initialize)?;
        Ok(true)
    }

    async fn apply_systemd_locked(&self, service: &mut ManagedService) -> Result<bool> {
        let Some(next) = self.plan(service, Action::ApplySystemd)? else {
            return Ok(false);
        };

        let unit = service.unit_name();
        self.step(service, "daemon-reload", self.caps.services.daemon_reload())
            .await?;
        self.step(service, "restart", self.caps.services.restart(&unit))
            .await?;

        self.commit(service, next, Action::ApplySystemd)?;
        Ok(true)
    }

    async fn apply_nginx_locked(&self, service: &mut ManagedService) -> Result<bool> {
        let Some(next) = self.plan(service, Action::ApplyNginx)? else {
            return Ok(false);
        };

        self.step(service, "reload-proxy", self.caps.proxy.reload())
            .await?;

        self.commit(service, next, Action::ApplyNginx)?;
        Ok(true)
    }

    /// `None` when the service is already where `action` would take it.
    fn plan(&self, service: &ManagedService, action: Action) -> Result<Option<ServiceState>> {
        match service.state.transition(action)? {
            Transition::Unchanged => {
                debug!("{} on {}: nothing to do ({})", action, service.name, service.state);
                Ok(None)
            }
            Transition::Next(next) => Ok(Some(next)),
        }
    }

    /// Await one side effect, honouring the failure policy.
    async fn step<F>(&self, service: &ManagedService, step: &str, effect: F) -> Result<()>
    where
        F: Future<Output = Result<()>>,
    {
        match effect.await {
            Ok(()) => Ok(()),
            Err(e) => match self.policy {
                FailurePolicy::Strict => {
                    warn!("{} failed for {}: {}", step, service.name, e);
                    Err(e)
                }
                FailurePolicy::FireAndForget => {
                    warn!("{} failed for {}, continuing: {}", step, service.name, e);
                    Ok(())
                }
            },
        }
    }

    fn commit(&self, service: &mut ManagedService, next: ServiceState, action: Action) -> Result<()> {
        service.state = next;
        if action.stamps_applied_at() {
            service.stamp_applied(chrono::Utc::now().timestamp());
        }
        service.updated_at = self.db.write_state(service)?;
        info!("{} {} ({})", service.name, past_tense(action), service.state);
        Ok(())
    }
}

fn past_tense(action: Action) -> &'static str {
    match action {
        Action::Initialize => "initialized",
        Action::ApplySystemd => "systemd config applied",
        Action::ApplyNginx => "nginx config applied",
        Action::Enable => "enabled",
        Action::Disable => "disabled",
        Action::ResetSystemd => "systemd config reset",
        Action::ResetNginx => "nginx config reset",
    }
}
