//! Managed service records and their stored config files

use crate::locks::ServiceLocks;
use multiserver_common::lifecycle::{Action, Transition};
use multiserver_common::validation;
use multiserver_common::{
    ArtifactStore, Database, Error, ManagedService, NewService, Result, ServiceDetail, ServiceId,
    ServiceUpdate,
};
use tracing::{info, warn};

#[derive(Clone)]
pub struct Registry {
    db: Database,
    artifacts: ArtifactStore,
    locks: ServiceLocks,
}

impl Registry {
    pub fn new(db: Database, artifacts: ArtifactStore, locks: ServiceLocks) -> Self {
        Self {
            db,
            artifacts,
            locks,
        }
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    /// All services, ordered by port
    pub fn list(&self) -> Result<Vec<ManagedService>> {
        self.db.list_services()
    }

    pub fn get(&self, id: ServiceId) -> Result<ManagedService> {
        self.db.require_service(id)
    }

    /// A service together with its stored unit and site config
    pub async fn detail(&self, id: ServiceId) -> Result<ServiceDetail> {
        let service = self.db.require_service(id)?;
        let systemd_unit = self.artifacts.read_unit(&service.service_name).await?;
        let nginx_config = self.artifacts.read_nginx(&service.domain_name).await?;
        Ok(ServiceDetail {
            service,
            systemd_unit,
            nginx_config,
        })
    }

    /// Register a new service and store its config files.
    ///
    /// The service starts uninitialized with both configs pending.
    pub async fn create(&self, new: NewService) -> Result<ManagedService> {
        validation::validate_new(&new)?;
        let service = self.db.insert_service(&new)?;

        if let Err(e) = self.write_artifacts(&service, &new).await {
            warn!("Failed to store config files for {}: {}", service.name, e);
            self.db.delete_service(service.id)?;
            self.artifacts
                .remove(&service.service_name, &service.domain_name)
                .await?;
            return Err(e);
        }

        info!(
            "Registered service {} ({}) on port {}",
            service.name, service.id, service.port
        );
        Ok(service)
    }

    /// Change descriptive fields or config content.
    ///
    /// New unit content puts systemd back to pending; new site content does
    /// the same for nginx. `service_name` and `domain_name` name the host's
    /// unit and site links, so they can only change before initialize.
    pub async fn update(&self, id: ServiceId, update: ServiceUpdate) -> Result<ManagedService> {
        let _guard = self.locks.acquire(id).await?;
        let current = self.db.require_service(id)?;
        if update.is_empty() {
            return Ok(current);
        }

        let mut next = current.clone();
        if let Some(name) = update.name {
            validation::validate_name(&name)?;
            next.name = name;
        }
        if let Some(service_name) = update.service_name {
            validation::validate_service_name(&service_name)?;
            next.service_name = service_name;
        }
        if let Some(domain_name) = update.domain_name {
            validation::validate_domain_name(&domain_name)?;
            next.domain_name = domain_name;
        }
        if let Some(description) = update.description {
            validation::validate_description(&description)?;
            next.description = description;
        }
        if let Some(repo_url) = update.repo_url {
            validation::validate_repo_url(&repo_url)?;
            next.repo_url = repo_url;
        }
        if let Some(port) = update.port {
            validation::validate_port(port)?;
            next.port = port;
        }

        let renamed_unit = next.service_name != current.service_name;
        let renamed_site = next.domain_name != current.domain_name;
        if current.state.is_initialized() {
            if renamed_unit {
                return Err(Error::validation(
                    "service_name",
                    "cannot change once the service is initialized",
                ));
            }
            if renamed_site {
                return Err(Error::validation(
                    "domain_name",
                    "cannot change once the service is initialized",
                ));
            }
        }

        if update.systemd_unit.is_some() {
            if let Transition::Next(state) = next.state.transition(Action::ResetSystemd)? {
                next.state = state;
            }
        }
        if update.nginx_config.is_some() {
            if let Transition::Next(state) = next.state.transition(Action::ResetNginx)? {
                next.state = state;
            }
        }

        let previous = Snapshot {
            unit: self.artifacts.read_unit(&current.service_name).await?,
            nginx: self.artifacts.read_nginx(&current.domain_name).await?,
        };

        // Uniqueness is checked by the write, before any file moves
        next.updated_at = self.db.update_service(&next)?;

        let written = self
            .write_update(
                &current,
                &next,
                update.systemd_unit.as_deref(),
                update.nginx_config.as_deref(),
            )
            .await;
        if let Err(e) = written {
            warn!("Failed to store config files for {}: {}", current.name, e);
            self.restore(&current, &next, previous).await;
            return Err(e);
        }

        info!("Updated service {} ({}): {}", next.name, next.id, next.state);
        Ok(next)
    }

    async fn write_update(
        &self,
        current: &ManagedService,
        next: &ManagedService,
        unit: Option<&str>,
        nginx: Option<&str>,
    ) -> Result<()> {
        if next.service_name != current.service_name {
            self.artifacts
                .rename_unit(&current.service_name, &next.service_name)
                .await?;
        }
        if next.domain_name != current.domain_name {
            self.artifacts
                .rename_nginx(&current.domain_name, &next.domain_name)
                .await?;
        }
        if let Some(unit) = unit {
            self.artifacts.write_unit(&next.service_name, unit).await?;
        }
        if let Some(config) = nginx {
            self.artifacts.write_nginx(&next.domain_name, config).await?;
        }
        Ok(())
    }

    /// Put the row and both stored files back the way they were.
    ///
    /// Runs after a failed file step, so each step is attempted even when
    /// an earlier one fails.
    async fn restore(&self, current: &ManagedService, next: &ManagedService, previous: Snapshot) {
        if let Err(e) = self.db.update_service(current) {
            warn!("Failed to restore record of {}: {}", current.name, e);
        }

        let mut steps = Vec::new();
        if next.service_name != current.service_name {
            steps.push(self.artifacts.remove_unit(&next.service_name).await);
        }
        if next.domain_name != current.domain_name {
            steps.push(self.artifacts.remove_nginx(&next.domain_name).await);
        }
        if let Some(unit) = &previous.unit {
            steps.push(
                self.artifacts
                    .write_unit(&current.service_name, unit)
                    .await
                    .map(|_| ()),
            );
        }
        if let Some(config) = &previous.nginx {
            steps.push(
                self.artifacts
                    .write_nginx(&current.domain_name, config)
                    .await
                    .map(|_| ()),
            );
        }
        for e in steps.into_iter().filter_map(|step| step.err()) {
            warn!("Failed to restore config files of {}: {}", current.name, e);
        }
    }

    /// Remove the record and its stored config files.
    ///
    /// Host-side units, site links and the checkout are left alone.
    pub async fn delete(&self, id: ServiceId) -> Result<ManagedService> {
        let guard = self.locks.acquire(id).await?;
        let service = self.db.require_service(id)?;

        self.db.delete_service(id)?;
        self.artifacts
            .remove(&service.service_name, &service.domain_name)
            .await?;

        drop(guard);
        self.locks.forget(id);

        info!("Deleted service {} ({})", service.name, service.id);
        Ok(service)
    }

    async fn write_artifacts(&self, service: &ManagedService, new: &NewService) -> Result<()> {
        self.artifacts
            .write_unit(&service.service_name, &new.systemd_unit)
            .await?;
        self.artifacts
            .write_nginx(&service.domain_name, &new.nginx_config)
            .await?;
        Ok(())
    }
}

/// Stored file contents before an update
struct Snapshot {
    unit: Option<String>,
    nginx: Option<String>,
}
