//! Multiserver Controller
//!
//! Registers managed services and drives them through their lifecycle on
//! the host: repository checkout, systemd units and nginx sites.

pub mod controller;
pub mod locks;
pub mod registry;
pub mod runner;
pub mod system;

pub use controller::{ApplyReport, Cascade, LifecycleController, Outcome};
pub use locks::{ServiceGuard, ServiceLocks};
pub use registry::Registry;
pub use runner::CommandRunner;
pub use system::Capabilities;

use multiserver_common::{ArtifactStore, Config, Database, FailurePolicy, Result};

/// Registry and controller sharing one database, artifact store and lock set
#[derive(Clone)]
pub struct Panel {
    registry: Registry,
    controller: LifecycleController,
}

impl Panel {
    /// Open the configured store with command-line backed capabilities
    pub fn open(config: &Config) -> Result<Self> {
        Self::open_with(config, Capabilities::from_config(config))
    }

    /// Open the configured store with the given capabilities.
    ///
    /// Operations lock the store's lock directory so other processes on the
    /// same store wait for them.
    pub fn open_with(config: &Config, caps: Capabilities) -> Result<Self> {
        let db = Database::open(config.db_path())?;
        let artifacts = ArtifactStore::new(&config.media_root);
        Ok(Self::with_locks(
            db,
            artifacts,
            caps,
            config.controller.failure_policy,
            ServiceLocks::with_lock_dir(config.lock_dir()),
        ))
    }

    /// A panel whose locks only exclude tasks of this process
    pub fn new(
        db: Database,
        artifacts: ArtifactStore,
        caps: Capabilities,
        policy: FailurePolicy,
    ) -> Self {
        Self::with_locks(db, artifacts, caps, policy, ServiceLocks::new())
    }

    fn with_locks(
        db: Database,
        artifacts: ArtifactStore,
        caps: Capabilities,
        policy: FailurePolicy,
        locks: ServiceLocks,
    ) -> Self {
        Self {
            registry: Registry::new(db.clone(), artifacts.clone(), locks.clone()),
            controller: LifecycleController::new(db, artifacts, caps, locks, policy),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn controller(&self) -> &LifecycleController {
        &self.controller
    }
}
