//! Capabilities the controller drives on the host
//!
//! - [`SourceControl`]: fetching a service's repository
//! - [`ServiceManager`]: systemd unit management
//! - [`ReverseProxy`]: nginx site links and reloads
//!
//! [`command`] implements them with the usual command line tools,
//! [`recording`] logs calls without touching the host (dry runs and tests).

pub mod command;
pub mod recording;

use async_trait::async_trait;
use multiserver_common::{Config, Result};
use std::path::Path;
use std::sync::Arc;

pub use command::{GitCli, NginxSites, Systemctl};
pub use recording::RecordingSystem;

/// Source control client
#[async_trait]
pub trait SourceControl: Send + Sync {
    /// Clone `url` into `destination`
    async fn clone_repo(&self, url: &str, destination: &Path) -> Result<()>;
}

/// Service manager
#[async_trait]
pub trait ServiceManager: Send + Sync {
    /// Enable the unit file at `unit_path` and start it
    async fn enable_and_start(&self, unit_path: &Path) -> Result<()>;

    /// Reload unit definitions
    async fn daemon_reload(&self) -> Result<()>;

    /// Restart a unit by name
    async fn restart(&self, unit: &str) -> Result<()>;
}

/// Reverse proxy site management
#[async_trait]
pub trait ReverseProxy: Send + Sync {
    /// Link a stored site config into the available-sites directory
    async fn link_available(&self, config_path: &Path, site: &str) -> Result<()>;

    /// Link an available site into the enabled-sites directory
    async fn enable_site(&self, site: &str) -> Result<()>;

    /// Remove a site from the enabled-sites directory
    async fn disable_site(&self, site: &str) -> Result<()>;

    /// Reload the proxy configuration
    async fn reload(&self) -> Result<()>;
}

/// The set of host capabilities a controller works with
#[derive(Clone)]
pub struct Capabilities {
    pub source: Arc<dyn SourceControl>,
    pub services: Arc<dyn ServiceManager>,
    pub proxy: Arc<dyn ReverseProxy>,
}

impl Capabilities {
    /// Command-line backed capabilities
    pub fn from_config(config: &Config) -> Self {
        let runner = crate::runner::CommandRunner::from_config(&config.commands);
        Self {
            source: Arc::new(GitCli::new(runner.clone(), &config.commands)),
            services: Arc::new(Systemctl::new(runner.clone(), &config.commands)),
            proxy: Arc::new(NginxSites::new(runner, &config.commands, &config.nginx)),
        }
    }

    /// All three capabilities served by one recorder
    pub fn recording(recorder: RecordingSystem) -> Self {
        let recorder = Arc::new(recorder);
        Self {
            source: recorder.clone(),
            services: recorder.clone(),
            proxy: recorder,
        }
    }
}
