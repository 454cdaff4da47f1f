//! Capabilities that record calls instead of running commands
//!
//! Backs `--dry-run` in the CLI and the controller's tests. Each call is
//! logged as one line (`clone <url> <dest>`, `restart <unit>`,
//! `reload-proxy`, ...) and may be made to fail or to take time.

use super::{ReverseProxy, ServiceManager, SourceControl};
use async_trait::async_trait;
use multiserver_common::{Error, Result};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Clone, Default)]
pub struct RecordingSystem {
    calls: Arc<Mutex<Vec<String>>>,
    failing: Arc<Mutex<HashSet<String>>>,
    delay: Option<Duration>,
}

impl RecordingSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Make every call whose first word is `operation` fail
    pub fn fail_on(&self, operation: &str) {
        self.failing.lock().insert(operation.to_string());
    }

    pub fn clear_failures(&self) {
        self.failing.lock().clear();
    }

    /// Every call recorded so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Number of recorded calls whose first word is `operation`
    pub fn count(&self, operation: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.split_whitespace().next() == Some(operation))
            .count()
    }

    pub fn reset(&self) {
        self.calls.lock().clear();
    }

    async fn record(&self, operation: &str, args: &[&str]) -> Result<()> {
        let mut line = operation.to_string();
        for arg in args {
            line.push(' ');
            line.push_str(arg);
        }
        debug!("recorded: {}", line);
        self.calls.lock().push(line.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.lock().contains(operation) {
            return Err(Error::CommandFailed {
                command: line,
                code: Some(1),
                stderr: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl SourceControl for RecordingSystem {
    async fn clone_repo(&self, url: &str, destination: &Path) -> Result<()> {
        let destination = destination.to_string_lossy();
        self.record("clone", &[url, &*destination]).await
    }
}

#[async_trait]
impl ServiceManager for RecordingSystem {
    async fn enable_and_start(&self, unit_path: &Path) -> Result<()> {
        let unit_path = unit_path.to_string_lossy();
        self.record("enable-and-start", &[&*unit_path]).await
    }

    async fn daemon_reload(&self) -> Result<()> {
        self.record("daemon-reload", &[]).await
    }

    async fn restart(&self, unit: &str) -> Result<()> {
        self.record("restart", &[unit]).await
    }
}

#[async_trait]
impl ReverseProxy for RecordingSystem {
    async fn link_available(&self, config_path: &Path, site: &str) -> Result<()> {
        let config_path = config_path.to_string_lossy();
        self.record("link-available", &[&*config_path, site]).await
    }

    async fn enable_site(&self, site: &str) -> Result<()> {
        self.record("enable-site", &[site]).await
    }

    async fn disable_site(&self, site: &str) -> Result<()> {
        self.record("disable-site", &[site]).await
    }

    async fn reload(&self) -> Result<()> {
        self.record("reload-proxy", &[]).await
    }
}
