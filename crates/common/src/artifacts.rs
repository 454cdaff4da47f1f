//! Stored unit files, site configs and checkouts under the media root
//!
//! Every path is a pure function of `service_name` or `domain_name`:
//!
//! ```text
//! <media_root>/systemd/<service_name>.service
//! <media_root>/nginx/<domain_name>.conf
//! <media_root>/code/<service_name>
//! ```

use crate::Result;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    media_root: PathBuf,
}

impl ArtifactStore {
    pub fn new(media_root: impl Into<PathBuf>) -> Self {
        Self {
            media_root: media_root.into(),
        }
    }

    pub fn media_root(&self) -> &Path {
        &self.media_root
    }

    pub fn unit_path(&self, service_name: &str) -> PathBuf {
        self.media_root
            .join("systemd")
            .join(format!("{}.service", service_name))
    }

    pub fn nginx_path(&self, domain_name: &str) -> PathBuf {
        self.media_root
            .join("nginx")
            .join(format!("{}.conf", domain_name))
    }

    /// Directory the service's repository is cloned into
    pub fn workspace_path(&self, service_name: &str) -> PathBuf {
        self.media_root.join("code").join(service_name)
    }

    pub async fn write_unit(&self, service_name: &str, content: &str) -> Result<PathBuf> {
        let path = self.unit_path(service_name);
        write_file(&path, content).await?;
        Ok(path)
    }

    pub async fn write_nginx(&self, domain_name: &str, content: &str) -> Result<PathBuf> {
        let path = self.nginx_path(domain_name);
        write_file(&path, content).await?;
        Ok(path)
    }

    pub async fn read_unit(&self, service_name: &str) -> Result<Option<String>> {
        read_optional(&self.unit_path(service_name)).await
    }

    pub async fn read_nginx(&self, domain_name: &str) -> Result<Option<String>> {
        read_optional(&self.nginx_path(domain_name)).await
    }

    /// Move the unit file after a `service_name` change
    pub async fn rename_unit(&self, from: &str, to: &str) -> Result<()> {
        move_file(&self.unit_path(from), &self.unit_path(to)).await
    }

    /// Move the site config after a `domain_name` change
    pub async fn rename_nginx(&self, from: &str, to: &str) -> Result<()> {
        move_file(&self.nginx_path(from), &self.nginx_path(to)).await
    }

    pub async fn remove_unit(&self, service_name: &str) -> Result<()> {
        remove_optional(&self.unit_path(service_name)).await
    }

    pub async fn remove_nginx(&self, domain_name: &str) -> Result<()> {
        remove_optional(&self.nginx_path(domain_name)).await
    }

    /// Remove both stored files. The checkout is left in place.
    pub async fn remove(&self, service_name: &str, domain_name: &str) -> Result<()> {
        self.remove_unit(service_name).await?;
        self.remove_nginx(domain_name).await
    }
}

async fn write_file(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::write(path, content).await?;
    debug!("Wrote {:?}", path);
    Ok(())
}

async fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn move_file(from: &Path, to: &Path) -> Result<()> {
    if from == to {
        return Ok(());
    }
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).await?;
    }
    match fs::rename(from, to).await {
        Ok(()) => {
            debug!("Moved {:?} -> {:?}", from, to);
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

async fn remove_optional(path: &Path) -> Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
